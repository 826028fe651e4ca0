//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract; scripts rely on them.
//!
//! | Code | Meaning                                                   |
//! |------|-----------------------------------------------------------|
//! | 0    | Success                                                   |
//! | 2    | CLI usage error (bad args)                                |
//! | 3    | Invalid run config (TOML syntax, validation)              |
//! | 4    | Reference data or override tables structurally invalid    |
//! | 5    | I/O (unreadable file, undecodable bytes, malformed CSV)   |
//! | 6    | Rows left unresolved and `--strict` was given             |

use georef_resolve::ResolveError;

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// Usage error - bad arguments. clap also exits with this code.
pub const EXIT_USAGE: u8 = 2;

/// Config failed to parse or validate.
pub const EXIT_INVALID_CONFIG: u8 = 3;

/// Registry, override tables or expected entities are unusable:
/// missing columns, bad codes, conflicting or unknown override targets.
pub const EXIT_DATA: u8 = 4;

/// A file could not be read, decoded or written.
pub const EXIT_IO: u8 = 5;

/// The run finished but some rows are not fully resolved (`--strict`).
pub const EXIT_UNRESOLVED: u8 = 6;

/// Map an engine error to its exit code.
pub fn resolve_exit_code(err: &ResolveError) -> u8 {
    if err.is_data_error() {
        EXIT_DATA
    } else {
        EXIT_INVALID_CONFIG
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_distinct() {
        let codes = [EXIT_SUCCESS, EXIT_USAGE, EXIT_INVALID_CONFIG, EXIT_DATA, EXIT_IO, EXIT_UNRESOLVED];
        let mut sorted = codes.to_vec();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), codes.len());
    }

    #[test]
    fn engine_errors_split_by_cause() {
        assert_eq!(
            resolve_exit_code(&ResolveError::ConfigValidation("x".into())),
            EXIT_INVALID_CONFIG
        );
        assert_eq!(
            resolve_exit_code(&ResolveError::MissingEntityScope("Oaxaca".into())),
            EXIT_DATA
        );
    }
}

// Table I/O for the resolution engine

pub mod csv;

pub use crate::csv::{decode, read_table, read_table_from_bytes, write_table, write_text, IoError};

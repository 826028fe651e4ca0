use serde::{Deserialize, Serialize};

/// Administrative level of a code or a resolver stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GeoLevel {
    Entity,
    Municipality,
    Locality,
}

impl GeoLevel {
    pub const ALL: [GeoLevel; 3] = [GeoLevel::Entity, GeoLevel::Municipality, GeoLevel::Locality];

    /// Zero-padded width of a code at this level.
    pub fn width(self) -> usize {
        match self {
            Self::Entity => 2,
            Self::Municipality => 3,
            Self::Locality => 4,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Entity => "entity",
            Self::Municipality => "municipality",
            Self::Locality => "locality",
        }
    }
}

impl std::fmt::Display for GeoLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Fixed-width, zero-padded numeric code (`"07"`, `"087"`, `"0001"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct GeoCode(String);

impl GeoCode {
    /// Parse a raw registry/override value. Accepts surrounding whitespace and
    /// a trailing `.0` left behind by spreadsheet exports. Returns `None` for
    /// anything that is not a non-empty run of digits fitting the level width.
    pub fn parse(raw: &str, level: GeoLevel) -> Option<GeoCode> {
        let trimmed = raw.trim();
        let digits = trimmed.strip_suffix(".0").unwrap_or(trimmed);
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let significant = digits.trim_start_matches('0');
        let width = level.width();
        if significant.len() > width {
            return None;
        }
        Some(GeoCode(format!("{significant:0>width$}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for GeoCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a resolved code was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Fuzzy match at the code's own level.
    Matched,
    /// Filled in from a finer-grained match (a municipality match implies its entity).
    Inferred,
    /// Taken from a curated override table.
    Override,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedCode {
    pub code: GeoCode,
    pub provenance: Provenance,
    /// Fuzzy score, only for [`Provenance::Matched`] codes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<u8>,
}

/// The three codes of a record, each optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Codes {
    pub entity: Option<GeoCode>,
    pub municipality: Option<GeoCode>,
    pub locality: Option<GeoCode>,
}

impl Codes {
    pub fn get(&self, level: GeoLevel) -> Option<&GeoCode> {
        match level {
            GeoLevel::Entity => self.entity.as_ref(),
            GeoLevel::Municipality => self.municipality.as_ref(),
            GeoLevel::Locality => self.locality.as_ref(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entity.is_none() && self.municipality.is_none() && self.locality.is_none()
    }
}

impl std::fmt::Display for Codes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let part = |c: &Option<GeoCode>| c.as_ref().map(|c| c.as_str().to_string()).unwrap_or_else(|| "_".into());
        write!(f, "{}/{}/{}", part(&self.entity), part(&self.municipality), part(&self.locality))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pads_to_level_width() {
        assert_eq!(GeoCode::parse("7", GeoLevel::Entity).unwrap().as_str(), "07");
        assert_eq!(GeoCode::parse("87", GeoLevel::Municipality).unwrap().as_str(), "087");
        assert_eq!(GeoCode::parse("1", GeoLevel::Locality).unwrap().as_str(), "0001");
        assert_eq!(GeoCode::parse("30", GeoLevel::Entity).unwrap().as_str(), "30");
    }

    #[test]
    fn accepts_spreadsheet_float_suffix_and_padding() {
        assert_eq!(GeoCode::parse(" 12.0 ", GeoLevel::Entity).unwrap().as_str(), "12");
        assert_eq!(GeoCode::parse("0087", GeoLevel::Municipality).unwrap().as_str(), "087");
        assert_eq!(GeoCode::parse("0", GeoLevel::Municipality).unwrap().as_str(), "000");
    }

    #[test]
    fn rejects_non_numeric_and_too_wide() {
        assert!(GeoCode::parse("", GeoLevel::Entity).is_none());
        assert!(GeoCode::parse("3a", GeoLevel::Entity).is_none());
        assert!(GeoCode::parse("123", GeoLevel::Entity).is_none());
        assert!(GeoCode::parse("-1", GeoLevel::Locality).is_none());
    }

    #[test]
    fn codes_display() {
        let codes = Codes {
            entity: GeoCode::parse("30", GeoLevel::Entity),
            municipality: GeoCode::parse("87", GeoLevel::Municipality),
            locality: None,
        };
        assert_eq!(codes.to_string(), "30/087/_");
    }
}

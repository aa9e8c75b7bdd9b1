use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("'{0}' is not a hex color like #FF6B35")]
pub struct InvalidHexColor(pub String);

/// `#` followed by exactly six hex digits, either case. Stored as given.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HexColor(String);

impl HexColor {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for HexColor {
    type Err = InvalidHexColor;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let valid = s.len() == 7
            && s.starts_with('#')
            && s[1..].chars().all(|c| c.is_ascii_hexdigit());
        if valid {
            Ok(HexColor(s.to_string()))
        } else {
            Err(InvalidHexColor(s.to_string()))
        }
    }
}

impl TryFrom<String> for HexColor {
    type Error = InvalidHexColor;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<HexColor> for String {
    fn from(color: HexColor) -> Self {
        color.0
    }
}

impl fmt::Display for HexColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub color: HexColor,
    pub created_at: DateTime<Utc>,
    pub created_by: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryInsert {
    pub name: String,
    pub description: Option<String>,
    pub color: HexColor,
    pub created_by: Uuid,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CategoryUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<HexColor>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_either_case() {
        assert!("#FF6B35".parse::<HexColor>().is_ok());
        assert!("#ff6b35".parse::<HexColor>().is_ok());
    }

    #[test]
    fn rejects_malformed_colors() {
        for bad in ["#ZZZZZZ", "FF6B35", "#FFF", "#FF6B355", "", "#ff6b3g"] {
            assert!(bad.parse::<HexColor>().is_err(), "{} should be rejected", bad);
        }
    }

    #[test]
    fn deserialization_validates() {
        let row = json!({
            "id": Uuid::new_v4(),
            "name": "Writing",
            "color": "#12345G",
            "created_at": "2024-03-01T10:00:00Z",
            "created_by": Uuid::new_v4(),
        });
        assert!(serde_json::from_value::<Category>(row).is_err());
    }
}

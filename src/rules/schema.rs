//! Rule file document model
//!
//! Configuration format (YAML):
//! ```yaml
//! rules:
//!   - any: ["turn off light", "lights off"]
//!     set: "LIGHT_OFF"
//!   - any: ["전등 꺼", "불 꺼"]
//!     set: "전등 꺼"
//! ```
//!
//! Entries are kept in file order. An entry without a `set` value (or with an
//! empty one) is parsed but never matches.

use serde::{Deserialize, Deserializer};

use crate::error::{ProxyError, Result};

/// Top-level rule document
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RuleFile {
    /// Ordered rule entries; `rules: null` is treated as empty
    #[serde(default, deserialize_with = "null_as_empty")]
    pub rules: Vec<RuleEntry>,
}

/// One `{any, set}` entry as written in the file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RuleEntry {
    /// Trigger phrases, matched in order
    #[serde(default, deserialize_with = "scalar_list")]
    pub any: Vec<String>,

    /// Replacement text
    #[serde(default, deserialize_with = "optional_scalar")]
    pub set: Option<String>,
}

impl RuleFile {
    /// Parse a rule document. An empty (or comment-only) document yields no rules.
    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        match serde_yaml::from_str::<serde_yaml::Value>(content)? {
            serde_yaml::Value::Null => Ok(Self::default()),
            value @ serde_yaml::Value::Mapping(_) => Ok(serde_yaml::from_value(value)?),
            _ => Err(ProxyError::RuleFile(
                "top level must be a mapping with a `rules` key".to_string(),
            )),
        }
    }
}

/// Render a YAML scalar as text: strings as-is, numbers and booleans via Display.
///
/// Quoting `set: "1"` is not required for numeric replacements.
fn scalar_to_string(value: serde_yaml::Value) -> std::result::Result<Option<String>, String> {
    match value {
        serde_yaml::Value::Null => Ok(None),
        serde_yaml::Value::String(s) => Ok(Some(s)),
        serde_yaml::Value::Number(n) => Ok(Some(n.to_string())),
        serde_yaml::Value::Bool(b) => Ok(Some(b.to_string())),
        other => Err(format!("expected a scalar, found {:?}", other)),
    }
}

fn null_as_empty<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

fn scalar_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let values = Option::<Vec<serde_yaml::Value>>::deserialize(deserializer)?.unwrap_or_default();
    let mut out = Vec::with_capacity(values.len());
    for value in values {
        if let Some(s) = scalar_to_string(value).map_err(serde::de::Error::custom)? {
            out.push(s);
        }
    }
    Ok(out)
}

fn optional_scalar<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_yaml::Value::deserialize(deserializer)?;
    scalar_to_string(value).map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rule_file() {
        let yaml = r#"
rules:
  - any: ["turn off light", "lights off"]
    set: LIGHT_OFF
  - any:
      - 전등 꺼
    set: "전등 꺼"
"#;
        let file = RuleFile::from_yaml(yaml).unwrap();
        assert_eq!(file.rules.len(), 2);
        assert_eq!(file.rules[0].any, vec!["turn off light", "lights off"]);
        assert_eq!(file.rules[0].set.as_deref(), Some("LIGHT_OFF"));
        assert_eq!(file.rules[1].any, vec!["전등 꺼"]);
    }

    #[test]
    fn test_parse_empty_document() {
        assert!(RuleFile::from_yaml("").unwrap().rules.is_empty());
        assert!(RuleFile::from_yaml("# nothing yet\n").unwrap().rules.is_empty());
    }

    #[test]
    fn test_parse_null_sections() {
        let file = RuleFile::from_yaml("rules:\n").unwrap();
        assert!(file.rules.is_empty());

        let file = RuleFile::from_yaml("rules:\n  - any:\n    set: X\n").unwrap();
        assert_eq!(file.rules.len(), 1);
        assert!(file.rules[0].any.is_empty());
    }

    #[test]
    fn test_parse_missing_set() {
        let file = RuleFile::from_yaml("rules:\n  - any: [hello]\n").unwrap();
        assert_eq!(file.rules[0].set, None);
    }

    #[test]
    fn test_parse_scalar_coercion() {
        let yaml = "rules:\n  - any: [42, true, hi]\n    set: 7\n";
        let file = RuleFile::from_yaml(yaml).unwrap();
        assert_eq!(file.rules[0].any, vec!["42", "true", "hi"]);
        assert_eq!(file.rules[0].set.as_deref(), Some("7"));
    }

    #[test]
    fn test_parse_rejects_nested_trigger() {
        let yaml = "rules:\n  - any: [[nested]]\n    set: X\n";
        assert!(RuleFile::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_parse_invalid_yaml() {
        let result = RuleFile::from_yaml("rules: [ { any: [a ");
        assert!(matches!(result, Err(ProxyError::RuleFile(_))));
    }

    #[test]
    fn test_parse_rejects_non_mapping() {
        let err = RuleFile::from_yaml("- a\n- b\n").unwrap_err();
        assert!(format!("{}", err).contains("top level must be a mapping"));
        assert!(RuleFile::from_yaml("just a string").is_err());
    }
}

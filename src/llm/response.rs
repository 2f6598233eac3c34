use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub message_id: String,
    pub category: String,
}

/// Pulls structured answers out of model output.
///
/// Models asked for bare JSON still wrap it in markdown fences now and then,
/// so a fenced block is unwrapped before parsing.
pub struct ResponseParser {
    fence_regex: Regex,
}

impl ResponseParser {
    pub fn new() -> Result<Self> {
        // ```json\n{...}\n``` or ```\n[...]\n```
        let fence_regex = Regex::new(r"(?s)^\s*```[a-zA-Z]*\s*(.*?)\s*```\s*$")?;
        Ok(Self { fence_regex })
    }

    fn unwrap_fence<'a>(&self, raw: &'a str) -> &'a str {
        match self.fence_regex.captures(raw).and_then(|caps| caps.get(1)) {
            Some(inner) => {
                debug!("Stripped markdown fence from model output");
                inner.as_str()
            }
            None => raw.trim(),
        }
    }

    /// Accepts `{"points": [...]}` or a bare array of strings.
    pub fn points(&self, raw: &str) -> Result<Vec<String>> {
        let value: Value = serde_json::from_str(self.unwrap_fence(raw))
            .context("Model output is not valid JSON")?;

        let items = match value {
            Value::Array(items) => items,
            Value::Object(mut map) => match map.remove("points") {
                Some(Value::Array(items)) => items,
                Some(_) => anyhow::bail!("\"points\" is not an array"),
                None => anyhow::bail!("Model output has no \"points\" field"),
            },
            _ => anyhow::bail!("Model output is neither an object nor an array"),
        };

        items
            .into_iter()
            .map(|item| match item {
                Value::String(point) => Ok(point),
                other => anyhow::bail!("Point is not a string: {}", other),
            })
            .collect()
    }

    /// Accepts `{"classifications": [...]}` or a bare array of labels.
    pub fn classifications(&self, raw: &str) -> Result<Vec<Classification>> {
        let value: Value = serde_json::from_str(self.unwrap_fence(raw))
            .context("Model output is not valid JSON")?;

        let items = match value {
            Value::Object(mut map) => map
                .remove("classifications")
                .context("Model output has no \"classifications\" field")?,
            array @ Value::Array(_) => array,
            _ => anyhow::bail!("Model output is neither an object nor an array"),
        };

        serde_json::from_value(items).context("Malformed classification entries")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_points_object_and_array() {
        let parser = ResponseParser::new().unwrap();
        assert_eq!(
            parser.points(r#"{"points": ["a", "b"]}"#).unwrap(),
            vec!["a".to_string(), "b".to_string()]
        );
        assert_eq!(parser.points(r#"["a"]"#).unwrap(), vec!["a".to_string()]);
        assert!(parser.points(r#"{"points": []}"#).unwrap().is_empty());
    }

    #[test]
    fn test_points_inside_fence() {
        let parser = ResponseParser::new().unwrap();
        let raw = "```json\n{\"points\": [\"Bans cost jobs\"]}\n```";
        assert_eq!(parser.points(raw).unwrap(), vec!["Bans cost jobs".to_string()]);
    }

    #[test]
    fn test_malformed_points_rejected() {
        let parser = ResponseParser::new().unwrap();
        assert!(parser.points("Sure! Here are the points").is_err());
        assert!(parser.points(r#"{"ideas": ["a"]}"#).is_err());
        assert!(parser.points(r#"{"points": [1, 2]}"#).is_err());
        assert!(parser.points(r#""just a string""#).is_err());
    }

    #[test]
    fn test_classifications() {
        let parser = ResponseParser::new().unwrap();
        let raw = r#"{"classifications": [{"messageId": "m1", "category": "privacy"}]}"#;
        assert_eq!(
            parser.classifications(raw).unwrap(),
            vec![Classification {
                message_id: "m1".to_string(),
                category: "privacy".to_string()
            }]
        );
        assert!(parser.classifications(r#"[{"id": "m1"}]"#).is_err());
    }
}

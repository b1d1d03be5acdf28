use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, de::DeserializeOwned};
use serde_json::Value;

/// How links are written and how incoming paths are routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrlFormat {
    /// `/index?controller=c&action=a&k=v`
    #[default]
    None,
    /// `/index?/c/a/k/v`
    Rewrite,
    /// `/c/a/k/v`
    ApacheRewrite,
}

impl UrlFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            UrlFormat::None => "none",
            UrlFormat::Rewrite => "rewrite",
            UrlFormat::ApacheRewrite => "apache_rewrite",
        }
    }
}

impl FromStr for UrlFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "" | "none" => Ok(UrlFormat::None),
            "rewrite" => Ok(UrlFormat::Rewrite),
            "apache_rewrite" => Ok(UrlFormat::ApacheRewrite),
            other => Err(format!("unknown url format `{other}`")),
        }
    }
}

impl fmt::Display for UrlFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-member toggles stored one row per (member, content) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionKind {
    Like,
    Subscription,
}

impl ReactionKind {
    pub fn table(self) -> &'static str {
        match self {
            ReactionKind::Like => "likes",
            ReactionKind::Subscription => "subscriptions",
        }
    }

    /// Key of the on/off flag in JSON responses.
    pub fn state_key(self) -> &'static str {
        match self {
            ReactionKind::Like => "liked",
            ReactionKind::Subscription => "subscribed",
        }
    }
}

/// Deserialize a flag stored as a boolean, `0`/`1`, or a string.
pub(crate) fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(flag) => flag,
        Value::Number(number) => number.as_i64().is_some_and(|value| value != 0),
        Value::String(text) => matches!(text.trim(), "1" | "true" | "yes" | "on"),
        _ => false,
    })
}

/// Decode a column holding JSON either natively or as text.
pub(crate) fn json_column<T: DeserializeOwned>(value: &Value) -> Result<T, serde_json::Error> {
    match value {
        Value::String(text) => serde_json::from_str(text),
        other => serde_json::from_value(other.clone()),
    }
}

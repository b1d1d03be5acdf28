//! Installed localizations, themes and webfonts, plus per-member reactions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{
    error::DomainError,
    types::{flag, json_column},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstalledLocalization {
    pub id: i64,
    pub name: String,
    pub folder: String,
    #[serde(default)]
    pub iso_code: Option<String>,
    #[serde(default, deserialize_with = "flag")]
    pub is_default: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstalledTheme {
    pub id: i64,
    pub name: String,
    pub folder: String,
    #[serde(default, deserialize_with = "flag")]
    pub is_default: bool,
}

/// style → weight → file name.
pub type WebfontFiles = BTreeMap<String, BTreeMap<String, String>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstalledWebfont {
    pub id: i64,
    pub name: String,
    pub font_family_name: String,
    pub folder: String,
    #[serde(default)]
    pub files: Value,
    #[serde(default)]
    pub unicode_ranges: String,
}

impl InstalledWebfont {
    pub fn files(&self) -> Result<WebfontFiles, DomainError> {
        match &self.files {
            Value::Null => Ok(WebfontFiles::new()),
            Value::String(text) if text.trim().is_empty() => Ok(WebfontFiles::new()),
            value => json_column(value).map_err(|err| {
                DomainError::validation(format!(
                    "webfont `{}` has an unreadable file list: {err}",
                    self.name
                ))
            }),
        }
    }
}

/// A like or a subscription: one row per member and piece of content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reaction {
    #[serde(default)]
    pub id: i64,
    pub member_id: i64,
    pub content_type: String,
    pub content_id: i64,
    #[serde(default)]
    pub created_at: Option<i64>,
}

impl Reaction {
    pub fn targets(&self, content_type: &str, content_id: i64) -> bool {
        self.content_id == content_id && self.content_type.eq_ignore_ascii_case(content_type)
    }
}

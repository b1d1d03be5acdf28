//! Typed forum settings decoded from the `settings` table.
//!
//! Each row carries `name`, `value` and `data_type`. Settings the core reads are
//! lifted into named fields of [`ForumSettings`]; everything else is kept in
//! [`ForumSettings::extra`] with its declared type.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{content::HomeFilter, error::DomainError, types::UrlFormat};

pub const DEFAULT_CSRF_SEED: &str =
    "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

#[derive(Debug, Clone, Deserialize)]
pub struct SettingRow {
    pub name: String,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub data_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SettingValue {
    Bool(bool),
    Int(i64),
    Text(String),
    Json(Value),
}

impl SettingValue {
    /// Interpret a raw column value according to its declared type.
    ///
    /// `serialized` values are stored as JSON documents.
    pub fn parse(name: &str, data_type: &str, raw: Option<&Value>) -> Result<Self, DomainError> {
        let text = match raw {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(text)) => text.clone(),
            Some(other) => other.to_string(),
        };

        match data_type.trim().to_ascii_lowercase().as_str() {
            "bool" | "boolean" => Ok(SettingValue::Bool(matches!(
                text.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            ))),
            "int" | "integer" => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    return Ok(SettingValue::Int(0));
                }
                trimmed.parse::<i64>().map(SettingValue::Int).map_err(|_| {
                    DomainError::validation(format!(
                        "setting `{name}` expects an integer, got `{trimmed}`"
                    ))
                })
            }
            "json" | "serialized" => {
                if let Some(value @ (Value::Array(_) | Value::Object(_))) = raw {
                    return Ok(SettingValue::Json(value.clone()));
                }
                if text.trim().is_empty() {
                    return Ok(SettingValue::Json(Value::Null));
                }
                serde_json::from_str(&text).map(SettingValue::Json).map_err(|err| {
                    DomainError::validation(format!("setting `{name}` is not valid JSON: {err}"))
                })
            }
            _ => Ok(SettingValue::Text(text)),
        }
    }

    pub fn as_bool(&self) -> bool {
        match self {
            SettingValue::Bool(flag) => *flag,
            SettingValue::Int(value) => *value != 0,
            SettingValue::Text(text) => matches!(text.trim(), "1" | "true"),
            SettingValue::Json(value) => value.as_bool().unwrap_or(false),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SettingValue::Bool(flag) => Some(i64::from(*flag)),
            SettingValue::Int(value) => Some(*value),
            SettingValue::Text(text) => text.trim().parse().ok(),
            SettingValue::Json(value) => value.as_i64(),
        }
    }

    pub fn as_text(&self) -> String {
        match self {
            SettingValue::Bool(flag) => if *flag { "1" } else { "0" }.to_string(),
            SettingValue::Int(value) => value.to_string(),
            SettingValue::Text(text) => text.clone(),
            SettingValue::Json(value) => value.to_string(),
        }
    }

    fn as_list(&self) -> Vec<String> {
        match self {
            SettingValue::Json(Value::Array(items)) => items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect(),
            SettingValue::Json(Value::Object(map)) => map
                .values()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect(),
            other => other
                .as_text()
                .split([',', '\n'])
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForumSettings {
    pub community_title: String,
    pub url_format: UrlFormat,
    pub search_bot_list: Vec<String>,
    pub session_duration_minutes: i64,
    pub session_ip_matching: bool,
    pub csrf_enabled: bool,
    pub csrf_one_time_tokens: bool,
    pub csrf_origin_check: bool,
    pub csrf_expiration_seconds: i64,
    pub csrf_seed: String,
    pub account_lockout_enabled: bool,
    pub account_lockout_max_failed_attempts: u32,
    pub account_lockout_allow_expire: bool,
    pub account_lockout_expiration_minutes: i64,
    pub default_localization_id: Option<i64>,
    pub default_theme_id: Option<i64>,
    pub default_webfont_id: Option<i64>,
    pub remember_me_cookie_expiration_days: i64,
    pub home_filter: HomeFilter,
    pub items_per_page: usize,
    pub post_preview_max_length: usize,
    pub time_ago: bool,
    pub extra: BTreeMap<String, SettingValue>,
}

impl Default for ForumSettings {
    fn default() -> Self {
        Self {
            community_title: "Bulletin Fusion".to_string(),
            url_format: UrlFormat::None,
            search_bot_list: Vec::new(),
            session_duration_minutes: 15,
            session_ip_matching: false,
            csrf_enabled: true,
            csrf_one_time_tokens: false,
            csrf_origin_check: false,
            csrf_expiration_seconds: 0,
            csrf_seed: DEFAULT_CSRF_SEED.to_string(),
            account_lockout_enabled: false,
            account_lockout_max_failed_attempts: 5,
            account_lockout_allow_expire: true,
            account_lockout_expiration_minutes: 30,
            default_localization_id: None,
            default_theme_id: None,
            default_webfont_id: None,
            remember_me_cookie_expiration_days: 365,
            home_filter: HomeFilter::Latest,
            items_per_page: 20,
            post_preview_max_length: 200,
            time_ago: true,
            extra: BTreeMap::new(),
        }
    }
}

impl ForumSettings {
    pub fn from_rows<'a, I>(rows: I) -> Result<Self, DomainError>
    where
        I: IntoIterator<Item = &'a SettingRow>,
    {
        let mut settings = ForumSettings::default();
        for row in rows {
            let data_type = row.data_type.as_deref().unwrap_or("string");
            let value = SettingValue::parse(&row.name, data_type, row.value.as_ref())?;
            settings.apply(&row.name, value)?;
        }
        Ok(settings)
    }

    fn apply(&mut self, name: &str, value: SettingValue) -> Result<(), DomainError> {
        match name {
            "community_title" => self.community_title = value.as_text(),
            "url_format_method" => {
                self.url_format = value
                    .as_text()
                    .parse()
                    .map_err(|reason: String| DomainError::validation(reason))?;
            }
            "search_bot_list" => self.search_bot_list = value.as_list(),
            "session_duration_minutes" => {
                self.session_duration_minutes = positive(name, &value)?;
            }
            "session_ip_matching" => self.session_ip_matching = value.as_bool(),
            "csrf_enabled" => self.csrf_enabled = value.as_bool(),
            "csrf_one_time_tokens" => self.csrf_one_time_tokens = value.as_bool(),
            "csrf_origin_check" => self.csrf_origin_check = value.as_bool(),
            "csrf_expiration_seconds" => {
                self.csrf_expiration_seconds = value.as_i64().unwrap_or(0).max(0);
            }
            "csrf_seed" => {
                let seed = value.as_text();
                if !seed.trim().is_empty() {
                    self.csrf_seed = seed;
                }
            }
            "account_lockout_enabled" => self.account_lockout_enabled = value.as_bool(),
            "account_lockout_max_failed_attempts" => {
                let max = positive(name, &value)?;
                self.account_lockout_max_failed_attempts = u32::try_from(max).map_err(|_| {
                    DomainError::validation(format!("setting `{name}` is out of range"))
                })?;
            }
            "account_lockout_allow_expire" => self.account_lockout_allow_expire = value.as_bool(),
            "account_lockout_expiration_minutes" => {
                self.account_lockout_expiration_minutes = positive(name, &value)?;
            }
            "default_localization_id" => self.default_localization_id = value.as_i64(),
            "default_theme_id" => self.default_theme_id = value.as_i64(),
            "default_webfont_id" => self.default_webfont_id = value.as_i64(),
            "remember_me_cookie_expiration" => {
                self.remember_me_cookie_expiration_days = positive(name, &value)?;
            }
            "home_filter" => self.home_filter = value.as_text().parse()?,
            "items_per_page" => self.items_per_page = count(name, &value)?,
            "post_preview_max_length" => self.post_preview_max_length = count(name, &value)?,
            "time_ago" => self.time_ago = value.as_bool(),
            _ => {
                self.extra.insert(name.to_string(), value);
            }
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&SettingValue> {
        self.extra.get(name)
    }
}

fn positive(name: &str, value: &SettingValue) -> Result<i64, DomainError> {
    match value.as_i64() {
        Some(number) if number > 0 => Ok(number),
        _ => Err(DomainError::validation(format!(
            "setting `{name}` must be a positive integer"
        ))),
    }
}

fn count(name: &str, value: &SettingValue) -> Result<usize, DomainError> {
    let number = positive(name, value)?;
    usize::try_from(number)
        .map_err(|_| DomainError::validation(format!("setting `{name}` is out of range")))
}

//! Localized strings loaded from an installed localization's `locale.json`.

use std::{collections::HashMap, fmt::Display, path::Path};

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::{Map, Value};
use tracing::debug;

use crate::infra::error::InfraError;

pub const LOCALE_FILE: &str = "locale.json";

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{\[([A-Za-z0-9_.\-]+)\]\[([A-Za-z0-9_.\-]+)\]\}")
        .expect("invalid placeholder regex")
});

/// category → key → string.
#[derive(Debug, Clone, Default)]
pub struct Localization {
    folder: Option<String>,
    entries: HashMap<String, HashMap<String, String>>,
}

impl Localization {
    pub fn from_json(folder: Option<String>, text: &str) -> Result<Self, serde_json::Error> {
        let root: Map<String, Value> = serde_json::from_str(text)?;
        let mut entries = HashMap::new();
        for (category, value) in root {
            let mut strings = HashMap::new();
            flatten_into(&mut strings, None, &value);
            entries.insert(category, strings);
        }
        Ok(Self { folder, entries })
    }

    /// Read `<dir>/locale.json`.
    pub async fn load(dir: &Path, folder: &str) -> Result<Self, InfraError> {
        let path = dir.join(folder).join(LOCALE_FILE);
        let text = tokio::fs::read_to_string(&path)
            .await
            .map_err(|err| InfraError::file(&path, err))?;
        Self::from_json(Some(folder.to_string()), &text).map_err(|err| {
            InfraError::configuration(format!("`{}` is not valid JSON: {err}", path.display()))
        })
    }

    pub fn folder(&self) -> Option<&str> {
        self.folder.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn lookup(&self, category: &str, key: &str) -> Option<&str> {
        self.entries
            .get(category)
            .and_then(|strings| strings.get(key))
            .map(String::as_str)
    }

    /// The string, or a visible `[category.key]` marker when it is missing.
    pub fn get(&self, category: &str, key: &str) -> String {
        match self.lookup(category, key) {
            Some(text) => text.to_string(),
            None => {
                debug!(
                    target = "bulletin_fusion::application::localization",
                    category,
                    key,
                    folder = self.folder.as_deref().unwrap_or(""),
                    "Missing localized string"
                );
                format!("[{category}.{key}]")
            }
        }
    }

    /// Fill one `${name}` placeholder.
    pub fn replace(&self, category: &str, key: &str, name: &str, value: impl Display) -> String {
        self.get(category, key)
            .replace(&format!("${{{name}}}"), &value.to_string())
    }

    pub fn replace_all<V: Display>(&self, category: &str, key: &str, pairs: &[(&str, V)]) -> String {
        pairs
            .iter()
            .fold(self.get(category, key), |text, (name, value)| {
                text.replace(&format!("${{{name}}}"), &value.to_string())
            })
    }

    /// Substitute every `${[category][key]}` in rendered output.
    pub fn render_placeholders(&self, text: &str) -> String {
        PLACEHOLDER
            .replace_all(text, |captures: &Captures<'_>| self.get(&captures[1], &captures[2]))
            .into_owned()
    }
}

fn flatten_into(target: &mut HashMap<String, String>, prefix: Option<&str>, value: &Value) {
    match value {
        Value::Object(map) => {
            for (key, nested) in map {
                let path = match prefix {
                    Some(prefix) => format!("{prefix}.{key}"),
                    None => key.clone(),
                };
                flatten_into(target, Some(&path), nested);
            }
        }
        Value::String(text) => {
            if let Some(prefix) = prefix {
                target.insert(prefix.to_string(), text.clone());
            }
        }
        Value::Null => {}
        other => {
            if let Some(prefix) = prefix {
                target.insert(prefix.to_string(), other.to_string());
            }
        }
    }
}

//! Members and the devices they are signed in on.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::types::{flag, json_column};

pub const GUEST_ID: i64 = 0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing)]
    pub password_hash: String,
    #[serde(default)]
    pub theme_id: Option<i64>,
    #[serde(default)]
    pub localization_id: Option<i64>,
    #[serde(default, deserialize_with = "flag")]
    pub display_on_whos_online: bool,
    #[serde(default)]
    pub last_online: Option<i64>,
    #[serde(default, skip_serializing)]
    pub lockout: Option<Value>,
}

impl Member {
    pub fn guest() -> Self {
        Self {
            id: GUEST_ID,
            username: "Guest".to_string(),
            display_name: None,
            email: String::new(),
            password_hash: String::new(),
            theme_id: None,
            localization_id: None,
            display_on_whos_online: false,
            last_online: None,
            lockout: None,
        }
    }

    pub fn is_guest(&self) -> bool {
        self.id == GUEST_ID
    }

    pub fn display(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.username)
    }

    /// Lockout bookkeeping; unreadable or missing state counts as unlocked.
    pub fn lockout_state(&self) -> LockoutState {
        match self.lockout.as_ref() {
            None | Some(Value::Null) => LockoutState::default(),
            Some(Value::String(text)) if text.trim().is_empty() => LockoutState::default(),
            Some(value) => json_column(value).unwrap_or_default(),
        }
    }
}

/// Failed sign-in tracking stored as JSON on the member row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockoutState {
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub expires: Option<i64>,
}

impl LockoutState {
    pub fn cleared() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberDevice {
    pub id: String,
    pub member_id: i64,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub user_agent: String,
    #[serde(default)]
    pub last_used: Option<i64>,
}

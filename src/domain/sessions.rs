use serde::{Deserialize, Serialize};

use super::types::flag;

/// One row of the `sessions` table: who is online, where, and until when.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    #[serde(default)]
    pub member_id: i64,
    #[serde(default)]
    pub expires: i64,
    #[serde(default)]
    pub last_click: i64,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub ip_address: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub user_agent: String,
    #[serde(default, deserialize_with = "flag")]
    pub display_on_whos_online: bool,
    #[serde(default, deserialize_with = "flag")]
    pub is_search_bot: bool,
    #[serde(default)]
    pub search_bot_name: Option<String>,
    #[serde(default, deserialize_with = "flag")]
    pub is_admin: bool,
}

impl SessionRecord {
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires < now
    }

    pub fn is_member(&self) -> bool {
        self.member_id != super::members::GUEST_ID
    }
}

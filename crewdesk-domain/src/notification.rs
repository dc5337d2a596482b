use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crewdesk_data::Entity;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub is_read: bool,
    /// In-app path the notification points to.
    pub link: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Entity for Notification {
    type Create = CreateNotification;
    type Update = UpdateNotification;

    fn table_name() -> &'static str {
        "notifications"
    }

    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateNotification {
    pub user_id: String,
    pub title: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateNotification {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_read: Option<bool>,
}

impl UpdateNotification {
    pub fn mark_read() -> Self {
        Self { is_read: Some(true) }
    }
}

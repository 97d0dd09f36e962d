//! Sales activities logged against leads and customers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    Call,
    Email,
    Meeting,
    Note,
    Demo,
    Proposal,
}

impl ActivityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Call => "call",
            Self::Email => "email",
            Self::Meeting => "meeting",
            Self::Note => "note",
            Self::Demo => "demo",
            Self::Proposal => "proposal",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Activity {
    pub id: i64,
    pub company_id: i64,
    pub user_id: i64,
    pub user_name: Option<String>,
    pub lead_id: Option<i64>,
    pub customer_id: Option<i64>,
    pub activity_type: String,
    pub subject: Option<String>,
    pub description: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Select list for `Activity`; expects `activities a LEFT JOIN users u ON u.id = a.user_id`.
pub const ACTIVITY_SELECT: &str = r#"
    SELECT a.id, a.company_id, a.user_id,
           u.first_name || ' ' || u.last_name AS user_name,
           a.lead_id, a.customer_id, a.activity_type, a.subject, a.description,
           a.scheduled_at, a.completed_at, a.created_at
    FROM activities a
    LEFT JOIN users u ON u.id = a.user_id
"#;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateActivityRequest {
    pub activity_type: ActivityType,
    #[serde(default)]
    #[validate(length(max = 200))]
    pub subject: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ActivityListQuery {
    pub lead_id: Option<i64>,
    pub customer_id: Option<i64>,
    pub activity_type: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_activity_type() {
        let parsed: Result<CreateActivityRequest, _> =
            serde_json::from_value(serde_json::json!({ "activity_type": "lunch" }));
        assert!(parsed.is_err());

        let parsed: CreateActivityRequest = serde_json::from_value(serde_json::json!({
            "activity_type": "demo",
            "subject": "Walkthrough"
        }))
        .unwrap();
        assert_eq!(parsed.activity_type, ActivityType::Demo);
    }
}

//! Lead domain types
//!
//! Leads move through a fixed sales pipeline and can be converted into
//! customers once won.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use super::activities::Activity;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    Prospect,
    Contacted,
    Qualified,
    Proposal,
    Negotiation,
    ClosedWon,
    ClosedLost,
}

impl Default for LeadStatus {
    fn default() -> Self {
        Self::Prospect
    }
}

impl LeadStatus {
    /// Pipeline order.
    pub const ALL: [LeadStatus; 7] = [
        LeadStatus::Prospect,
        LeadStatus::Contacted,
        LeadStatus::Qualified,
        LeadStatus::Proposal,
        LeadStatus::Negotiation,
        LeadStatus::ClosedWon,
        LeadStatus::ClosedLost,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prospect => "prospect",
            Self::Contacted => "contacted",
            Self::Qualified => "qualified",
            Self::Proposal => "proposal",
            Self::Negotiation => "negotiation",
            Self::ClosedWon => "closed_won",
            Self::ClosedLost => "closed_lost",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == value)
    }

    /// Chart label, e.g. `Closed Won`.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Prospect => "Prospect",
            Self::Contacted => "Contacted",
            Self::Qualified => "Qualified",
            Self::Proposal => "Proposal",
            Self::Negotiation => "Negotiation",
            Self::ClosedWon => "Closed Won",
            Self::ClosedLost => "Closed Lost",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LeadSource {
    Website,
    Referral,
    ColdCall,
    SocialMedia,
    EmailCampaign,
    Other,
}

impl LeadSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Website => "website",
            Self::Referral => "referral",
            Self::ColdCall => "cold_call",
            Self::SocialMedia => "social_media",
            Self::EmailCampaign => "email_campaign",
            Self::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Lead {
    pub id: i64,
    pub company_id: i64,
    pub assigned_to_id: Option<i64>,
    pub assigned_to_name: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub company_name: Option<String>,
    pub job_title: Option<String>,
    pub industry: Option<String>,
    pub source: Option<String>,
    pub status: String,
    pub estimated_value: Option<Decimal>,
    pub notes: Option<String>,
    pub next_follow_up: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Select list for `Lead`; expects `leads l LEFT JOIN users u ON u.id = l.assigned_to_id`.
pub const LEAD_SELECT: &str = r#"
    SELECT l.id, l.company_id, l.assigned_to_id,
           CASE WHEN u.id IS NULL THEN NULL
                ELSE u.first_name || ' ' || u.last_name END AS assigned_to_name,
           l.first_name, l.last_name, l.email, l.phone, l.company_name, l.job_title,
           l.industry, l.source, l.status, l.estimated_value, l.notes, l.next_follow_up,
           l.created_at, l.updated_at
    FROM leads l
    LEFT JOIN users u ON u.id = l.assigned_to_id
"#;

#[derive(Debug, Clone, Serialize)]
pub struct LeadDetail {
    #[serde(flatten)]
    pub lead: Lead,
    pub activities: Vec<Activity>,
    pub converted_customer_id: Option<i64>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateLeadRequest {
    #[validate(length(min = 1, max = 50, message = "is required"))]
    pub first_name: String,
    #[validate(length(min = 1, max = 50, message = "is required"))]
    pub last_name: String,
    #[validate(email(message = "must be a valid email"))]
    pub email: String,
    #[serde(default)]
    #[validate(length(max = 20))]
    pub phone: Option<String>,
    #[serde(default)]
    #[validate(length(max = 100))]
    pub company_name: Option<String>,
    #[serde(default)]
    #[validate(length(max = 100))]
    pub job_title: Option<String>,
    #[serde(default)]
    #[validate(length(max = 100))]
    pub industry: Option<String>,
    #[serde(default)]
    pub source: Option<LeadSource>,
    #[serde(default)]
    pub status: LeadStatus,
    #[serde(default)]
    pub estimated_value: Option<Decimal>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub next_follow_up: Option<DateTime<Utc>>,
    #[serde(default)]
    pub assigned_to_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateLeadRequest {
    #[validate(length(min = 1, max = 50))]
    pub first_name: Option<String>,
    #[validate(length(min = 1, max = 50))]
    pub last_name: Option<String>,
    #[validate(email(message = "must be a valid email"))]
    pub email: Option<String>,
    #[validate(length(max = 20))]
    pub phone: Option<String>,
    #[validate(length(max = 100))]
    pub company_name: Option<String>,
    #[validate(length(max = 100))]
    pub job_title: Option<String>,
    #[validate(length(max = 100))]
    pub industry: Option<String>,
    pub source: Option<LeadSource>,
    pub status: Option<LeadStatus>,
    pub estimated_value: Option<Decimal>,
    pub notes: Option<String>,
    pub next_follow_up: Option<DateTime<Utc>>,
    pub assigned_to_id: Option<i64>,
}

/// Status arrives as a raw string so unknown values become a 400 with a message.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateLeadStatusRequest {
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssignLeadRequest {
    pub user_id: i64,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LeadListQuery {
    pub status: Option<String>,
    pub source: Option<String>,
    pub assigned_to: Option<i64>,
    pub search: Option<String>,
}

/// Leads per pipeline stage plus headline stage counts.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResponse {
    pub stages: Vec<PipelineStage>,
    pub stats: PipelineStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineStage {
    pub status: LeadStatus,
    pub label: &'static str,
    pub count: usize,
    pub leads: Vec<Lead>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub prospect: i64,
    pub qualified: i64,
    pub proposal: i64,
    pub closed_won: i64,
}

impl PipelineStats {
    /// Builds the headline counts from `(status, count)` pairs; absent stages are 0.
    pub fn from_counts<'a>(counts: impl IntoIterator<Item = &'a (String, i64)>) -> Self {
        let mut stats = Self::default();
        for (status, count) in counts {
            match LeadStatus::parse(status) {
                Some(LeadStatus::Prospect) => stats.prospect = *count,
                Some(LeadStatus::Qualified) => stats.qualified = *count,
                Some(LeadStatus::Proposal) => stats.proposal = *count,
                Some(LeadStatus::ClosedWon) => stats.closed_won = *count,
                _ => {}
            }
        }
        stats
    }
}

/// Groups leads by status in pipeline order, keeping the input order inside each stage.
pub fn group_by_stage(leads: Vec<Lead>) -> Vec<PipelineStage> {
    let mut stages: Vec<PipelineStage> = LeadStatus::ALL
        .into_iter()
        .map(|status| PipelineStage {
            status,
            label: status.label(),
            count: 0,
            leads: Vec::new(),
        })
        .collect();

    for lead in leads {
        if let Some(stage) = stages
            .iter_mut()
            .find(|s| s.status.as_str() == lead.status)
        {
            stage.leads.push(lead);
        }
    }
    for stage in &mut stages {
        stage.count = stage.leads.len();
    }
    stages
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lead(id: i64, status: &str) -> Lead {
        let now = Utc::now();
        Lead {
            id,
            company_id: 1,
            assigned_to_id: None,
            assigned_to_name: None,
            first_name: "A".into(),
            last_name: "B".into(),
            email: "a@b.com".into(),
            phone: None,
            company_name: None,
            job_title: None,
            industry: None,
            source: None,
            status: status.into(),
            estimated_value: None,
            notes: None,
            next_follow_up: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn status_parse_and_labels() {
        assert_eq!(LeadStatus::parse("closed_won"), Some(LeadStatus::ClosedWon));
        assert_eq!(LeadStatus::parse("won"), None);
        assert_eq!(LeadStatus::ClosedLost.label(), "Closed Lost");
    }

    #[test]
    fn pipeline_groups_every_stage() {
        let stages = group_by_stage(vec![
            lead(1, "prospect"),
            lead(2, "closed_won"),
            lead(3, "prospect"),
        ]);
        assert_eq!(stages.len(), 7);
        assert_eq!(stages[0].count, 2);
        assert_eq!(stages[0].leads[1].id, 3);
        assert_eq!(stages[5].count, 1);
        assert_eq!(stages[1].count, 0);
    }

    #[test]
    fn pipeline_stats_default_to_zero() {
        let counts = vec![("prospect".to_string(), 4), ("contacted".to_string(), 2)];
        let stats = PipelineStats::from_counts(&counts);
        assert_eq!(
            stats,
            PipelineStats {
                prospect: 4,
                ..Default::default()
            }
        );
    }
}

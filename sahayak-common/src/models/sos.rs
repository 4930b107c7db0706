//! SOS request model and its classification enums

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

text_enum! {
    /// Processing state of an SOS request
    ///
    /// `Pending → Processing → Resolved | Failed`. Resolved and failed are terminal.
    SosStatus, "status" {
        Pending => "pending",
        Processing => "processing",
        Resolved => "resolved",
        Failed => "failed",
    }
}

impl SosStatus {
    pub fn can_transition_to(&self, next: SosStatus) -> bool {
        matches!(
            (self, next),
            (SosStatus::Pending, SosStatus::Processing)
                | (SosStatus::Processing, SosStatus::Resolved)
                | (SosStatus::Processing, SosStatus::Failed)
                | (SosStatus::Pending, SosStatus::Failed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SosStatus::Resolved | SosStatus::Failed)
    }
}

text_enum! {
    Urgency, "urgency" {
        Low => "low",
        Medium => "medium",
        High => "high",
        Critical => "critical",
    }
}

impl Default for Urgency {
    fn default() -> Self {
        Urgency::Medium
    }
}

text_enum! {
    /// Kind of classroom problem described in a request
    IssueType, "issue type" {
        ConceptConfusion => "concept_confusion",
        BehaviorManagement => "behavior_management",
        EngagementDrop => "engagement_drop",
        ActivityStuck => "activity_stuck",
        Differentiation => "differentiation",
        ResourceMissing => "resource_missing",
        TimeManagement => "time_management",
        Other => "other",
    }
}

impl Default for IssueType {
    fn default() -> Self {
        IssueType::Other
    }
}

impl IssueType {
    /// Human-readable label, e.g. "Concept Confusion"
    pub fn label(&self) -> &'static str {
        match self {
            IssueType::ConceptConfusion => "Concept Confusion",
            IssueType::BehaviorManagement => "Behavior Management",
            IssueType::EngagementDrop => "Engagement Drop",
            IssueType::ActivityStuck => "Activity Stuck",
            IssueType::Differentiation => "Differentiation",
            IssueType::ResourceMissing => "Resource Missing",
            IssueType::TimeManagement => "Time Management",
            IssueType::Other => "Other",
        }
    }
}

text_enum! {
    InputType, "input type" {
        Text => "text",
        Voice => "voice",
    }
}

impl Default for InputType {
    fn default() -> Self {
        InputType::Text
    }
}

/// A teacher's request for help with a live classroom problem
#[derive(Debug, Clone, Serialize)]
pub struct SosRequest {
    pub id: Uuid,
    /// `None` for anonymous quick requests
    pub teacher_id: Option<Uuid>,
    pub teacher_name: Option<String>,
    pub raw_input: String,
    pub input_type: InputType,
    pub input_language: String,

    pub subject: Option<String>,
    pub grade: Option<u32>,
    pub topic: Option<String>,
    pub issue_type: IssueType,
    pub student_count: Option<u32>,
    pub specific_challenge: Option<String>,
    pub urgency: Urgency,

    pub status: SosStatus,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub processing_completed_at: Option<DateTime<Utc>>,
    pub processing_time_ms: Option<i64>,
    pub playbook_id: Option<Uuid>,

    pub was_helpful: Option<bool>,
    pub feedback_rating: Option<u8>,
    pub feedback_text: Option<String>,

    pub school_id: Option<String>,
    pub district: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions() {
        assert!(SosStatus::Pending.can_transition_to(SosStatus::Processing));
        assert!(SosStatus::Processing.can_transition_to(SosStatus::Resolved));
        assert!(SosStatus::Processing.can_transition_to(SosStatus::Failed));
        assert!(!SosStatus::Resolved.can_transition_to(SosStatus::Processing));
        assert!(!SosStatus::Failed.can_transition_to(SosStatus::Resolved));
        assert!(!SosStatus::Pending.can_transition_to(SosStatus::Resolved));
    }

    #[test]
    fn test_terminal_states() {
        assert!(SosStatus::Resolved.is_terminal());
        assert!(SosStatus::Failed.is_terminal());
        assert!(!SosStatus::Processing.is_terminal());
    }

    #[test]
    fn test_issue_type_text_forms() {
        assert_eq!(IssueType::ConceptConfusion.as_str(), "concept_confusion");
        assert_eq!(
            "behavior_management".parse::<IssueType>().unwrap(),
            IssueType::BehaviorManagement
        );
        assert_eq!(
            serde_json::to_string(&IssueType::EngagementDrop).unwrap(),
            "\"engagement_drop\""
        );
        assert_eq!(IssueType::ALL.len(), 8);
    }

    #[test]
    fn test_defaults() {
        assert_eq!(Urgency::default(), Urgency::Medium);
        assert_eq!(IssueType::default(), IssueType::Other);
    }
}

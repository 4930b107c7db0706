//! Teacher-shared solutions and peer votes

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

text_enum! {
    /// Moderation state of a shared solution
    SolutionStatus, "solution status" {
        Pending => "pending",
        Approved => "approved",
        Featured => "featured",
        Archived => "archived",
    }
}

impl SolutionStatus {
    /// Statuses visible in the public library
    pub const PUBLISHED: [SolutionStatus; 2] = [SolutionStatus::Approved, SolutionStatus::Featured];

    pub fn is_published(&self) -> bool {
        Self::PUBLISHED.contains(self)
    }
}

/// Trust score on a 0–5 scale
///
/// `helpful_ratio * 4 + min(usage, 100) / 100`, capped at 5. Returns `None`
/// when no non-neutral votes exist so callers keep the previous score.
pub fn trust_score(helpful: i64, not_helpful: i64, usage: i64) -> Option<f64> {
    let total = helpful + not_helpful;
    if total <= 0 {
        return None;
    }
    let ratio = helpful as f64 / total as f64;
    let usage_bonus = usage.clamp(0, 100) as f64 / 100.0;
    Some((ratio * 4.0 + usage_bonus).min(5.0))
}

#[derive(Debug, Clone, Serialize)]
pub struct SharedSolution {
    pub id: Uuid,
    pub teacher_id: Uuid,
    pub teacher_name: String,
    pub school_id: Option<String>,
    pub district: Option<String>,

    pub problem_description: String,
    pub subject: String,
    pub grade: u32,
    pub topic: Option<String>,

    pub solution_title: String,
    pub solution_description: String,
    pub steps: Vec<String>,
    pub materials_needed: Vec<String>,
    pub time_required_minutes: u32,
    pub original_playbook_id: Option<Uuid>,
    pub is_anonymous: bool,

    pub trust_score: f64,
    pub usage_count: i64,
    pub helpful_count: i64,
    pub not_helpful_count: i64,
    pub total_votes: i64,

    pub status: SolutionStatus,
    pub tags: Vec<String>,
    pub language: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SharedSolution {
    /// Hide author identity for anonymous solutions
    pub fn masked(mut self) -> Self {
        if self.is_anonymous {
            self.teacher_name = format!(
                "Teacher from {}",
                self.district.as_deref().unwrap_or("India")
            );
            self.district = None;
            self.school_id = None;
        }
        self
    }
}

/// One voter's ballot on a solution
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SolutionVote {
    pub solution_id: Uuid,
    pub teacher_id: Uuid,
    pub teacher_name: String,
    /// -1 not helpful, 0 neutral, 1 helpful
    pub vote: i64,
    pub comment: Option<String>,
    pub voted_at: DateTime<Utc>,
}

//! Structured teaching playbooks

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

text_enum! {
    Difficulty, "difficulty" {
        Easy => "easy",
        Medium => "medium",
        Hard => "hard",
    }
}

impl Default for Difficulty {
    fn default() -> Self {
        Difficulty::Medium
    }
}

text_enum! {
    /// Where the playbook text came from
    PlaybookSource, "playbook source" {
        /// Fresh model response
        Model => "model",
        /// Model response served from the playbook cache
        Cache => "cache",
        /// Static text used when the model was unavailable
        Fallback => "fallback",
    }
}

/// One timed step of the recovery plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryStep {
    pub step_number: u32,
    pub action: String,
    pub duration_minutes: u32,
    #[serde(default)]
    pub dialogue: Option<String>,
    #[serde(default)]
    pub expected_outcome: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoResource {
    pub title: String,
    pub url: String,
    pub channel: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeachingResource {
    pub resource_type: String,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub url: Option<String>,
}

/// Parsed playbook body, independent of storage metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybookContent {
    pub title: String,
    pub summary: String,
    pub immediate_actions: Vec<String>,
    pub recovery_steps: Vec<RecoveryStep>,
    pub alternative_strategies: Vec<String>,
    pub success_indicators: Vec<String>,
    pub youtube_videos: Vec<VideoResource>,
    pub teaching_resources: Vec<TeachingResource>,
    pub teaching_tips: Vec<String>,
    pub ncert_reference: Option<String>,
    pub estimated_time_minutes: u32,
    pub difficulty: Difficulty,
}

/// Persisted playbook attached to one SOS request
#[derive(Debug, Clone, Serialize)]
pub struct Playbook {
    pub id: Uuid,
    pub sos_request_id: Uuid,
    #[serde(flatten)]
    pub content: PlaybookContent,
    pub model_used: String,
    pub source: PlaybookSource,
    pub prompt_tokens: Option<i64>,
    pub response_tokens: Option<i64>,
    pub language: String,
    pub times_viewed: i64,
    pub was_implemented: Option<bool>,
    pub effectiveness_rating: Option<u8>,
    pub created_at: DateTime<Utc>,
}

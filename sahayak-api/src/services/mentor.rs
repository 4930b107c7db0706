//! Teaching mentor
//!
//! The mentor profile is derived from a teacher's request history on every
//! read; nothing here is persisted.

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use sahayak_common::models::{IssueType, SosRequest, SosStatus, User};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

use super::analytics::{teacher_dashboard, weekday_name, DailyCount, TeacherSummary};

/// Window used for the engagement score
pub const ENGAGEMENT_DAYS: i64 = 30;
/// An issue seen this many times becomes a growth area
pub const RECURRING_ISSUE_MIN: usize = 3;
const MAX_NUDGES: usize = 3;

#[derive(Debug, Clone, Serialize)]
pub struct MentorProfile {
    pub total_sos_requests: usize,
    pub resolved_successfully: usize,
    pub playbooks_found_helpful: usize,
    pub common_subjects: Vec<String>,
    pub common_grades: Vec<u32>,
    pub common_issues: Vec<(IssueType, usize)>,
    pub peak_hour: Option<u32>,
    pub peak_weekday: Option<u32>,
    pub engagement_score: f64,
}

/// Short micro-learning suggestion tied to a recurring issue
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Nudge {
    pub issue: IssueType,
    pub title: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MentorInsights {
    pub patterns: Vec<String>,
    pub suggestions: Vec<String>,
    pub strengths: Vec<String>,
    pub growth_areas: Vec<String>,
    pub pending_nudges: Vec<Nudge>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WeeklyReport {
    pub period: &'static str,
    pub summary: TeacherSummary,
    pub top_subjects: Vec<String>,
    pub daily_activity: Vec<DailyCount>,
    pub mentor_insights: MentorInsights,
}

/// Values ordered by frequency, ties by first appearance
fn by_frequency<T, I>(values: I) -> Vec<(T, usize)>
where
    T: Eq + std::hash::Hash + Clone,
    I: IntoIterator<Item = T>,
{
    let mut order: Vec<T> = Vec::new();
    let mut counts: HashMap<T, usize> = HashMap::new();
    for value in values {
        let count = counts.entry(value.clone()).or_insert(0);
        if *count == 0 {
            order.push(value);
        }
        *count += 1;
    }
    let mut ranked: Vec<(T, usize)> = order
        .into_iter()
        .map(|v| {
            let n = counts[&v];
            (v, n)
        })
        .collect();
    // Stable sort keeps first-appearance order among equal counts
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked
}

impl MentorProfile {
    /// `history` may be in any order
    pub fn from_history(history: &[SosRequest], now: DateTime<Utc>) -> Self {
        let mut ordered: Vec<&SosRequest> = history.iter().collect();
        ordered.sort_by_key(|r| r.created_at);

        let resolved = ordered.iter().filter(|r| r.status == SosStatus::Resolved).count();
        let helpful = ordered
            .iter()
            .filter(|r| r.status == SosStatus::Resolved && r.was_helpful == Some(true))
            .count();

        let since = now - Duration::days(ENGAGEMENT_DAYS);
        let active_days: HashSet<_> = ordered
            .iter()
            .filter(|r| r.created_at >= since)
            .map(|r| r.created_at.date_naive())
            .collect();
        let engagement = active_days.len() as f64 / ENGAGEMENT_DAYS as f64 * 100.0;

        Self {
            total_sos_requests: ordered.len(),
            resolved_successfully: resolved,
            playbooks_found_helpful: helpful,
            common_subjects: by_frequency(ordered.iter().filter_map(|r| r.subject.clone()))
                .into_iter()
                .map(|(s, _)| s)
                .collect(),
            common_grades: by_frequency(ordered.iter().filter_map(|r| r.grade))
                .into_iter()
                .map(|(g, _)| g)
                .collect(),
            common_issues: by_frequency(ordered.iter().map(|r| r.issue_type)),
            peak_hour: by_frequency(ordered.iter().map(|r| r.created_at.hour()))
                .first()
                .map(|(h, _)| *h),
            peak_weekday: by_frequency(ordered.iter().map(|r| r.created_at.weekday().num_days_from_monday()))
                .first()
                .map(|(d, _)| *d),
            engagement_score: ((engagement * 10.0).round() / 10.0).min(100.0),
        }
    }

    pub fn insights(&self) -> MentorInsights {
        let mut patterns = Vec::new();
        if let Some(hour) = self.peak_hour {
            if hour < 12 {
                patterns.push("Most challenges occur in morning sessions".to_string());
            } else {
                patterns.push("Most challenges occur in afternoon sessions".to_string());
            }
        }
        if let Some(day) = self.peak_weekday {
            patterns.push(format!("{} is your busiest day for classroom support", weekday_name(day as usize)));
        }

        let suggestions = self
            .common_issues
            .iter()
            .take(3)
            .filter_map(|(issue, _)| suggestion_for(*issue))
            .map(str::to_string)
            .collect();

        let mut strengths = Vec::new();
        if self.resolved_successfully > 0 && self.playbooks_found_helpful * 10 >= self.resolved_successfully * 7 {
            strengths.push("Applies suggested strategies effectively".to_string());
        }
        if self.engagement_score >= 50.0 {
            strengths.push("Reflects on classroom challenges regularly".to_string());
        }
        if self.common_subjects.len() >= 3 {
            strengths.push("Teaches confidently across several subjects".to_string());
        }

        let recurring: Vec<IssueType> = self
            .common_issues
            .iter()
            .filter(|(issue, count)| *count >= RECURRING_ISSUE_MIN && *issue != IssueType::Other)
            .map(|(issue, _)| *issue)
            .collect();

        MentorInsights {
            patterns,
            suggestions,
            strengths,
            growth_areas: recurring
                .iter()
                .map(|issue| format!("Recurring {} challenges", issue.label().to_lowercase()))
                .collect(),
            pending_nudges: recurring.iter().filter_map(|issue| nudge_for(*issue)).take(MAX_NUDGES).collect(),
        }
    }
}

fn suggestion_for(issue: IssueType) -> Option<&'static str> {
    match issue {
        IssueType::ConceptConfusion => Some("Try using more visual aids and manipulatives"),
        IssueType::BehaviorManagement => Some("Consider implementing classroom management techniques"),
        IssueType::EngagementDrop => Some("Incorporate more interactive activities"),
        IssueType::ActivityStuck => Some("Break activities into short steps with a demo first"),
        IssueType::Differentiation => Some("Plan one extension and one support task per lesson"),
        IssueType::ResourceMissing => Some("Keep a kit of low-cost materials from everyday objects"),
        IssueType::TimeManagement => Some("Split lessons into timed segments with visible cues"),
        IssueType::Other => None,
    }
}

fn nudge_for(issue: IssueType) -> Option<Nudge> {
    let (title, message) = match issue {
        IssueType::ConceptConfusion => (
            "Concrete, pictorial, abstract",
            "Introduce the next new concept with objects first, then drawings, then symbols.",
        ),
        IssueType::BehaviorManagement => (
            "Attention signals",
            "Agree on one clap pattern with the class and practise it twice this week.",
        ),
        IssueType::EngagementDrop => (
            "Think-pair-share",
            "Give pairs one minute to discuss before taking answers from the class.",
        ),
        IssueType::ActivityStuck => (
            "Model before you assign",
            "Complete the first example of an activity aloud before students start.",
        ),
        IssueType::Differentiation => (
            "Three-level tasks",
            "Prepare an easy, core and challenge version of one worksheet.",
        ),
        IssueType::ResourceMissing => (
            "Zero-cost materials",
            "Collect bottle caps, sticks or leaves to use as counters and models.",
        ),
        IssueType::TimeManagement => (
            "Timed lesson plan",
            "Write minute targets beside each part of tomorrow's lesson plan.",
        ),
        IssueType::Other => return None,
    };
    Some(Nudge {
        issue,
        title: title.to_string(),
        message: message.to_string(),
    })
}

/// Seven-day summary with mentor insights over the full history
pub fn weekly_report(user: &User, history: &[SosRequest], now: DateTime<Utc>) -> WeeklyReport {
    let week = teacher_dashboard(user, history, 7, now);
    WeeklyReport {
        period: "Last 7 days",
        summary: week.summary,
        top_subjects: week.subject_distribution.into_iter().take(3).map(|c| c.name).collect(),
        daily_activity: week.daily_activity,
        mentor_insights: MentorProfile::from_history(history, now).insights(),
    }
}

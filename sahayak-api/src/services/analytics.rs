//! Dashboard aggregation
//!
//! Pure functions over already-loaded records. Callers fetch the requests,
//! teachers and solutions for a scope; nothing here touches the database.

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use sahayak_common::models::{IssueType, SharedSolution, SosRequest, SosStatus, User};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use uuid::Uuid;

use super::context_engine::truncate_chars;
use crate::db::solutions::ContributorTotals;

/// Solutions with at least this trust score count as proven
pub const PROVEN_TRUST_SCORE: f64 = 3.0;
/// Subject request count that signals a training need
pub const TRAINING_NEED_THRESHOLD: usize = 5;
/// Training needs at or above this count are high priority
pub const TRAINING_NEED_HIGH: usize = 20;
const LEADERBOARD_SIZE: usize = 10;
const RECENT_INPUT_CHARS: usize = 100;

const WEEKDAYS: [&str; 7] = [
    "Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday", "Sunday",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamedCount {
    pub name: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyCount {
    pub date: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IssueTrend {
    pub date: String,
    #[serde(flatten)]
    pub counts: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardEntry {
    pub teacher_id: Uuid,
    pub teacher_name: String,
    pub solutions_shared: i64,
    pub helpful_votes: i64,
    pub score: i64,
}

/// Compact request summary for dashboards
#[derive(Debug, Clone, Serialize)]
pub struct RecentRequest {
    pub id: Uuid,
    pub raw_input: String,
    pub subject: Option<String>,
    pub grade: Option<u32>,
    pub topic: Option<String>,
    pub urgency: String,
    pub status: SosStatus,
    pub playbook_id: Option<Uuid>,
    pub processing_time_ms: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl From<&SosRequest> for RecentRequest {
    fn from(r: &SosRequest) -> Self {
        Self {
            id: r.id,
            raw_input: truncate_chars(&r.raw_input, RECENT_INPUT_CHARS),
            subject: r.subject.clone(),
            grade: r.grade,
            topic: r.topic.clone(),
            urgency: r.urgency.to_string(),
            status: r.status,
            playbook_id: r.playbook_id,
            processing_time_ms: r.processing_time_ms,
            created_at: r.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProvenSolution {
    pub id: Uuid,
    pub title: String,
    pub subject: String,
    pub trust_score: f64,
    pub usage_count: i64,
}

impl From<&SharedSolution> for ProvenSolution {
    fn from(s: &SharedSolution) -> Self {
        Self {
            id: s.id,
            title: s.solution_title.clone(),
            subject: s.subject.clone(),
            trust_score: s.trust_score,
            usage_count: s.usage_count,
        }
    }
}

// ========================================
// Shared helpers
// ========================================

fn counter<I>(keys: I) -> HashMap<String, usize>
where
    I: IntoIterator<Item = String>,
{
    let mut map = HashMap::new();
    for key in keys {
        *map.entry(key).or_insert(0) += 1;
    }
    map
}

/// Highest counts first; ties ordered by name
fn most_common(map: HashMap<String, usize>, n: usize) -> Vec<NamedCount> {
    let mut items: Vec<NamedCount> = map
        .into_iter()
        .map(|(name, count)| NamedCount { name, count })
        .collect();
    items.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
    items.truncate(n);
    items
}

fn distribution<I: IntoIterator<Item = String>>(keys: I) -> BTreeMap<String, usize> {
    counter(keys).into_iter().collect()
}

fn day_key(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d").to_string()
}

fn daily_counts(requests: &[&SosRequest]) -> Vec<DailyCount> {
    distribution(requests.iter().map(|r| day_key(&r.created_at)))
        .into_iter()
        .map(|(date, count)| DailyCount { date, count })
        .collect()
}

fn issue_name(r: &SosRequest) -> String {
    r.issue_type.as_str().to_string()
}

fn subject_or(r: &SosRequest, missing: &str) -> String {
    r.subject.clone().unwrap_or_else(|| missing.to_string())
}

fn in_window<'a>(requests: &'a [SosRequest], since: DateTime<Utc>) -> Vec<&'a SosRequest> {
    requests.iter().filter(|r| r.created_at >= since).collect()
}

fn rate(part: usize, whole: usize) -> f64 {
    round1(part as f64 / whole.max(1) as f64 * 100.0)
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn average_processing_ms(requests: &[&SosRequest]) -> Option<f64> {
    let times: Vec<i64> = requests
        .iter()
        .filter_map(|r| r.processing_time_ms)
        .filter(|ms| *ms > 0)
        .collect();
    if times.is_empty() {
        None
    } else {
        Some(round1(times.iter().sum::<i64>() as f64 / times.len() as f64))
    }
}

/// 24 rows (hour) by 7 columns (Monday first)
pub fn hour_weekday_heatmap<'a, I>(requests: I) -> Vec<Vec<u32>>
where
    I: IntoIterator<Item = &'a SosRequest>,
{
    let mut grid = vec![vec![0u32; 7]; 24];
    for r in requests {
        let hour = r.created_at.hour() as usize;
        let day = r.created_at.weekday().num_days_from_monday() as usize;
        grid[hour][day] += 1;
    }
    grid
}

pub fn weekday_name(index: usize) -> &'static str {
    WEEKDAYS.get(index).copied().unwrap_or("Unknown")
}

/// Rank contributors by `solutions × 10 + helpful votes × 2`, top 10
pub fn leaderboard(contributors: &[ContributorTotals]) -> Vec<LeaderboardEntry> {
    let mut entries: Vec<LeaderboardEntry> = contributors
        .iter()
        .map(|c| LeaderboardEntry {
            teacher_id: c.teacher_id,
            teacher_name: c.teacher_name.clone(),
            solutions_shared: c.solutions,
            helpful_votes: c.helpful_votes,
            score: c.solutions * 10 + c.helpful_votes * 2,
        })
        .collect();
    entries.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| a.teacher_name.cmp(&b.teacher_name))
    });
    entries.truncate(LEADERBOARD_SIZE);
    entries
}

// ========================================
// Teacher view
// ========================================

#[derive(Debug, Clone, Serialize)]
pub struct TeacherSummary {
    pub total_sos_requests: usize,
    pub total_successful_resolutions: usize,
    pub helpful_resolutions: usize,
    pub window_requests: usize,
    pub resolution_rate: f64,
    pub days_analyzed: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TeacherDashboard {
    pub user: User,
    pub summary: TeacherSummary,
    pub recent_sos: Vec<RecentRequest>,
    pub top_issues: Vec<NamedCount>,
    pub subjects_taught: Vec<String>,
    pub subject_distribution: Vec<NamedCount>,
    pub issue_distribution: Vec<NamedCount>,
    pub daily_activity: Vec<DailyCount>,
    pub weekly_heatmap: Vec<Vec<u32>>,
}

/// `history` is the teacher's full request history in any order
pub fn teacher_dashboard(user: &User, history: &[SosRequest], days: i64, now: DateTime<Utc>) -> TeacherDashboard {
    let window = in_window(history, now - Duration::days(days));
    let resolved = history.iter().filter(|r| r.status == SosStatus::Resolved).count();
    let helpful = history
        .iter()
        .filter(|r| r.status == SosStatus::Resolved && r.was_helpful == Some(true))
        .count();
    let window_resolved = window.iter().filter(|r| r.status == SosStatus::Resolved).count();

    let mut newest: Vec<&SosRequest> = history.iter().collect();
    newest.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let subjects_taught = most_common(counter(history.iter().filter_map(|r| r.subject.clone())), usize::MAX)
        .into_iter()
        .map(|c| c.name)
        .collect();

    TeacherDashboard {
        user: user.clone(),
        summary: TeacherSummary {
            total_sos_requests: history.len(),
            total_successful_resolutions: resolved,
            helpful_resolutions: helpful,
            window_requests: window.len(),
            resolution_rate: rate(window_resolved, window.len()),
            days_analyzed: days,
        },
        recent_sos: newest.iter().take(5).map(|r| RecentRequest::from(*r)).collect(),
        top_issues: most_common(counter(history.iter().map(issue_name)), 5),
        subjects_taught,
        subject_distribution: most_common(counter(window.iter().filter_map(|r| r.subject.clone())), 6),
        issue_distribution: most_common(counter(window.iter().map(|r| issue_name(r))), 6),
        daily_activity: daily_counts(&window),
        weekly_heatmap: hour_weekday_heatmap(window.iter().copied()),
    }
}

// ========================================
// Cluster (CRP) view
// ========================================

#[derive(Debug, Clone, Serialize)]
pub struct ClusterSummary {
    pub total_teachers: usize,
    pub active_teachers: usize,
    pub engagement_rate: f64,
    pub total_sos: usize,
    pub avg_resolution_time_ms: Option<f64>,
    pub days_analyzed: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClusterDashboard {
    pub summary: ClusterSummary,
    pub issue_distribution: BTreeMap<String, usize>,
    pub subject_distribution: BTreeMap<String, usize>,
    pub urgency_distribution: BTreeMap<String, usize>,
    pub daily_trends: Vec<DailyCount>,
    pub frequent_problems: Vec<NamedCount>,
    pub issue_trends: Vec<IssueTrend>,
    pub proven_solutions: Vec<ProvenSolution>,
    pub teacher_leaderboard: Vec<LeaderboardEntry>,
}

fn teacher_ids(teachers: &[User]) -> HashSet<Uuid> {
    teachers.iter().map(|t| t.id).collect()
}

/// Requests in the window authored by one of `teachers`
fn scoped<'a>(requests: &'a [SosRequest], teachers: &HashSet<Uuid>, since: DateTime<Utc>) -> Vec<&'a SosRequest> {
    in_window(requests, since)
        .into_iter()
        .filter(|r| r.teacher_id.is_some_and(|id| teachers.contains(&id)))
        .collect()
}

pub fn cluster_dashboard(
    teachers: &[User],
    requests: &[SosRequest],
    proven: &[SharedSolution],
    contributors: &[ContributorTotals],
    days: i64,
    now: DateTime<Utc>,
) -> ClusterDashboard {
    let ids = teacher_ids(teachers);
    let cluster = scoped(requests, &ids, now - Duration::days(days));
    let active: HashSet<Uuid> = cluster.iter().filter_map(|r| r.teacher_id).collect();

    let mut per_day: BTreeMap<String, BTreeMap<String, usize>> = BTreeMap::new();
    for r in &cluster {
        *per_day
            .entry(day_key(&r.created_at))
            .or_default()
            .entry(issue_name(r))
            .or_insert(0) += 1;
    }

    ClusterDashboard {
        summary: ClusterSummary {
            total_teachers: teachers.len(),
            active_teachers: active.len(),
            engagement_rate: rate(active.len(), teachers.len()),
            total_sos: cluster.len(),
            avg_resolution_time_ms: average_processing_ms(&cluster),
            days_analyzed: days,
        },
        issue_distribution: distribution(cluster.iter().map(|r| issue_name(r))),
        subject_distribution: distribution(cluster.iter().map(|r| subject_or(r, "Unknown"))),
        urgency_distribution: distribution(cluster.iter().map(|r| r.urgency.to_string())),
        daily_trends: daily_counts(&cluster),
        frequent_problems: most_common(
            counter(
                cluster
                    .iter()
                    .map(|r| format!("{} - {}", subject_or(r, "General"), r.issue_type)),
            ),
            10,
        ),
        issue_trends: per_day
            .into_iter()
            .map(|(date, counts)| IssueTrend { date, counts })
            .collect(),
        proven_solutions: proven
            .iter()
            .filter(|s| s.status.is_published() && s.trust_score >= PROVEN_TRUST_SCORE)
            .take(10)
            .map(ProvenSolution::from)
            .collect(),
        teacher_leaderboard: leaderboard(contributors),
    }
}

// ========================================
// District (DIET) view
// ========================================

#[derive(Debug, Clone, Serialize)]
pub struct DistrictSummary {
    pub total_teachers: usize,
    pub total_blocks: usize,
    pub total_sos: usize,
    pub avg_sos_per_teacher: f64,
    pub days_analyzed: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockActivity {
    pub block: String,
    pub teachers: usize,
    pub sos_count: usize,
    pub intensity: f64,
}

/// Foundational literacy and numeracy gap counters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FlnGaps {
    pub reading_comprehension: usize,
    pub basic_numeracy: usize,
    pub writing_skills: usize,
    pub oral_expression: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingNeed {
    pub area: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub incident_count: usize,
    pub priority: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportSummary {
    pub generated_at: DateTime<Utc>,
    pub total_teachers: usize,
    pub total_sos_requests: usize,
    pub blocks_analyzed: usize,
    pub top_training_needs: Vec<TrainingNeed>,
    pub key_insights: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DistrictDashboard {
    pub summary: DistrictSummary,
    pub block_heatmap: Vec<BlockActivity>,
    pub fln_gaps: FlnGaps,
    pub training_needs: Vec<TrainingNeed>,
    pub subject_distribution: Vec<NamedCount>,
    pub grade_distribution: Vec<NamedCount>,
    pub daily_trends: Vec<DailyCount>,
    pub teacher_leaderboard: Vec<LeaderboardEntry>,
    pub exportable_summary: ExportSummary,
}

const LANGUAGE_SUBJECTS: &[&str] = &["English", "Hindi", "Kannada"];
const READING_WORDS: &[&str] = &["read", "phonics", "letters", "comprehension"];
const WRITING_WORDS: &[&str] = &["writ", "spelling", "handwriting"];
const ORAL_WORDS: &[&str] = &["speak", "spoken", "oral", "pronunciation"];

/// Foundational-stage requests (class 5 or below, or unknown) sorted into FLN areas
pub fn fln_gaps<'a, I>(requests: I) -> FlnGaps
where
    I: IntoIterator<Item = &'a SosRequest>,
{
    let mut gaps = FlnGaps::default();
    for r in requests {
        if r.grade.is_some_and(|g| g > 5) {
            continue;
        }
        let subject = r.subject.as_deref().unwrap_or("");
        if subject == "Mathematics" {
            if matches!(r.issue_type, IssueType::ConceptConfusion | IssueType::Differentiation) {
                gaps.basic_numeracy += 1;
            }
            continue;
        }
        if !LANGUAGE_SUBJECTS.contains(&subject) {
            continue;
        }
        let text = r.raw_input.to_lowercase();
        let mentions = |words: &[&str]| words.iter().any(|w| text.contains(w));
        if mentions(READING_WORDS) {
            gaps.reading_comprehension += 1;
        } else if mentions(WRITING_WORDS) {
            gaps.writing_skills += 1;
        } else if mentions(ORAL_WORDS) {
            gaps.oral_expression += 1;
        }
    }
    gaps
}

/// Top five subjects with at least five requests
pub fn training_needs(subject_counts: &[NamedCount]) -> Vec<TrainingNeed> {
    subject_counts
        .iter()
        .take(5)
        .filter(|c| c.count >= TRAINING_NEED_THRESHOLD)
        .map(|c| TrainingNeed {
            area: c.name.clone(),
            kind: "subject",
            incident_count: c.count,
            priority: if c.count >= TRAINING_NEED_HIGH { "high" } else { "medium" },
        })
        .collect()
}

pub fn district_dashboard(
    teachers: &[User],
    requests: &[SosRequest],
    contributors: &[ContributorTotals],
    days: i64,
    now: DateTime<Utc>,
) -> DistrictDashboard {
    let ids = teacher_ids(teachers);
    let district = scoped(requests, &ids, now - Duration::days(days));

    let block_of: HashMap<Uuid, String> = teachers
        .iter()
        .map(|t| (t.id, t.block.clone().unwrap_or_else(|| "Unknown".to_string())))
        .collect();
    let mut blocks: BTreeMap<String, (usize, usize)> = BTreeMap::new();
    for block in block_of.values() {
        blocks.entry(block.clone()).or_default().0 += 1;
    }
    for r in &district {
        if let Some(block) = r.teacher_id.and_then(|id| block_of.get(&id)) {
            blocks.entry(block.clone()).or_default().1 += 1;
        }
    }
    let block_heatmap: Vec<BlockActivity> = blocks
        .into_iter()
        .map(|(block, (teachers, sos_count))| BlockActivity {
            block,
            teachers,
            sos_count,
            intensity: round1(sos_count as f64 / teachers.max(1) as f64),
        })
        .collect();

    let subject_counts = most_common(counter(district.iter().filter_map(|r| r.subject.clone())), 8);
    let needs = training_needs(&subject_counts);

    let busiest_block = block_heatmap
        .iter()
        .max_by(|a, b| a.sos_count.cmp(&b.sos_count).then_with(|| b.block.cmp(&a.block)))
        .map(|b| b.block.clone())
        .unwrap_or_else(|| "N/A".to_string());

    let exportable_summary = ExportSummary {
        generated_at: now,
        total_teachers: teachers.len(),
        total_sos_requests: district.len(),
        blocks_analyzed: block_heatmap.len(),
        top_training_needs: needs.iter().take(3).cloned().collect(),
        key_insights: vec![
            format!("{} classroom issues handled in analysis period", district.len()),
            format!("{} training priority areas identified", needs.len()),
            format!("Highest activity in {}", busiest_block),
        ],
    };

    DistrictDashboard {
        summary: DistrictSummary {
            total_teachers: teachers.len(),
            total_blocks: block_heatmap.len(),
            total_sos: district.len(),
            avg_sos_per_teacher: round1(district.len() as f64 / teachers.len().max(1) as f64),
            days_analyzed: days,
        },
        fln_gaps: fln_gaps(district.iter().copied()),
        training_needs: needs,
        subject_distribution: subject_counts,
        grade_distribution: most_common(
            counter(district.iter().filter_map(|r| r.grade.map(|g| g.to_string()))),
            10,
        ),
        daily_trends: daily_counts(&district),
        teacher_leaderboard: leaderboard(contributors),
        block_heatmap,
        exportable_summary,
    }
}

// ========================================
// Public overview
// ========================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Overview {
    pub total_teachers: i64,
    pub total_sos_requests: i64,
    pub total_playbooks_generated: i64,
    pub successful_resolutions: i64,
    pub success_rate: f64,
}

pub fn overview(users: i64, requests: i64, playbooks: i64, resolved: i64) -> Overview {
    Overview {
        total_teachers: users,
        total_sos_requests: requests,
        total_playbooks_generated: playbooks,
        successful_resolutions: resolved,
        success_rate: round1(resolved as f64 / requests.max(1) as f64 * 100.0),
    }
}

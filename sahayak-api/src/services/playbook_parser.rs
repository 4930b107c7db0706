//! Markdown playbook parser
//!
//! Splits model output into heading sections and pulls structured fields out
//! of each. Parsing never fails: absent sections yield defaults, and text too
//! short to be a playbook yields the default playbook.

use once_cell::sync::Lazy;
use regex::Regex;
use sahayak_common::models::{
    Difficulty, PlaybookContent, RecoveryStep, TeachingResource, VideoResource,
};

use super::context_engine::truncate_chars;

pub const DEFAULT_TITLE: &str = "Teaching Rescue Playbook";
const DEFAULT_ESTIMATED_MINUTES: u32 = 10;
const MAX_ESTIMATED_MINUTES: u32 = 45;
const DEFAULT_STEP_MINUTES: u32 = 3;
/// Responses shorter than this are not treated as playbooks
const MIN_RESPONSE_CHARS: usize = 50;

const MAX_IMMEDIATE_ACTIONS: usize = 5;
const MAX_RECOVERY_STEPS: usize = 5;
const MAX_ALTERNATIVES: usize = 3;
const MAX_INDICATORS: usize = 5;
const MAX_TIPS: usize = 5;
const MAX_RESOURCES: usize = 5;

const YOUTUBE_SEARCH_URL: &str = "https://www.youtube.com/results?search_query=";

const DEFAULT_TIPS: [&str; 5] = [
    "Use visual aids like diagrams and charts",
    "Break complex concepts into smaller steps",
    "Encourage peer discussion and teaching",
    "Relate topics to real-world examples students know",
    "Check understanding with quick formative questions",
];

static STEP_BOLD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\*\*\s*step\s*(\d+)\s*[:.\-]?\s*([^*]*?)\s*\*\*\s*(?:\(\s*(\d+)\s*(?:min|mins|minutes)?\s*\))?")
        .expect("valid regex")
});
static STEP_PLAIN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*step\s*(\d+)\s*[:.\-]\s*(.+?)\s*(?:\(\s*(\d+)\s*(?:min|mins|minutes)?\s*\))?\s*$")
        .expect("valid regex")
});
static LIST_ITEM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:\d+[.)]|[-*•])\s+(.+)$").expect("valid regex"));
static TITLE_LINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^\s*\**title\**\s*:\s*\**\s*(.+?)\s*\**\s*$").expect("valid regex")
});
static TIME_ESTIMATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)time\s*estimate\s*:?\s*\**\s*(\d+)").expect("valid regex")
});
static TIME_LOOSE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\btime\s*:\s*\**\s*(\d+)").expect("valid regex"));
static DIFFICULTY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)difficulty\s*:?\s*\**\s*(easy|medium|hard)").expect("valid regex")
});
static RESOURCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\*\*([^*]+)\*\*\s*:?\s*(.*)$").expect("valid regex"));
static URL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://[^\s)\]]+").expect("valid regex"));

/// Request context used to build video search links
#[derive(Debug, Clone, Copy, Default)]
pub struct ParseHints<'a> {
    pub subject: Option<&'a str>,
    pub grade: Option<u32>,
    pub topic: Option<&'a str>,
}

struct Section<'a> {
    /// Lower-cased heading text with decoration removed
    heading: String,
    lines: Vec<&'a str>,
}

fn split_sections(text: &str) -> Vec<Section<'_>> {
    let mut sections = Vec::new();
    let mut current: Option<Section<'_>> = None;

    for line in text.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with('#') {
            if let Some(section) = current.take() {
                sections.push(section);
            }
            let heading = trimmed
                .trim_start_matches('#')
                .trim_start_matches(|c: char| !c.is_alphanumeric())
                .trim()
                .to_lowercase();
            current = Some(Section {
                heading,
                lines: Vec::new(),
            });
        } else if let Some(section) = current.as_mut() {
            section.lines.push(line);
        }
    }

    if let Some(section) = current {
        sections.push(section);
    }
    sections
}

fn find_section<'s, 'a>(sections: &'s [Section<'a>], prefixes: &[&str]) -> Option<&'s Section<'a>> {
    sections
        .iter()
        .find(|s| prefixes.iter().any(|p| s.heading.starts_with(p)))
}

/// Strip markdown emphasis and decorative leading symbols
fn clean_item(text: &str) -> String {
    text.replace("**", "")
        .trim()
        .trim_start_matches(|c: char| !c.is_alphanumeric() && c != '"' && c != '(')
        .trim()
        .to_string()
}

fn list_items(lines: &[&str]) -> Vec<String> {
    lines
        .iter()
        .filter_map(|line| LIST_ITEM_RE.captures(line))
        .filter_map(|caps| caps.get(1).map(|m| clean_item(m.as_str())))
        .filter(|item| item.chars().count() > 5)
        .collect()
}

fn first_text_line(lines: &[&str]) -> Option<String> {
    lines
        .iter()
        .map(|l| clean_item(l.trim().trim_matches(|c: char| c == '[' || c == ']')))
        .find(|l| !l.is_empty())
}

/// Parse model markdown into playbook content
pub fn parse_playbook(text: &str, hints: &ParseHints<'_>) -> PlaybookContent {
    if text.trim().chars().count() < MIN_RESPONSE_CHARS {
        return default_playbook(hints);
    }

    let sections = split_sections(text);

    let title = find_section(&sections, &["title"])
        .and_then(|s| first_text_line(&s.lines))
        .or_else(|| {
            TITLE_LINE_RE
                .captures(text)
                .and_then(|c| c.get(1))
                .map(|m| clean_item(m.as_str()))
        })
        .filter(|t| !t.is_empty())
        .map(|t| truncate_chars(&t, 200))
        .unwrap_or_else(|| DEFAULT_TITLE.to_string());

    let summary = find_section(&sections, &["summary"])
        .map(|s| {
            s.lines
                .iter()
                .map(|l| l.trim())
                .filter(|l| !l.is_empty())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .map(|s| truncate_chars(&s, 500))
        .unwrap_or_default();

    let immediate_actions = section_items(&sections, &["immediate action"], MAX_IMMEDIATE_ACTIONS);
    let alternative_strategies = section_items(&sections, &["alternative"], MAX_ALTERNATIVES);
    let success_indicators = section_items(&sections, &["success indicator"], MAX_INDICATORS);

    let recovery_steps = parse_recovery_steps(text, &sections);

    let ncert_reference = find_section(&sections, &["ncert reference", "ncert"])
        .map(|s| {
            s.lines
                .iter()
                .map(|l| l.trim())
                .filter(|l| !l.is_empty())
                .collect::<Vec<_>>()
                .join("\n")
        })
        .filter(|r| r.chars().count() > 10)
        .map(|r| truncate_chars(&r, 500));

    let mut teaching_tips =
        section_items(&sections, &["quick teaching tip", "teaching tip", "tips"], MAX_TIPS);
    if teaching_tips.is_empty() {
        teaching_tips = DEFAULT_TIPS.iter().map(|t| t.to_string()).collect();
    }

    let mut teaching_resources = find_section(&sections, &["teaching resource", "resources"])
        .map(|s| parse_resources(&s.lines))
        .unwrap_or_default();
    if teaching_resources.is_empty() {
        teaching_resources = default_resources();
    }

    let estimated_time_minutes = TIME_ESTIMATE_RE
        .captures(text)
        .or_else(|| TIME_LOOSE_RE.captures(text))
        .and_then(|c| c.get(1)?.as_str().parse::<u32>().ok())
        .map(|m| m.clamp(1, MAX_ESTIMATED_MINUTES))
        .unwrap_or(DEFAULT_ESTIMATED_MINUTES);

    let difficulty = DIFFICULTY_RE
        .captures(text)
        .and_then(|c| c.get(1)?.as_str().parse::<Difficulty>().ok())
        .unwrap_or_default();

    let youtube_videos = video_links(hints, &title);

    PlaybookContent {
        title,
        summary,
        immediate_actions,
        recovery_steps,
        alternative_strategies,
        success_indicators,
        youtube_videos,
        teaching_resources,
        teaching_tips,
        ncert_reference,
        estimated_time_minutes,
        difficulty,
    }
}

fn section_items(sections: &[Section<'_>], prefixes: &[&str], max: usize) -> Vec<String> {
    find_section(sections, prefixes)
        .map(|s| list_items(&s.lines))
        .unwrap_or_default()
        .into_iter()
        .take(max)
        .collect()
}

fn parse_recovery_steps(text: &str, sections: &[Section<'_>]) -> Vec<RecoveryStep> {
    let recovery = find_section(sections, &["recovery step"]);
    let lines: Vec<&str> = match recovery {
        Some(section) => section.lines.clone(),
        None => text.lines().collect(),
    };

    let mut steps: Vec<RecoveryStep> = Vec::new();
    for line in &lines {
        if let Some(step) = step_header(line) {
            steps.push(step);
            continue;
        }
        let Some(current) = steps.last_mut() else {
            continue;
        };
        let detail = clean_item(line.trim().trim_start_matches(['-', '*', '•']));
        let lower = detail.to_lowercase();
        if let Some(rest) = strip_label(&detail, &lower, "what to do") {
            current.action = format!("{}: {}", current.action, rest);
        } else if let Some(rest) = strip_label(&detail, &lower, "what to say") {
            current.dialogue = Some(rest.trim_matches('"').to_string());
        } else if let Some(rest) = strip_label(&detail, &lower, "expected outcome") {
            current.expected_outcome = Some(rest.to_string());
        }
    }

    if steps.is_empty() {
        if let Some(section) = recovery {
            steps = list_items(&section.lines)
                .into_iter()
                .enumerate()
                .map(|(idx, action)| RecoveryStep {
                    step_number: idx as u32 + 1,
                    action,
                    duration_minutes: DEFAULT_STEP_MINUTES,
                    dialogue: None,
                    expected_outcome: None,
                })
                .collect();
        }
    }

    steps.truncate(MAX_RECOVERY_STEPS);
    steps
}

fn step_header(line: &str) -> Option<RecoveryStep> {
    let caps = STEP_BOLD_RE
        .captures(line)
        .or_else(|| STEP_PLAIN_RE.captures(line))?;
    let step_number = caps.get(1)?.as_str().parse::<u32>().ok()?;
    let action = caps
        .get(2)
        .map(|m| clean_item(m.as_str()))
        .filter(|a| !a.is_empty())
        .unwrap_or_else(|| format!("Step {}", step_number));
    let duration_minutes = caps
        .get(3)
        .and_then(|m| m.as_str().parse::<u32>().ok())
        .unwrap_or(DEFAULT_STEP_MINUTES);

    Some(RecoveryStep {
        step_number,
        action,
        duration_minutes,
        dialogue: None,
        expected_outcome: None,
    })
}

/// `label: rest` → `rest`, matching the label case-insensitively
fn strip_label<'a>(detail: &'a str, lower: &str, label: &str) -> Option<&'a str> {
    if !lower.starts_with(label) {
        return None;
    }
    let rest = detail.get(label.len()..)?;
    let rest = rest.trim_start().strip_prefix(':').unwrap_or(rest).trim();
    (!rest.is_empty()).then_some(rest)
}

fn parse_resources(lines: &[&str]) -> Vec<TeachingResource> {
    lines
        .iter()
        .filter_map(|line| LIST_ITEM_RE.captures(line))
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().trim().to_string()))
        .map(|item| {
            let url = URL_RE.find(&item).map(|m| m.as_str().to_string());
            match RESOURCE_RE.captures(&item) {
                Some(caps) => {
                    let label = caps.get(1).map_or("", |m| m.as_str()).trim().to_string();
                    let description = caps.get(2).map_or("", |m| m.as_str()).trim().to_string();
                    TeachingResource {
                        resource_type: resource_type_for(&label),
                        title: truncate_chars(&label, 200),
                        description: truncate_chars(&description, 200),
                        url,
                    }
                }
                None => TeachingResource {
                    resource_type: "reference".to_string(),
                    title: truncate_chars(&clean_item(&item), 200),
                    description: String::new(),
                    url,
                },
            }
        })
        .filter(|r| !r.title.is_empty())
        .take(MAX_RESOURCES)
        .collect()
}

fn resource_type_for(label: &str) -> String {
    let lower = label.to_lowercase();
    if lower.contains("diksha") {
        "diksha".to_string()
    } else if lower.contains("ncert") {
        "ncert".to_string()
    } else if lower.contains("online") || lower.contains("website") {
        "online".to_string()
    } else {
        lower
    }
}

fn default_resources() -> Vec<TeachingResource> {
    vec![
        TeachingResource {
            resource_type: "diksha".to_string(),
            title: "DIKSHA App - Free NCERT Content".to_string(),
            description: "Official government e-learning platform".to_string(),
            url: Some("https://diksha.gov.in/".to_string()),
        },
        TeachingResource {
            resource_type: "ncert".to_string(),
            title: "NCERT Textbooks Online".to_string(),
            description: "Free downloadable NCERT textbooks".to_string(),
            url: Some("https://ncert.nic.in/textbook.php".to_string()),
        },
    ]
}

/// Three YouTube search links for the request's topic
pub fn video_links(hints: &ParseHints<'_>, title: &str) -> Vec<VideoResource> {
    let query = hints
        .topic
        .or(hints.subject)
        .filter(|q| !q.trim().is_empty())
        .unwrap_or(title)
        .trim()
        .to_string();
    let grade_part = hints
        .grade
        .map(|g| format!(" class {}", g))
        .unwrap_or_default();

    let link = |suffix: &str| {
        let search = format!("{}{} {}", query, grade_part, suffix);
        format!("{}{}", YOUTUBE_SEARCH_URL, urlencoding::encode(search.trim()))
    };

    vec![
        VideoResource {
            title: format!("{} - NCERT explained", query),
            url: link("NCERT Hindi"),
            channel: "NCERT / DIKSHA".to_string(),
            description: "Search results for NCERT-aligned explanations".to_string(),
        },
        VideoResource {
            title: format!("{} - Khan Academy India", query),
            url: link("Khan Academy India"),
            channel: "Khan Academy India".to_string(),
            description: "Search results for Khan Academy India lessons".to_string(),
        },
        VideoResource {
            title: format!("{} - BYJU'S / Vedantu", query),
            url: link("BYJUS Vedantu"),
            channel: "BYJU'S / Vedantu".to_string(),
            description: "Search results for BYJU'S and Vedantu explanations".to_string(),
        },
    ]
}

/// Playbook used when the response has no usable content
pub fn default_playbook(hints: &ParseHints<'_>) -> PlaybookContent {
    PlaybookContent {
        title: DEFAULT_TITLE.to_string(),
        summary: String::new(),
        immediate_actions: Vec::new(),
        recovery_steps: Vec::new(),
        alternative_strategies: Vec::new(),
        success_indicators: Vec::new(),
        youtube_videos: video_links(hints, DEFAULT_TITLE),
        teaching_resources: default_resources(),
        teaching_tips: DEFAULT_TIPS.iter().map(|t| t.to_string()).collect(),
        ncert_reference: None,
        estimated_time_minutes: DEFAULT_ESTIMATED_MINUTES,
        difficulty: Difficulty::Medium,
    }
}

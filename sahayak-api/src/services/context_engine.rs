//! Classroom context extraction
//!
//! Best-effort tagging of a teacher's free-text request with subject, grade,
//! topic, issue type, urgency and class size. Keyword and pattern matching
//! only; extraction never fails, missing tags are `None`.

use once_cell::sync::Lazy;
use regex::Regex;
use sahayak_common::models::{IssueType, Urgency};
use serde::Serialize;

/// Maximum length of the stored challenge summary
const CHALLENGE_MAX_CHARS: usize = 200;

/// (display name, keywords); first entry with a hit wins
const SUBJECT_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "Mathematics",
        &[
            "math", "maths", "mathematics", "गणित", "ಗಣಿತ", "calculation", "numbers", "algebra",
            "geometry", "fraction", "fractions", "decimal", "decimals",
        ],
    ),
    (
        "Science",
        &["science", "विज्ञान", "ವಿಜ್ಞಾನ", "physics", "chemistry", "biology", "experiment"],
    ),
    (
        "English",
        &["english", "अंग्रेजी", "ಇಂಗ್ಲಿಷ್", "grammar", "reading", "writing", "comprehension"],
    ),
    ("Hindi", &["hindi", "हिंदी", "ಹಿಂದಿ"]),
    ("Kannada", &["kannada", "ಕನ್ನಡ"]),
    (
        "Social Studies",
        &["social", "history", "geography", "civics", "इतिहास", "भूगोल"],
    ),
    ("EVS", &["evs", "environment", "पर्यावरण", "ಪರಿಸರ"]),
];

/// (keyword, display name)
const TOPIC_KEYWORDS: &[(&str, &str)] = &[
    ("fraction", "Fractions"),
    ("fractions", "Fractions"),
    ("decimal", "Decimals"),
    ("decimals", "Decimals"),
    ("algebra", "Algebra"),
    ("geometry", "Geometry"),
    ("multiplication", "Multiplication"),
    ("division", "Division"),
    ("addition", "Addition"),
    ("subtraction", "Subtraction"),
    ("percentage", "Percentages"),
    ("percentages", "Percentages"),
    ("ratio", "Ratios"),
    ("ratios", "Ratios"),
    ("shapes", "Shapes"),
    ("area", "Area"),
    ("perimeter", "Perimeter"),
    ("volume", "Volume"),
    ("plants", "Plants"),
    ("animals", "Animals"),
    ("human body", "Human Body"),
    ("matter", "Matter"),
    ("energy", "Energy"),
    ("force", "Force"),
    ("motion", "Motion"),
    ("electricity", "Electricity"),
    ("water cycle", "Water Cycle"),
    ("solar system", "Solar System"),
    ("photosynthesis", "Photosynthesis"),
];

const ISSUE_KEYWORDS: &[(IssueType, &[&str])] = &[
    (
        IssueType::ConceptConfusion,
        &[
            "not understanding", "don't understand", "dont understand", "do not understand",
            "confused", "struggling", "difficulty", "can't grasp", "समझ नहीं आ रहा",
            "hard to explain", "wrong answers",
        ],
    ),
    (
        IssueType::BehaviorManagement,
        &[
            "misbehaving", "discipline", "noisy", "not listening", "fighting", "disrupting",
            "शोर", "attention problem", "out of control", "chaos",
        ],
    ),
    (
        IssueType::EngagementDrop,
        &[
            "bored", "not interested", "sleepy", "distracted", "lost interest",
            "not paying attention", "ऊब गए",
        ],
    ),
    (
        IssueType::ActivityStuck,
        &["activity not working", "stuck", "can't continue", "failed activity", "didn't work"],
    ),
    (
        IssueType::Differentiation,
        &[
            "different levels", "mixed ability", "some understand some don't", "fast learners",
            "slow learners", "gap",
        ],
    ),
    (
        IssueType::ResourceMissing,
        &["no materials", "no textbook", "missing resources", "don't have", "need supplies"],
    ),
    (
        IssueType::TimeManagement,
        &[
            "running out of time", "no time left", "behind schedule", "too slow",
            "taking too long", "समय कम है",
        ],
    ),
];

/// Checked in order; first level with a hit wins
const URGENCY_KEYWORDS: &[(Urgency, &[&str])] = &[
    (
        Urgency::Critical,
        &["emergency", "urgent", "help now", "immediately", "crisis", "safety", "dangerous"],
    ),
    (
        Urgency::High,
        &["very", "really", "completely", "totally", "chaos", "out of control", "frustrated"],
    ),
    (
        Urgency::Medium,
        &["having trouble", "some difficulty", "struggling a bit"],
    ),
    (
        Urgency::Low,
        &["minor", "small", "just wondering", "general question"],
    ),
];

const ORDINAL_WORDS: &[(&str, u32)] = &[
    ("first", 1),
    ("second", 2),
    ("third", 3),
    ("fourth", 4),
    ("fifth", 5),
    ("sixth", 6),
    ("seventh", 7),
    ("eighth", 8),
    ("ninth", 9),
    ("tenth", 10),
    ("eleventh", 11),
    ("twelfth", 12),
];

static GRADE_AFTER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:class|grade|std\.?|standard|कक्षा)\s*(\d{1,2})\b").expect("valid regex")
});
static GRADE_BEFORE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{1,2})\s*(?:st|nd|rd|th)?\s*(?:class|grade|standard)\b").expect("valid regex")
});
static GRADE_WORD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(first|second|third|fourth|fifth|sixth|seventh|eighth|ninth|tenth|eleventh|twelfth)\s+(?:class|grade|standard)\b")
        .expect("valid regex")
});
static STUDENT_COUNT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d+)\s*(?:students|kids|children|pupils)").expect("valid regex")
});
static CLASS_OF_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"class of\s*(\d+)").expect("valid regex"));

/// Tags extracted from one request
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct ExtractedContext {
    pub subject: Option<String>,
    pub grade: Option<u32>,
    pub topic: Option<String>,
    pub issue_type: IssueType,
    pub urgency: Urgency,
    pub student_count: Option<u32>,
    pub specific_challenge: String,
}

/// Explicit values supplied by the user; these win over extracted ones
#[derive(Debug, Clone, Default)]
pub struct ContextOverrides {
    pub subject: Option<String>,
    pub grade: Option<u32>,
    pub topic: Option<String>,
}

impl ExtractedContext {
    pub fn apply_overrides(mut self, overrides: &ContextOverrides) -> Self {
        if let Some(subject) = non_blank(overrides.subject.as_deref()) {
            self.subject = Some(subject);
        }
        if let Some(grade) = overrides.grade {
            self.grade = Some(grade);
        }
        if let Some(topic) = non_blank(overrides.topic.as_deref()) {
            self.topic = Some(topic);
        }
        self
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Extract classroom context from raw teacher input
pub fn extract_context(raw_input: &str) -> ExtractedContext {
    let text = raw_input.to_lowercase();

    ExtractedContext {
        subject: extract_subject(&text),
        grade: extract_grade(&text),
        topic: extract_topic(&text),
        issue_type: classify_issue(&text),
        urgency: detect_urgency(&text),
        student_count: extract_student_count(&text),
        specific_challenge: summarize_challenge(raw_input),
    }
}

fn extract_subject(text: &str) -> Option<String> {
    SUBJECT_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| contains_phrase(text, k)))
        .map(|(subject, _)| subject.to_string())
}

fn extract_grade(text: &str) -> Option<u32> {
    let numeric = [&*GRADE_AFTER_RE, &*GRADE_BEFORE_RE]
        .into_iter()
        .filter_map(|re| re.captures(text))
        .filter_map(|caps| caps.get(1)?.as_str().parse::<u32>().ok())
        .find(|grade| (1..=12).contains(grade));
    if numeric.is_some() {
        return numeric;
    }

    let word = GRADE_WORD_RE.captures(text)?.get(1)?.as_str();
    ORDINAL_WORDS
        .iter()
        .find(|(ordinal, _)| *ordinal == word)
        .map(|(_, grade)| *grade)
}

fn extract_topic(text: &str) -> Option<String> {
    TOPIC_KEYWORDS
        .iter()
        .find(|(keyword, _)| contains_phrase(text, keyword))
        .map(|(_, topic)| topic.to_string())
}

/// Highest phrase-hit count wins; ties keep the earlier type
fn classify_issue(text: &str) -> IssueType {
    let mut best = IssueType::Other;
    let mut best_score = 0;

    for (issue, keywords) in ISSUE_KEYWORDS {
        let score = keywords.iter().filter(|k| contains_phrase(text, k)).count();
        if score > best_score {
            best_score = score;
            best = *issue;
        }
    }

    best
}

fn detect_urgency(text: &str) -> Urgency {
    URGENCY_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| contains_phrase(text, k)))
        .map(|(level, _)| *level)
        .unwrap_or_default()
}

fn extract_student_count(text: &str) -> Option<u32> {
    [&*STUDENT_COUNT_RE, &*CLASS_OF_RE]
        .into_iter()
        .filter_map(|re| re.captures(text))
        .find_map(|caps| caps.get(1)?.as_str().parse::<u32>().ok())
}

/// Whitespace-collapsed input, truncated with an ellipsis
fn summarize_challenge(raw_input: &str) -> String {
    let cleaned = raw_input.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate_chars(&cleaned, CHALLENGE_MAX_CHARS)
}

/// Truncate to `max` characters, appending "..." when shortened
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
        None => text.to_string(),
    }
}

/// Phrase match on word boundaries for ASCII phrases, substring otherwise
///
/// Keeps "very" from matching "every" while leaving Indic-script phrases,
/// whose combining marks are not word characters, as plain substrings.
pub(crate) fn contains_phrase(text: &str, phrase: &str) -> bool {
    if !phrase.is_ascii() {
        return text.contains(phrase);
    }

    let is_word = |c: char| c.is_alphanumeric() || c == '_';
    text.match_indices(phrase).any(|(start, matched)| {
        let before_ok = text[..start].chars().next_back().map_or(true, |c| !is_word(c));
        let after_ok = text[start + matched.len()..]
            .chars()
            .next()
            .map_or(true, |c| !is_word(c));
        before_ok && after_ok
    })
}

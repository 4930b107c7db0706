//! Playbook cache warm-up
//!
//! Submits a table of common classroom situations as anonymous quick requests
//! so their playbooks are cached before teachers in low-connectivity schools
//! need them. Only model responses are cached; in fallback mode the run
//! resolves every scenario but stores nothing.

use sahayak_common::models::{InputType, PlaybookSource};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::context_engine::ContextOverrides;
use super::pedagogy_engine::PedagogyEngine;
use crate::db::sos_requests::NewSosRequest;

/// Pause between submissions in a full run
pub const DEFAULT_PAUSE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scenario {
    /// `None` for classroom management situations
    pub subject: Option<&'static str>,
    pub grade: Option<u32>,
    pub problem: &'static str,
}

const fn lesson(subject: &'static str, grade: u32, problem: &'static str) -> Scenario {
    Scenario {
        subject: Some(subject),
        grade: Some(grade),
        problem,
    }
}

const fn general(problem: &'static str) -> Scenario {
    Scenario {
        subject: None,
        grade: None,
        problem,
    }
}

/// Situations government school teachers report most often
pub const COMMON_SCENARIOS: &[Scenario] = &[
    lesson("Mathematics", 1, "Students can't recognize numbers 1-10"),
    lesson("Mathematics", 2, "Students struggling with addition of single digits"),
    lesson("Mathematics", 3, "Students not understanding multiplication tables"),
    lesson("Mathematics", 4, "Students confused about fractions"),
    lesson("Mathematics", 5, "Students can't understand decimals"),
    lesson("Mathematics", 6, "Students struggling with algebra basics"),
    lesson("Mathematics", 7, "Students confused about integers"),
    lesson("Mathematics", 8, "Students don't understand geometry theorems"),
    lesson("Science", 3, "Students don't understand living vs non-living things"),
    lesson("Science", 4, "Students confused about states of matter"),
    lesson("Science", 5, "Students can't understand the solar system"),
    lesson("Science", 6, "Students struggling with photosynthesis"),
    lesson("Science", 7, "Students don't understand chemical reactions"),
    lesson("Science", 8, "Students confused about human body systems"),
    lesson("English", 1, "Students can't recognize alphabets"),
    lesson("English", 2, "Students struggling with reading simple words"),
    lesson("English", 3, "Students can't form simple sentences"),
    lesson("English", 4, "Students confused about tenses"),
    lesson("English", 5, "Students struggling with comprehension passages"),
    lesson("English", 6, "Students can't write paragraphs properly"),
    lesson("Hindi", 1, "Students can't recognize Hindi varnamala"),
    lesson("Hindi", 2, "Students struggling with matra"),
    lesson("Hindi", 3, "Students confused about sandhi"),
    lesson("Hindi", 4, "Students can't write Hindi sentences"),
    lesson("Hindi", 5, "Students struggling with Hindi grammar"),
    lesson("Social Studies", 4, "Students confused about maps and directions"),
    lesson("Social Studies", 5, "Students don't understand Indian history"),
    lesson("Social Studies", 6, "Students confused about Indian geography"),
    lesson("Social Studies", 7, "Students struggling with civics concepts"),
    lesson("Social Studies", 8, "Students don't understand economics basics"),
    lesson("EVS", 3, "Students don't understand plants and animals"),
    lesson("EVS", 4, "Students confused about weather and seasons"),
    lesson("EVS", 5, "Students struggling with pollution and environment"),
    general("Students are not paying attention in class"),
    general("Students are too noisy and disruptive"),
    general("Some students are very shy and don't participate"),
    general("Students are tired and sleepy after lunch"),
    general("Students have mixed learning levels in class"),
    general("Students forget what was taught yesterday"),
    general("Students are not doing homework"),
    general("Students are copying from each other"),
    general("Parents are not supportive of education"),
    general("Students have language barrier issues"),
    general("Too many students in one classroom"),
    general("No teaching materials available"),
    general("Students are afraid to ask questions"),
    general("Students learn at very different speeds"),
    general("First generation learners struggling"),
];

/// Outcome counts for one warm-up run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PrecacheReport {
    /// New model responses, now cached
    pub generated: usize,
    pub already_cached: usize,
    /// Resolved with a fallback playbook, which is not cached
    pub uncached: usize,
    pub failed: usize,
}

impl PrecacheReport {
    pub fn cached(&self) -> usize {
        self.generated + self.already_cached
    }
}

fn request_for(scenario: &Scenario, language: &str) -> NewSosRequest {
    NewSosRequest {
        teacher_id: None,
        teacher_name: Some("Anonymous Teacher".to_string()),
        raw_input: scenario.problem.to_string(),
        input_type: InputType::Text,
        input_language: language.to_string(),
        subject: scenario.subject.map(str::to_string),
        grade: scenario.grade,
        topic: None,
        school_id: None,
        district: None,
    }
}

/// Run each scenario through the engine; a failed scenario does not stop the run
pub async fn precache(
    engine: &PedagogyEngine,
    scenarios: &[Scenario],
    language: &str,
    pause: Duration,
) -> PrecacheReport {
    let mut report = PrecacheReport::default();

    for (n, scenario) in scenarios.iter().enumerate() {
        if n > 0 && !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }

        let overrides = ContextOverrides {
            subject: scenario.subject.map(str::to_string),
            grade: scenario.grade,
            topic: None,
        };
        let outcome = match engine.submit(&request_for(scenario, language), &overrides).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(problem = scenario.problem, "Precache submission failed: {}", e);
                report.failed += 1;
                continue;
            }
        };

        match outcome.playbook.map(|p| p.source) {
            Some(PlaybookSource::Model) => report.generated += 1,
            Some(PlaybookSource::Cache) => report.already_cached += 1,
            Some(PlaybookSource::Fallback) => report.uncached += 1,
            None => report.failed += 1,
        }
        debug!(
            "[{}/{}] {} grade {}: {}",
            n + 1,
            scenarios.len(),
            scenario.subject.unwrap_or("General"),
            scenario.grade.map(|g| g.to_string()).unwrap_or_else(|| "any".to_string()),
            scenario.problem
        );
    }

    info!(
        generated = report.generated,
        already_cached = report.already_cached,
        uncached = report.uncached,
        failed = report.failed,
        "Playbook precache complete"
    );
    report
}

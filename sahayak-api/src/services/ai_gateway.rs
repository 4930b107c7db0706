//! AI gateway: prompt construction and fallback substitution
//!
//! Every call yields playbook text. When no model is configured, or the model
//! call fails for any reason, the static fallback playbook is returned
//! instead. There is no retry and no backoff.

use sahayak_common::models::{IssueType, PlaybookSource, Urgency};
use std::sync::Arc;
use tracing::{info, warn};

use super::gemini_client::{ModelError, PlaybookModel};

/// Model name recorded when the fallback text was used
pub const FALLBACK_MODEL_NAME: &str = "static-fallback";

/// Inputs for the pedagogy prompt
#[derive(Debug, Clone)]
pub struct PromptContext<'a> {
    pub raw_input: &'a str,
    pub subject: Option<&'a str>,
    pub grade: Option<u32>,
    pub topic: Option<&'a str>,
    pub student_count: Option<u32>,
    pub urgency: Urgency,
    pub issue_type: IssueType,
    pub language: &'a str,
}

/// Display name for a language code; unknown codes fall back to English
pub fn language_name(code: &str) -> &'static str {
    match code.trim().to_ascii_lowercase().as_str() {
        "hi" => "Hindi",
        "kn" => "Kannada",
        _ => "English",
    }
}

/// Build the fixed pedagogy prompt
pub fn build_pedagogy_prompt(ctx: &PromptContext<'_>) -> String {
    let grade = ctx
        .grade
        .map(|g| g.to_string())
        .unwrap_or_else(|| "Mixed".to_string());
    let language = language_name(ctx.language);

    format!(
        r#"You are SAHAYAK, an expert pedagogy coach for government school teachers in India.

## TEACHER'S REQUEST
"{problem}"

## CLASSROOM CONTEXT
- Subject: {subject}
- Grade/Class: {grade}
- Topic: {topic}
- Number of Students: {students}
- Issue Type: {issue}
- Urgency Level: {urgency}
- Language Preference: {language}

## YOUR TASK
Generate an immediate teaching rescue playbook. The teacher needs help right now, in the middle of a lesson.

## OUTPUT FORMAT (use exactly these markdown headers)

### Title
[Short title specific to this problem]

### Summary
[One paragraph describing the approach for this classroom]

### Immediate Actions (Do RIGHT NOW - 30 seconds)
1. [Action]
2. [Action]
3. [Action]

### Recovery Steps (Next 10-15 minutes)
**Step 1: [Step Title]** (X minutes)
- What to do: [Instruction]
- What to say: "[Exact teacher dialogue]"
- Expected outcome: [What should happen]

(Continue with Step 2 and Step 3 in the same format.)

### Alternative Strategies
1. [Alternative specific to this problem]
2. [Creative alternative]

### Success Indicators
- [Observable indicator]
- [Observable indicator]
- [Observable indicator]

### NCERT Reference
[Book, class, chapter and key concepts]

### Teaching Resources
1. **DIKSHA App**: [Module or lesson]
2. **NCERT Textbook**: [Chapter and section]
3. **Online Resource**: [Free educational website]

### Quick Teaching Tips
- 💡 [Topic tip]
- 💡 [Classroom management tip]
- 💡 [Engagement tip]

### Time Estimate: [X] minutes
### Difficulty: [Easy/Medium/Hard]

## GUIDELINES
- Be specific to the problem described; no generic advice
- Use only materials available in a government school
- Everything must be doable by a single teacher with 30-50 students
- Use culturally familiar Indian examples and simple language

## LANGUAGE
Write the entire playbook in {language}. Keep the markdown headers in English so the playbook can be parsed; all content must be in {language}.
"#,
        problem = ctx.raw_input,
        subject = ctx.subject.unwrap_or("General"),
        grade = grade,
        topic = ctx.topic.unwrap_or("General Topic"),
        students = ctx.student_count.unwrap_or(30),
        issue = ctx.issue_type.label(),
        urgency = ctx.urgency,
        language = language,
    )
}

/// Prefix retrieved reference passages onto a prompt
pub fn with_retrieved_context(prompt: String, context: Option<&str>) -> String {
    match context.map(str::trim).filter(|c| !c.is_empty()) {
        Some(context) => format!("Context: {}\n\n{}", context, prompt),
        None => prompt,
    }
}

/// Generic playbook used whenever the model cannot answer
pub const FALLBACK_PLAYBOOK: &str = r#"
## Teaching Rescue Playbook

### Title
Classroom Recovery Strategy

### Summary
A general recovery plan for when a lesson stalls. Personalised strategies are generated when the AI service is reachable.

### Immediate Actions (Do RIGHT NOW - 30 seconds)
1. Pause the current activity and take a calm breath
2. Get the class's attention with a signal such as a clap pattern
3. Acknowledge the difficulty: "I can see some of us are finding this tricky"

### Recovery Steps (Next 10-15 minutes)
**Step 1: Step Back** (3 minutes)
- What to do: Revisit the prerequisite concept briefly
- What to say: "Let's quickly go back to what we learned last time"
- Expected outcome: Students recall prior knowledge

**Step 2: Concrete Example** (4 minutes)
- What to do: Use a real-world example students can relate to
- What to say: "Let me show you how this works in everyday life"
- Expected outcome: Students connect the abstract idea to something familiar

**Step 3: Peer Support** (5 minutes)
- What to do: Pair students who understand with those who need help
- What to say: "Turn to your partner and explain what you understood"
- Expected outcome: Peer teaching reinforces the concept

### Alternative Strategies
1. Try a visual representation such as a drawing or diagram
2. Use simple manipulatives if available
3. Break the problem into smaller steps

### Success Indicators
- Students ask clarifying questions
- Most pairs can explain the idea to each other
- Visible confusion reduces

### Time Estimate: 15 minutes
### Difficulty: Medium
"#;

/// Outcome of one gateway call
#[derive(Debug, Clone)]
pub struct GatewayResponse {
    pub text: String,
    pub source: PlaybookSource,
    pub model_used: String,
    pub prompt_tokens: Option<i64>,
    pub response_tokens: Option<i64>,
    /// Why the fallback was used, if it was
    pub error: Option<String>,
}

impl GatewayResponse {
    fn fallback(error: String) -> Self {
        Self {
            text: FALLBACK_PLAYBOOK.to_string(),
            source: PlaybookSource::Fallback,
            model_used: FALLBACK_MODEL_NAME.to_string(),
            prompt_tokens: None,
            response_tokens: None,
            error: Some(error),
        }
    }
}

/// Wraps an optional model and substitutes fallback text on any failure
#[derive(Clone)]
pub struct AiGateway {
    model: Option<Arc<dyn PlaybookModel>>,
}

impl AiGateway {
    pub fn new(model: Option<Arc<dyn PlaybookModel>>) -> Self {
        match &model {
            Some(m) => info!("AI gateway using model {}", m.name()),
            None => warn!("AI gateway has no model configured, running in fallback mode"),
        }
        Self { model }
    }

    pub fn is_available(&self) -> bool {
        self.model.is_some()
    }

    pub fn model_name(&self) -> &str {
        self.model
            .as_deref()
            .map(|m| m.name())
            .unwrap_or(FALLBACK_MODEL_NAME)
    }

    pub async fn generate(&self, prompt: &str) -> GatewayResponse {
        let Some(model) = &self.model else {
            return GatewayResponse::fallback("No model configured".to_string());
        };

        match model.generate(prompt).await {
            Ok(reply) => GatewayResponse {
                text: reply.text,
                source: PlaybookSource::Model,
                model_used: model.name().to_string(),
                prompt_tokens: reply.prompt_tokens,
                response_tokens: reply.response_tokens,
                error: None,
            },
            Err(e) => {
                log_model_failure(&e);
                GatewayResponse::fallback(e.to_string())
            }
        }
    }
}

fn log_model_failure(e: &ModelError) {
    match e {
        ModelError::Timeout => warn!("Model call timed out, using fallback playbook"),
        other => warn!("Model call failed ({}), using fallback playbook", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::gemini_client::ModelReply;
    use async_trait::async_trait;

    struct FailingModel;

    #[async_trait]
    impl PlaybookModel for FailingModel {
        fn name(&self) -> &str {
            "failing"
        }

        async fn generate(&self, _prompt: &str) -> Result<ModelReply, ModelError> {
            Err(ModelError::Network("connection refused".to_string()))
        }
    }

    struct EchoModel;

    #[async_trait]
    impl PlaybookModel for EchoModel {
        fn name(&self) -> &str {
            "echo"
        }

        async fn generate(&self, prompt: &str) -> Result<ModelReply, ModelError> {
            Ok(ModelReply {
                text: prompt.to_string(),
                prompt_tokens: Some(1),
                response_tokens: Some(2),
            })
        }
    }

    fn prompt_context(language: &str) -> PromptContext<'_> {
        PromptContext {
            raw_input: "Students don't understand fractions",
            subject: Some("Mathematics"),
            grade: None,
            topic: None,
            student_count: None,
            urgency: Urgency::High,
            issue_type: IssueType::ConceptConfusion,
            language,
        }
    }

    #[test]
    fn test_prompt_defaults_and_language() {
        let prompt = build_pedagogy_prompt(&prompt_context("hi"));
        assert!(prompt.contains("\"Students don't understand fractions\""));
        assert!(prompt.contains("- Subject: Mathematics"));
        assert!(prompt.contains("- Grade/Class: Mixed"));
        assert!(prompt.contains("- Topic: General Topic"));
        assert!(prompt.contains("- Number of Students: 30"));
        assert!(prompt.contains("- Urgency Level: high"));
        assert!(prompt.contains("Write the entire playbook in Hindi"));
    }

    #[test]
    fn test_language_names() {
        assert_eq!(language_name("kn"), "Kannada");
        assert_eq!(language_name("HI"), "Hindi");
        assert_eq!(language_name("ta"), "English");
    }

    #[test]
    fn test_retrieved_context_prefix() {
        let prompt = with_retrieved_context("body".to_string(), Some("NCERT Class 5"));
        assert_eq!(prompt, "Context: NCERT Class 5\n\nbody");
        assert_eq!(with_retrieved_context("body".to_string(), Some("  ")), "body");
        assert_eq!(with_retrieved_context("body".to_string(), None), "body");
    }

    #[tokio::test]
    async fn test_unconfigured_gateway_returns_fallback() {
        let gateway = AiGateway::new(None);
        assert!(!gateway.is_available());

        let response = gateway.generate("anything").await;
        assert_eq!(response.source, PlaybookSource::Fallback);
        assert_eq!(response.model_used, FALLBACK_MODEL_NAME);
        assert!(response.text.contains("Classroom Recovery Strategy"));
    }

    #[tokio::test]
    async fn test_model_failure_returns_fallback() {
        let gateway = AiGateway::new(Some(Arc::new(FailingModel)));
        let response = gateway.generate("anything").await;
        assert_eq!(response.source, PlaybookSource::Fallback);
        assert!(response.error.unwrap().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_model_success_passes_through() {
        let gateway = AiGateway::new(Some(Arc::new(EchoModel)));
        let response = gateway.generate("prompt text").await;
        assert_eq!(response.source, PlaybookSource::Model);
        assert_eq!(response.text, "prompt text");
        assert_eq!(response.model_used, "echo");
        assert_eq!(response.response_tokens, Some(2));
        assert!(response.error.is_none());
    }
}

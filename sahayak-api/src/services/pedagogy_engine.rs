//! Pedagogy engine: processes one SOS request end to end
//!
//! `pending → processing` (guarded) → context extraction → cache or model →
//! parse → persist playbook → `processing → resolved` (guarded). Any error
//! after the request row exists marks it `failed`, so no request is left
//! behind in `processing`.

use sahayak_common::models::{Playbook, PlaybookSource, SosRequest};
use sahayak_common::{Error, Result};
use sqlx::SqlitePool;
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::ai_gateway::{build_pedagogy_prompt, with_retrieved_context, AiGateway, PromptContext};
use super::context_engine::{extract_context, ContextOverrides, ExtractedContext};
use super::knowledge_index::KnowledgeIndex;
use super::playbook_parser::{parse_playbook, ParseHints};
use crate::db::playbook_cache::{CacheKeyParts, PlaybookCache};
use crate::db::playbooks::{self, PlaybookMeta};
use crate::db::sos_requests::{self, ContextUpdate, NewSosRequest};

/// Final state of a processed request
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    pub request: SosRequest,
    /// Present exactly when the request is resolved
    pub playbook: Option<Playbook>,
}

/// Playbook text plus where it came from
struct Generated {
    text: String,
    source: PlaybookSource,
    model_used: String,
    prompt_tokens: Option<i64>,
    response_tokens: Option<i64>,
}

#[derive(Clone)]
pub struct PedagogyEngine {
    db: SqlitePool,
    gateway: AiGateway,
    cache: PlaybookCache,
    index: KnowledgeIndex,
}

impl PedagogyEngine {
    pub fn new(db: SqlitePool, gateway: AiGateway, cache: PlaybookCache, index: KnowledgeIndex) -> Self {
        Self {
            db,
            gateway,
            cache,
            index,
        }
    }

    pub fn gateway(&self) -> &AiGateway {
        &self.gateway
    }

    /// Persist a new request and process it inline
    pub async fn submit(&self, new: &NewSosRequest, overrides: &ContextOverrides) -> Result<ProcessOutcome> {
        let request = sos_requests::insert_request(&self.db, new).await?;
        info!(sos_id = %request.id, "SOS request received");
        self.process(request.id, &request.raw_input, &request.input_language, overrides)
            .await
    }

    /// Process a stored pending request; failures after this point mark it failed
    pub async fn process(
        &self,
        id: Uuid,
        raw_input: &str,
        language: &str,
        overrides: &ContextOverrides,
    ) -> Result<ProcessOutcome> {
        let started = Instant::now();

        match self.resolve(id, raw_input, language, overrides, started).await {
            Ok(playbook) => {
                let request = self.reload(id).await?;
                info!(
                    sos_id = %id,
                    source = %playbook.source,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "SOS request resolved"
                );
                Ok(ProcessOutcome {
                    request,
                    playbook: Some(playbook),
                })
            }
            Err(e) => {
                error!(sos_id = %id, "SOS processing failed: {}", e);
                sos_requests::mark_failed(&self.db, id).await?;
                let request = self.reload(id).await?;
                Ok(ProcessOutcome {
                    request,
                    playbook: None,
                })
            }
        }
    }

    async fn reload(&self, id: Uuid) -> Result<SosRequest> {
        sos_requests::get_request(&self.db, id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("SOS request {} not found", id)))
    }

    async fn resolve(
        &self,
        id: Uuid,
        raw_input: &str,
        language: &str,
        overrides: &ContextOverrides,
        started: Instant,
    ) -> Result<Playbook> {
        if !sos_requests::begin_processing(&self.db, id).await? {
            return Err(Error::Conflict(format!("SOS request {} is not pending", id)));
        }

        let context = extract_context(raw_input).apply_overrides(overrides);
        sos_requests::update_context(&self.db, id, &context_update(&context)).await?;

        let generated = self.generate(raw_input, language, &context).await;

        let hints = ParseHints {
            subject: context.subject.as_deref(),
            grade: context.grade,
            topic: context.topic.as_deref(),
        };
        let content = parse_playbook(&generated.text, &hints);
        let meta = PlaybookMeta {
            model_used: generated.model_used,
            source: generated.source,
            prompt_tokens: generated.prompt_tokens,
            response_tokens: generated.response_tokens,
            language: language.to_string(),
        };
        let playbook = playbooks::insert_playbook(&self.db, id, &content, &meta).await?;

        let elapsed_ms = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);
        if !sos_requests::mark_resolved(&self.db, id, playbook.id, elapsed_ms).await? {
            return Err(Error::Conflict(format!("SOS request {} left processing early", id)));
        }

        Ok(playbook)
    }

    /// Cached response if one exists, otherwise a gateway call (which never fails)
    async fn generate(&self, raw_input: &str, language: &str, context: &ExtractedContext) -> Generated {
        let key_parts = CacheKeyParts {
            subject: context.subject.as_deref(),
            grade: context.grade,
            topic: context.topic.as_deref(),
            language,
        };

        match self.cache.lookup(&key_parts).await {
            Ok(Some(hit)) => {
                return Generated {
                    text: hit.text,
                    source: PlaybookSource::Cache,
                    model_used: hit.model_used,
                    prompt_tokens: hit.prompt_tokens,
                    response_tokens: hit.response_tokens,
                };
            }
            Ok(None) => {}
            Err(e) => warn!("Playbook cache lookup failed: {}", e),
        }

        let prompt = build_pedagogy_prompt(&PromptContext {
            raw_input,
            subject: context.subject.as_deref(),
            grade: context.grade,
            topic: context.topic.as_deref(),
            student_count: context.student_count,
            urgency: context.urgency,
            issue_type: context.issue_type,
            language,
        });
        let retrieved = self
            .index
            .augmented_context(raw_input, context.subject.as_deref(), context.grade)
            .await;
        let prompt = with_retrieved_context(prompt, retrieved.as_deref());

        let response = self.gateway.generate(&prompt).await;

        if response.source == PlaybookSource::Model {
            if let Err(e) = self
                .cache
                .store(
                    &key_parts,
                    &response.text,
                    &response.model_used,
                    response.prompt_tokens,
                    response.response_tokens,
                )
                .await
            {
                warn!("Failed to cache playbook response: {}", e);
            }
        }

        Generated {
            text: response.text,
            source: response.source,
            model_used: response.model_used,
            prompt_tokens: response.prompt_tokens,
            response_tokens: response.response_tokens,
        }
    }
}

fn context_update(context: &ExtractedContext) -> ContextUpdate {
    ContextUpdate {
        subject: context.subject.clone(),
        grade: context.grade,
        topic: context.topic.clone(),
        issue_type: context.issue_type,
        urgency: context.urgency,
        student_count: context.student_count,
        specific_challenge: Some(context.specific_challenge.clone()).filter(|c| !c.is_empty()),
    }
}

//! Core services: classroom context extraction, playbook generation and
//! the aggregate views built on stored requests

pub mod ai_gateway;
pub mod analytics;
pub mod context_engine;
pub mod gemini_client;
pub mod knowledge_index;
pub mod mentor;
pub mod ncert;
pub mod pedagogy_engine;
pub mod playbook_parser;
pub mod precache;

pub use ai_gateway::AiGateway;
pub use gemini_client::{GeminiClient, PlaybookModel};
pub use knowledge_index::KnowledgeIndex;
pub use pedagogy_engine::PedagogyEngine;

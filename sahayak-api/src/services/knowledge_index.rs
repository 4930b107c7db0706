//! In-memory retrieval index
//!
//! Flat (brute force) index over term-frequency vectors. Every search scores
//! every document with cosine similarity, the same way an exact flat vector
//! index would. The corpus is small: curriculum notes plus teacher-shared
//! solutions.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use super::ncert::CHAPTER_NOTES;

/// Passages at or above this score are used as prompt context
pub const CONTEXT_MIN_SCORE: f64 = 0.1;

const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "all", "any", "can", "had", "her", "was",
    "one", "our", "out", "has", "his", "how", "its", "may", "who", "did", "get", "him", "let",
    "say", "she", "too", "use", "with", "this", "that", "from", "they", "have", "been", "were",
    "what", "when", "where", "which", "their", "there", "them", "then", "than", "into", "some",
    "about", "would", "could", "should", "very", "just", "also", "does", "doesn", "don", "isn",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Ncert,
    Solution,
}

impl DocumentKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ncert" => Some(DocumentKind::Ncert),
            "solution" => Some(DocumentKind::Solution),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DocumentMeta {
    pub subject: Option<String>,
    pub grade: Option<u32>,
    pub title: Option<String>,
}

#[derive(Debug, Clone)]
struct IndexedDocument {
    id: String,
    text: String,
    kind: DocumentKind,
    meta: DocumentMeta,
    vector: HashMap<String, f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub text: String,
    #[serde(rename = "type")]
    pub kind: DocumentKind,
    pub metadata: DocumentMeta,
    pub score: f64,
}

#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    pub kind: Option<DocumentKind>,
    pub subject: Option<String>,
    pub grade: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub total_documents: usize,
    pub by_type: BTreeMap<DocumentKind, usize>,
    pub vocabulary_size: usize,
}

/// Lower-case, strip punctuation, drop stop words and words of two characters or fewer
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() > 2 && !STOP_WORDS.contains(w))
        .map(str::to_string)
        .collect()
}

/// Unit-length term-frequency vector
fn vectorize(text: &str) -> HashMap<String, f64> {
    let mut counts: HashMap<String, f64> = HashMap::new();
    for token in tokenize(text) {
        *counts.entry(token).or_insert(0.0) += 1.0;
    }
    let norm = counts.values().map(|v| v * v).sum::<f64>().sqrt();
    if norm > 0.0 {
        for v in counts.values_mut() {
            *v /= norm;
        }
    }
    counts
}

fn cosine(a: &HashMap<String, f64>, b: &HashMap<String, f64>) -> f64 {
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    small
        .iter()
        .filter_map(|(term, w)| large.get(term).map(|v| w * v))
        .sum()
}

/// First 12 hex characters of the SHA-256 of the text
pub fn document_id(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    digest.iter().take(6).map(|b| format!("{:02x}", b)).collect()
}

fn shared_solution_text(problem: &str, title: &str, solution: &str, subject: &str, grade: u32) -> String {
    format!(
        "Classroom Problem: {}\nTeacher Solution: {}. {}\nSubject: {}\nGrade: {}",
        problem, title, solution, subject, grade
    )
}

/// Shared handle to the index
#[derive(Clone, Default)]
pub struct KnowledgeIndex {
    docs: Arc<RwLock<Vec<IndexedDocument>>>,
}

impl KnowledgeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index seeded with the curriculum notes
    pub async fn with_curriculum() -> Self {
        let index = Self::new();
        for (subject, grade, chapter, notes) in CHAPTER_NOTES {
            index.add_ncert_reference(subject, *grade, chapter, notes).await;
        }
        index
    }

    /// Add a document; returns its id. Re-adding the same text is a no-op.
    pub async fn add_document(&self, text: &str, kind: DocumentKind, meta: DocumentMeta) -> String {
        let id = document_id(text);
        let mut docs = self.docs.write().await;
        if docs.iter().any(|d| d.id == id) {
            return id;
        }
        docs.push(IndexedDocument {
            id: id.clone(),
            text: text.to_string(),
            kind,
            meta,
            vector: vectorize(text),
        });
        debug!(id = %id, kind = ?kind, "Indexed document");
        id
    }

    pub async fn add_ncert_reference(&self, subject: &str, grade: u32, chapter: &str, notes: &str) -> String {
        let text = format!(
            "NCERT Reference - Class {} {}\nChapter: {}\n{}",
            grade, subject, chapter, notes
        );
        let meta = DocumentMeta {
            subject: Some(subject.to_string()),
            grade: Some(grade),
            title: Some(chapter.to_string()),
        };
        self.add_document(&text, DocumentKind::Ncert, meta).await
    }

    /// Drop a document by id; false when it was not indexed
    pub async fn remove_document(&self, id: &str) -> bool {
        let mut docs = self.docs.write().await;
        let before = docs.len();
        docs.retain(|d| d.id != id);
        let removed = docs.len() < before;
        if removed {
            debug!(id = %id, "Removed document from index");
        }
        removed
    }

    pub async fn add_shared_solution(
        &self,
        problem: &str,
        title: &str,
        solution: &str,
        subject: &str,
        grade: u32,
    ) -> String {
        let text = shared_solution_text(problem, title, solution, subject, grade);
        let meta = DocumentMeta {
            subject: Some(subject.to_string()),
            grade: Some(grade),
            title: Some(title.to_string()),
        };
        self.add_document(&text, DocumentKind::Solution, meta).await
    }

    /// Inverse of [`Self::add_shared_solution`] for the same fields
    pub async fn remove_shared_solution(
        &self,
        problem: &str,
        title: &str,
        solution: &str,
        subject: &str,
        grade: u32,
    ) -> bool {
        let text = shared_solution_text(problem, title, solution, subject, grade);
        self.remove_document(&document_id(&text)).await
    }

    pub async fn search(&self, query: &str, top_k: usize, filter: &SearchFilter) -> Vec<SearchHit> {
        let query_vec = vectorize(query);
        if query_vec.is_empty() || top_k == 0 {
            return Vec::new();
        }

        let docs = self.docs.read().await;
        let mut hits: Vec<SearchHit> = docs
            .iter()
            .filter(|d| filter.kind.map_or(true, |k| d.kind == k))
            .filter(|d| {
                filter.subject.as_deref().map_or(true, |s| {
                    d.meta
                        .subject
                        .as_deref()
                        .is_some_and(|ds| ds.eq_ignore_ascii_case(s))
                })
            })
            .filter(|d| filter.grade.map_or(true, |g| d.meta.grade == Some(g)))
            .map(|d| SearchHit {
                id: d.id.clone(),
                text: d.text.clone(),
                kind: d.kind,
                metadata: d.meta.clone(),
                score: cosine(&query_vec, &d.vector),
            })
            .filter(|h| h.score > 0.0)
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(top_k);
        hits
    }

    /// Prompt context from the best passages; tries subject/grade first, then unfiltered
    pub async fn augmented_context(&self, query: &str, subject: Option<&str>, grade: Option<u32>) -> Option<String> {
        let filtered = SearchFilter {
            kind: None,
            subject: subject.map(str::to_string),
            grade,
        };
        let mut hits = self.search(query, 3, &filtered).await;
        if hits.is_empty() && (subject.is_some() || grade.is_some()) {
            hits = self.search(query, 3, &SearchFilter::default()).await;
        }

        let passages: Vec<String> = hits
            .into_iter()
            .filter(|h| h.score >= CONTEXT_MIN_SCORE)
            .map(|h| h.text)
            .collect();

        if passages.is_empty() {
            None
        } else {
            Some(passages.join("\n---\n"))
        }
    }

    pub async fn stats(&self) -> IndexStats {
        let docs = self.docs.read().await;
        let mut by_type = BTreeMap::new();
        let mut vocabulary = std::collections::HashSet::new();
        for d in docs.iter() {
            *by_type.entry(d.kind).or_insert(0) += 1;
            vocabulary.extend(d.vector.keys().map(String::as_str));
        }
        IndexStats {
            total_documents: docs.len(),
            by_type,
            vocabulary_size: vocabulary.len(),
        }
    }

    pub async fn len(&self) -> usize {
        self.docs.read().await.len()
    }
}

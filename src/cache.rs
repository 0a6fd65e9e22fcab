//! Persisted store of answered questions.
//!
//! The file is a flat JSON object mapping each question to the statements
//! that answered it:
//!
//! ```json
//! {"Show open work orders": [["SELECT WO_NO FROM WO_HDR WHERE STATUS = 'O' LIMIT 20", "open_work_orders"]]}
//! ```
//!
//! It is read fully at open and rewritten fully on every [`QuestionCache::put`].

use crate::llm::client::{ChatModel, ChatRequest};
use crate::llm::prompts;
use crate::telemetry::{self, StageKind};
use crate::types::{Result, RetrieverError, Statement};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::Instrument;

/// Reply budget for the similarity call.
const SIMILAR_MAX_TOKENS: u32 = 100;

/// Question → statements store backed by one JSON file.
#[derive(Debug, Clone)]
pub struct QuestionCache {
    path: PathBuf,
    entries: BTreeMap<String, Vec<Statement>>,
}

impl QuestionCache {
    /// Open the cache at `path`. A missing file is an empty cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or is not valid JSON
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let entries = if path.exists() {
            let content = fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&content).map_err(|e| {
                    RetrieverError::ConfigError(format!("Invalid question cache {}: {}", path.display(), e))
                })?
            }
        } else {
            BTreeMap::new()
        };

        tracing::debug!(path = %path.display(), questions = entries.len(), "Question cache opened");
        Ok(Self { path, entries })
    }

    /// Ask the model whether a stored question matches `question`.
    ///
    /// A leading `- ` bullet and surrounding quotes are stripped from the reply.
    /// After that only an exact stored key counts as a match; any other reply,
    /// including the "no similar question" sentinel, yields `None`. An empty
    /// cache returns `None` without calling the model.
    ///
    /// # Errors
    ///
    /// Returns transport errors from the model
    pub async fn find_similar(&self, model: &dyn ChatModel, question: &str) -> Result<Option<String>> {
        if self.entries.is_empty() {
            return Ok(None);
        }

        let span = telemetry::stage_span(StageKind::Similarity);
        async {
            let stored = self.questions();
            let request = ChatRequest::bare(SIMILAR_MAX_TOKENS).user(prompts::similar_question_prompt(question, &stored));
            let reply = model.complete(&request).await?;

            let candidate = reply.trim();
            let candidate = candidate.strip_prefix("- ").unwrap_or(candidate);
            let candidate = candidate.trim().trim_matches(|c: char| c == '"' || c == '\'').trim();
            if candidate == prompts::NO_SIMILAR_QUESTION || !self.entries.contains_key(candidate) {
                tracing::debug!(reply = %reply.trim(), "No cached question matched");
                return Ok(None);
            }

            tracing::info!(matched = candidate, "Similar cached question found");
            Ok::<_, RetrieverError>(Some(candidate.to_string()))
        }
        .instrument(span)
        .await
    }

    /// Statements stored under exactly `question`.
    pub fn get(&self, question: &str) -> Option<&[Statement]> {
        self.entries.get(question).map(Vec::as_slice)
    }

    /// Store `statements` under `question`, replacing any previous entry, and
    /// rewrite the file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written
    pub fn put(&mut self, question: &str, statements: Vec<Statement>) -> Result<()> {
        self.entries.insert(question.to_string(), statements);
        self.persist()?;
        tracing::info!(question, total = self.entries.len(), "Question saved");
        Ok(())
    }

    /// Stored questions, sorted.
    pub fn questions(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    /// Number of stored questions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write to a sibling temp file, then rename over the target.
    fn persist(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(&self.entries)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, content)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

//! Question answering session: cache check, table selection, SQL generation
//! and execution, with error-driven repair.
//!
//! [`Retriever::apply`] walks an explicit state machine:
//!
//! ```text
//! CacheCheck ──hit──▶ Done(Answered, from_cache)
//!     │ miss
//!     ▼
//! Selecting ──error──▶ Done(Rejected)      (corrective re-prompt on bad replies)
//!     │ tables
//!     ▼
//! Generating ──error──▶ Done(Rejected)     (corrective re-prompt on bad replies)
//!     │ statements
//!     ▼
//! Executing ──failure──▶ Generating        (corrective re-prompt with the driver error)
//!     │ tables
//!     ▼
//! Done(Answered)
//! ```
//!
//! Each stage may call the model at most `tries` times; Generating and
//! Executing share one budget. Exhaustion ends in `Outcome::NoAnswer`.

use crate::cache::QuestionCache;
use crate::catalog::SchemaCatalog;
use crate::config::RetrieverConfig;
use crate::executor::{self, Execution};
use crate::llm::client::ChatModel;
use crate::llm::{prompts, reformulate, QueryGenerator, TableSelector};
use crate::source::DataSource;
use crate::telemetry::{self, StageKind};
use crate::types::{Answer, Outcome, QueryAttempt, Result, RetrieverError, Stage, Statement};
use std::sync::Arc;
use tracing::Instrument;

/// Decides whether a cached question may stand in for the one asked.
pub trait Confirm: Send + Sync {
    /// Return `true` to answer `asked` with the statements stored for `stored`.
    fn same_question(&self, asked: &str, stored: &str) -> bool;
}

/// Accept every cached match.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysAccept;

impl Confirm for AlwaysAccept {
    fn same_question(&self, _asked: &str, _stored: &str) -> bool {
        true
    }
}

/// Decline every cached match.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysDecline;

impl Confirm for AlwaysDecline {
    fn same_question(&self, _asked: &str, _stored: &str) -> bool {
        false
    }
}

/// Repair loop states. `calls` counts model calls already spent in the stage.
#[derive(Debug)]
enum State {
    CacheCheck,
    Selecting {
        main_prompt: String,
        prompt: String,
        calls: u32,
    },
    Generating {
        main_prompt: String,
        prompt: String,
        calls: u32,
    },
    Executing {
        main_prompt: String,
        raw: String,
        plan: QueryAttempt,
        calls: u32,
    },
    Done(Outcome),
}

/// Session context: model, data source, catalog snapshot, cache and settings.
pub struct Retriever {
    model: Arc<dyn ChatModel>,
    source: Arc<dyn DataSource>,
    catalog: SchemaCatalog,
    cache: QuestionCache,
    config: RetrieverConfig,
}

impl Retriever {
    /// Load the schema catalog and open the question cache.
    ///
    /// # Errors
    ///
    /// Returns `RetrieverError::CatalogUnavailable` if introspection fails (no
    /// model call is made), or an error if the cache file is unreadable
    pub async fn connect(
        model: Arc<dyn ChatModel>,
        source: Arc<dyn DataSource>,
        config: RetrieverConfig,
    ) -> Result<Self> {
        let catalog = SchemaCatalog::load(source.as_ref(), &config.essential_tables).await?;
        let cache = QuestionCache::open(config.cache_file())?;

        tracing::info!(
            model = model.model(),
            source = source.system(),
            tables = catalog.len(),
            cached = cache.len(),
            tries = config.tries,
            "Retriever connected"
        );

        Ok(Self {
            model,
            source,
            catalog,
            cache,
            config,
        })
    }

    /// Schema snapshot taken at connect time.
    pub fn catalog(&self) -> &SchemaCatalog {
        &self.catalog
    }

    /// Question cache.
    pub fn cache(&self) -> &QuestionCache {
        &self.cache
    }

    /// Active settings.
    pub fn config(&self) -> &RetrieverConfig {
        &self.config
    }

    /// Answer one question.
    ///
    /// # Arguments
    ///
    /// * `question` - Natural-language question
    /// * `confirm` - Consulted when the cache proposes a similar stored question
    ///
    /// # Returns
    ///
    /// `Answered`, `Rejected` with the model's explanation, or `NoAnswer` when a
    /// stage ran out of model calls
    ///
    /// # Errors
    ///
    /// Only transport failures (model or data source connection) are returned
    /// as `Err`; malformed replies and failing statements are repaired in place
    pub async fn apply(&self, question: &str, confirm: &dyn Confirm) -> Result<Outcome> {
        let question = question.trim();
        if question.is_empty() {
            return Ok(Outcome::Rejected("Please ask a question about your data.".to_string()));
        }

        let selector = TableSelector::new(self.model.as_ref(), &self.catalog);
        let generator = QueryGenerator::new(
            self.model.as_ref(),
            self.source.dialect(),
            self.config.row_limit,
            self.config.column_limit,
        );
        let tries = self.config.tries.max(1);

        let mut state = State::CacheCheck;
        loop {
            state = match state {
                State::CacheCheck => match self.answer_from_cache(question, confirm).await? {
                    Some(answer) => State::Done(Outcome::Answered(answer)),
                    None => {
                        let main_prompt = selector.prompt(question, self.config.max_tables);
                        State::Selecting {
                            prompt: main_prompt.clone(),
                            main_prompt,
                            calls: 0,
                        }
                    }
                },

                State::Selecting { calls, .. } if calls >= tries => {
                    tracing::warn!(calls, "Table selection budget exhausted");
                    State::Done(Outcome::NoAnswer { stage: Stage::Selecting })
                }

                State::Selecting {
                    main_prompt,
                    prompt,
                    calls,
                } => {
                    let span = telemetry::stage_span(StageKind::TableSelection);
                    telemetry::record_attempt(&span, calls + 1);
                    let reply = selector.select(&prompt).instrument(span).await?;

                    match reply.result {
                        Ok(selection) => {
                            tracing::info!(tables = ?selection.tables, "Tables selected");
                            let main_prompt = generator.prompt(question, &selection);
                            State::Generating {
                                prompt: main_prompt.clone(),
                                main_prompt,
                                calls: 0,
                            }
                        }
                        Err(RetrieverError::InvalidQuestion(message)) => {
                            tracing::info!("Question rejected at table selection");
                            State::Done(Outcome::Rejected(message))
                        }
                        Err(e) if e.is_recoverable() => {
                            tracing::warn!(attempt = calls + 1, error = %e, "Table selection failed, re-prompting");
                            State::Selecting {
                                prompt: prompts::selection_fix(&main_prompt, &reply.raw, &e.to_string()),
                                main_prompt,
                                calls: calls + 1,
                            }
                        }
                        Err(e) => return Err(e),
                    }
                }

                State::Generating { calls, .. } if calls >= tries => {
                    tracing::warn!(calls, "Query generation budget exhausted");
                    State::Done(Outcome::NoAnswer { stage: Stage::Generating })
                }

                State::Generating {
                    main_prompt,
                    prompt,
                    calls,
                } => {
                    let span = telemetry::stage_span(StageKind::QueryGeneration);
                    telemetry::record_attempt(&span, calls + 1);
                    let reply = generator.generate(&prompt).instrument(span).await?;

                    match reply.result {
                        Ok(plan) => State::Executing {
                            main_prompt,
                            raw: reply.raw,
                            plan,
                            calls: calls + 1,
                        },
                        Err(RetrieverError::InvalidQuestion(message)) => {
                            tracing::info!("Question rejected at query generation");
                            State::Done(Outcome::Rejected(message))
                        }
                        Err(e) if e.is_recoverable() => {
                            tracing::warn!(attempt = calls + 1, error = %e, "Unreadable query plan, re-prompting");
                            State::Generating {
                                prompt: prompts::generation_parse_fix(&main_prompt, &reply.raw, &e.to_string()),
                                main_prompt,
                                calls: calls + 1,
                            }
                        }
                        Err(e) => return Err(e),
                    }
                }

                State::Executing {
                    main_prompt,
                    raw,
                    plan,
                    calls,
                } => match executor::run(self.source.as_ref(), &plan, self.config.decimal_places).await? {
                    Execution::Succeeded(tables) => {
                        tracing::info!(statements = plan.statements.len(), "Question answered");
                        State::Done(Outcome::Answered(Answer {
                            attempt: plan,
                            tables,
                            from_cache: false,
                        }))
                    }
                    Execution::Failed { index, error } => {
                        let failure = RetrieverError::Execution { index, message: error };
                        tracing::warn!(attempt = calls, error = %failure, "Generated code failed, re-prompting");
                        State::Generating {
                            prompt: prompts::execution_fix(&main_prompt, &raw, index, &failure.to_string()),
                            main_prompt,
                            calls,
                        }
                    }
                },

                State::Done(outcome) => return Ok(outcome),
            };
        }
    }

    /// Re-run the statements of a confirmed similar question.
    ///
    /// A cached plan that no longer executes is treated as a miss.
    async fn answer_from_cache(&self, question: &str, confirm: &dyn Confirm) -> Result<Option<Answer>> {
        let Some(stored) = self.cache.find_similar(self.model.as_ref(), question).await? else {
            return Ok(None);
        };
        if !confirm.same_question(question, &stored) {
            tracing::debug!(stored = %stored, "Cached question declined");
            return Ok(None);
        }
        let Some(statements) = self.cache.get(&stored) else {
            return Ok(None);
        };

        let attempt = QueryAttempt::from_statements(statements.to_vec());
        match executor::run(self.source.as_ref(), &attempt, self.config.decimal_places).await? {
            Execution::Succeeded(tables) => Ok(Some(Answer {
                attempt,
                tables,
                from_cache: true,
            })),
            Execution::Failed { index, error } => {
                tracing::warn!(stored = %stored, index, error = %error, "Cached statements failed, regenerating");
                Ok(None)
            }
        }
    }

    /// Store the statements that answered `question`.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache file cannot be written
    pub fn save_question(&mut self, question: &str, statements: Vec<Statement>) -> Result<()> {
        self.cache.put(question.trim(), statements)
    }

    /// Rewrite `question` after the user explained what was wrong with the answer.
    ///
    /// # Errors
    ///
    /// Returns `MissingTag` if the model reply has no `<new_question>`, or a
    /// transport error
    pub async fn reformulate(&self, question: &str, explanation: &str) -> Result<String> {
        reformulate::reformulate_question(self.model.as_ref(), question, explanation).await
    }
}

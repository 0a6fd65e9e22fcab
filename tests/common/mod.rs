//! Shared fixtures: a scripted chat model and a seeded SQLite database.

#![allow(dead_code)]

use async_trait::async_trait;
use sql_retriever::{ChatModel, ChatRequest, Result, RetrieverConfig, RetrieverError, SqliteSource};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;

/// Replays canned replies in order and records every request.
pub struct ScriptedModel {
    replies: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedModel {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of calls whose system role contains `marker`.
    pub fn calls_with_system(&self, marker: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.system.as_deref().is_some_and(|s| s.contains(marker)))
            .count()
    }

    /// Calls made to the table-selection stage.
    pub fn selection_calls(&self) -> usize {
        self.calls_with_system("identifying relevant tables")
    }

    /// Calls made to the code-generation stage.
    pub fn generation_calls(&self) -> usize {
        self.calls_with_system("SQL coder")
    }

    /// Replies not consumed yet.
    pub fn remaining(&self) -> usize {
        self.replies.lock().unwrap().len()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn complete(&self, request: &ChatRequest) -> Result<String> {
        self.requests.lock().unwrap().push(request.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| RetrieverError::LlmError("script exhausted".to_string()))
    }

    fn model(&self) -> &str {
        "scripted"
    }
}

/// In-memory ERP slice with work orders, stock and purchase orders.
pub fn erp_source() -> SqliteSource {
    let source = SqliteSource::in_memory().unwrap();
    source
        .execute_batch(
            "CREATE TABLE WO_HDR (WO_NO INTEGER PRIMARY KEY, PART TEXT, STATUS TEXT, OPEN_DTE TEXT);
             CREATE TABLE WO_LINE (WO_NO INTEGER, LINE INTEGER, TASK TEXT, HOURS DECIMAL(8, 2));
             CREATE TABLE STOCK (PART TEXT, QTY INTEGER, COST DECIMAL(10, 4));
             CREATE TABLE PO_HDR (PO_NO INTEGER, VENDOR TEXT, TOTAL DECIMAL(12, 2));
             INSERT INTO WO_HDR VALUES
                 (1001, 'PUMP-A', 'O', '2024-03-01'),
                 (1002, 'PUMP-B', 'C', '2024-03-05'),
                 (1003, 'VALVE-C', 'O', '2024-03-09');
             INSERT INTO WO_LINE VALUES (1001, 1, 'Inspect', 1.255), (1003, 1, 'Replace seal', 3);
             INSERT INTO STOCK VALUES ('PUMP-A', 4, 120.12345), ('VALVE-C', 0, 15.5);
             INSERT INTO PO_HDR VALUES (7, 'ACME', 1250.456);",
        )
        .unwrap();
    source
}

/// Config with the cache placed under `dir`.
pub fn config_in(dir: &Path, tries: u32) -> RetrieverConfig {
    RetrieverConfig {
        tries,
        cache_path: dir.join("answered_questions.json").to_string_lossy().into_owned(),
        essential_tables: vec!["WO_HDR".to_string(), "STOCK".to_string(), "CUSTVEND".to_string()],
        ..RetrieverConfig::default()
    }
}

pub fn selection_reply(tables: &str) -> String {
    format!("<reasoning>These tables hold the data.</reasoning>\n<tables>{}</tables>", tables)
}

pub fn plan_reply(code: &str, labels: &str) -> String {
    format!(
        "<user_reasoning>Extracting the requested rows.</user_reasoning>\n<code>{}</code>\n<tablename>{}</tablename>",
        code, labels
    )
}

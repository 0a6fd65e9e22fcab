//! End-to-end behavior of the question pipeline against a real SQLite database.

mod common;

use async_trait::async_trait;
use common::{config_in, erp_source, plan_reply, selection_reply, ScriptedModel};
use serde_json::json;
use sql_retriever::source::{RawRows, SqlDialect};
use sql_retriever::{
    AlwaysAccept, AlwaysDecline, DataSource, Outcome, QuestionCache, Result, Retriever, RetrieverError, Stage,
    Statement,
};
use std::sync::Arc;
use tempfile::TempDir;

async fn retriever(model: &Arc<ScriptedModel>, dir: &TempDir, tries: u32) -> Retriever {
    Retriever::connect(model.clone(), Arc::new(erp_source()), config_in(dir.path(), tries))
        .await
        .unwrap()
}

fn last_user_turn(model: &ScriptedModel) -> String {
    model
        .requests()
        .last()
        .and_then(|r| r.last_user().map(str::to_string))
        .unwrap_or_default()
}

#[tokio::test]
async fn test_latest_work_orders_end_to_end() {
    let dir = TempDir::new().unwrap();
    let model = Arc::new(ScriptedModel::new([
        selection_reply("[WO_HDR]"),
        plan_reply(
            "SELECT WO_NO, PART, OPEN_DTE FROM WO_HDR ORDER BY OPEN_DTE DESC LIMIT 20",
            "latest_work_orders",
        ),
    ]));
    let retriever = retriever(&model, &dir, 2).await;

    let outcome = retriever
        .apply("Show me the latest work orders", &AlwaysAccept)
        .await
        .unwrap();

    let answer = outcome.answer().expect("question should be answered");
    assert!(!answer.from_cache);
    assert_eq!(answer.tables.len(), 1);
    assert_eq!(answer.tables[0].name, "latest_work_orders");
    assert_eq!(answer.tables[0].columns, vec!["WO_NO", "PART", "OPEN_DTE"]);
    assert_eq!(answer.tables[0].rows[0], vec![json!(1003), json!("VALVE-C"), json!("2024-03-09")]);
    assert_eq!(answer.attempt.reasoning, "Extracting the requested rows.");

    // Empty cache: no similarity call, one call per stage.
    let requests = model.requests();
    assert_eq!(requests.len(), 2);

    let selection_prompt = requests[0].last_user().unwrap();
    assert!(selection_prompt.contains("Show me the latest work orders"));
    assert!(selection_prompt.contains("CUSTVEND"), "essential tables are offered");
    assert!(selection_prompt.contains("WO_LINE"));

    let generation_prompt = requests[1].last_user().unwrap();
    assert!(generation_prompt.contains("- WO_HDR: [WO_NO, PART, STATUS, OPEN_DTE]"));
    assert!(generation_prompt.contains("These tables hold the data."));
    assert_eq!(requests[1].max_tokens, 4000);
}

#[tokio::test]
async fn test_generation_system_names_sqlite_dialect() {
    let dir = TempDir::new().unwrap();
    let model = Arc::new(ScriptedModel::new([
        selection_reply("[STOCK]"),
        plan_reply("SELECT PART, QTY FROM STOCK LIMIT 20", "stock"),
    ]));
    let retriever = retriever(&model, &dir, 2).await;

    retriever.apply("Show stock levels", &AlwaysAccept).await.unwrap();

    assert_eq!(model.generation_calls(), 1);
    let system = model.requests()[1].system.clone().unwrap();
    assert!(system.contains("writing for SQLite"));
    assert!(system.contains("LIMIT clause"));
    assert!(!system.contains("Microsoft"));
}

#[tokio::test]
async fn test_weather_question_is_rejected_before_generation() {
    let dir = TempDir::new().unwrap();
    let model = Arc::new(ScriptedModel::new([
        "<error>I can only answer questions about the data in your database, not the weather.</error>",
    ]));
    let retriever = retriever(&model, &dir, 2).await;

    let outcome = retriever
        .apply("What's the weather like today?", &AlwaysAccept)
        .await
        .unwrap();

    match outcome {
        Outcome::Rejected(message) => assert!(message.contains("not the weather")),
        other => panic!("expected rejection, got {:?}", other),
    }
    assert_eq!(model.selection_calls(), 1);
    assert_eq!(model.generation_calls(), 0);
}

#[tokio::test]
async fn test_generation_rejection() {
    let dir = TempDir::new().unwrap();
    let model = Arc::new(ScriptedModel::new([
        selection_reply("[STOCK]"),
        "<error>Stock levels carry no supplier ratings.</error>".to_string(),
    ]));
    let retriever = retriever(&model, &dir, 2).await;

    let outcome = retriever.apply("Rate our suppliers", &AlwaysAccept).await.unwrap();
    assert!(matches!(outcome, Outcome::Rejected(ref m) if m.contains("supplier ratings")));
}

#[tokio::test]
async fn test_selection_budget_is_bounded() {
    let dir = TempDir::new().unwrap();
    let model = Arc::new(ScriptedModel::new([
        "I think WO_HDR is the right table.".to_string(),
        selection_reply("[WORK_ORDERS]"),
        selection_reply("[WO_HDR]"),
    ]));
    let retriever = retriever(&model, &dir, 2).await;

    let outcome = retriever.apply("Open work orders?", &AlwaysAccept).await.unwrap();

    assert!(matches!(outcome, Outcome::NoAnswer { stage: Stage::Selecting }));
    assert_eq!(model.selection_calls(), 2);
    assert_eq!(model.generation_calls(), 0);
    assert_eq!(model.remaining(), 1);

    // The corrective prompt quotes the original prompt, the bad reply and the parser error.
    let fix = model.requests()[1].last_user().unwrap().to_string();
    assert!(fix.contains("Open work orders?"));
    assert!(fix.contains("I think WO_HDR is the right table."));
    assert!(fix.contains("Missing <reasoning> tag"));
}

#[tokio::test]
async fn test_unknown_table_is_repaired() {
    let dir = TempDir::new().unwrap();
    let model = Arc::new(ScriptedModel::new([
        selection_reply("[WORK_ORDERS]"),
        selection_reply("[WO_HDR]"),
        plan_reply("SELECT COUNT(*) AS OPEN_COUNT FROM WO_HDR WHERE STATUS = 'O'", "open_count"),
    ]));
    let retriever = retriever(&model, &dir, 2).await;

    let outcome = retriever.apply("How many open work orders?", &AlwaysAccept).await.unwrap();

    let answer = outcome.answer().unwrap();
    assert_eq!(answer.tables[0].rows, vec![vec![json!(2)]]);
    assert!(model.requests()[1]
        .last_user()
        .unwrap()
        .contains("Table 'WORK_ORDERS' does not exist"));
}

#[tokio::test]
async fn test_execution_error_is_fed_back() {
    let dir = TempDir::new().unwrap();
    let model = Arc::new(ScriptedModel::new([
        selection_reply("[PO_HDR]"),
        plan_reply("SELECT PO_NO, SUPPLIER FROM PO_HDR", "purchase_orders"),
        plan_reply("SELECT PO_NO, VENDOR, TOTAL FROM PO_HDR", "purchase_orders"),
    ]));
    let retriever = retriever(&model, &dir, 2).await;

    let outcome = retriever.apply("List purchase orders with totals", &AlwaysAccept).await.unwrap();

    let answer = outcome.answer().unwrap();
    assert_eq!(answer.tables[0].rows[0], vec![json!(7), json!("ACME"), json!(1250.46)]);
    assert_eq!(model.generation_calls(), 2);

    let fix = last_user_turn(&model);
    assert!(fix.contains("Statement 0 failed: no such column: SUPPLIER"));
    assert!(fix.contains("SELECT PO_NO, SUPPLIER FROM PO_HDR"));
}

#[tokio::test]
async fn test_generation_budget_is_shared_with_execution() {
    let dir = TempDir::new().unwrap();
    let bad = plan_reply("SELECT NOPE FROM WO_HDR", "broken");
    let model = Arc::new(ScriptedModel::new([
        selection_reply("[WO_HDR]"),
        "<code>SELECT 1 ##D## SELECT 2</code><tablename>only_one</tablename>".to_string(),
        bad.clone(),
        bad.clone(),
        bad,
    ]));
    let retriever = retriever(&model, &dir, 3).await;

    let outcome = retriever.apply("Broken question", &AlwaysAccept).await.unwrap();

    assert!(matches!(outcome, Outcome::NoAnswer { stage: Stage::Generating }));
    assert_eq!(model.generation_calls(), 3);
    assert_eq!(model.remaining(), 1);

    let requests = model.requests();
    assert!(requests[2].last_user().unwrap().contains("I could not read your answer"));
    assert!(requests[3].last_user().unwrap().contains("no such column: NOPE"));
}

#[tokio::test]
async fn test_partial_success_is_discarded() {
    let dir = TempDir::new().unwrap();
    let model = Arc::new(ScriptedModel::new([
        selection_reply("[WO_HDR, STOCK]"),
        plan_reply("SELECT WO_NO FROM WO_HDR ##D## SELECT MISSING FROM STOCK", "orders, stock"),
    ]));
    let retriever = retriever(&model, &dir, 1).await;

    let outcome = retriever.apply("Orders and stock", &AlwaysAccept).await.unwrap();

    assert!(matches!(outcome, Outcome::NoAnswer { stage: Stage::Generating }));
    let (attempt, tables, from_cache) = outcome.into_parts();
    assert!(attempt.is_none() && tables.is_none() && from_cache.is_none());
}

#[tokio::test]
async fn test_saved_question_short_circuits() {
    let dir = TempDir::new().unwrap();
    let statements = vec![Statement::new("SELECT PART, QTY FROM STOCK ORDER BY PART", "stock_levels")];

    let model = Arc::new(ScriptedModel::new(["Show stock levels"]));
    let mut retriever = retriever(&model, &dir, 2).await;
    retriever.save_question("Show stock levels", statements.clone()).unwrap();

    let outcome = retriever.apply("What is in stock?", &AlwaysAccept).await.unwrap();

    let answer = outcome.answer().unwrap();
    assert!(answer.from_cache);
    assert_eq!(answer.attempt.statements, statements);
    assert_eq!(answer.tables[0].rows[0], vec![json!("PUMP-A"), json!(4)]);
    assert_eq!(model.selection_calls(), 0);
    assert!(model.requests()[0].last_user().unwrap().contains("- Show stock levels"));
}

#[tokio::test]
async fn test_declined_cache_match_runs_pipeline() {
    let dir = TempDir::new().unwrap();
    let model = Arc::new(ScriptedModel::new([
        "Show stock levels".to_string(),
        selection_reply("[STOCK]"),
        plan_reply("SELECT PART FROM STOCK WHERE QTY = 0", "out_of_stock"),
    ]));
    let mut retriever = retriever(&model, &dir, 2).await;
    retriever
        .save_question("Show stock levels", vec![Statement::new("SELECT * FROM STOCK", "stock")])
        .unwrap();

    let outcome = retriever.apply("What is out of stock?", &AlwaysDecline).await.unwrap();

    let answer = outcome.answer().unwrap();
    assert!(!answer.from_cache);
    assert_eq!(answer.tables[0].rows, vec![vec![json!("VALVE-C")]]);
}

#[tokio::test]
async fn test_stale_cached_statements_fall_through() {
    let dir = TempDir::new().unwrap();
    let config = config_in(dir.path(), 2);
    let mut cache = QuestionCache::open(config.cache_file()).unwrap();
    cache
        .put("Show stock levels", vec![Statement::new("SELECT ON_HAND FROM STOCK", "stock")])
        .unwrap();

    let model = Arc::new(ScriptedModel::new([
        "Show stock levels".to_string(),
        selection_reply("[STOCK]"),
        plan_reply("SELECT PART, QTY FROM STOCK", "stock"),
    ]));
    let retriever = Retriever::connect(model.clone(), Arc::new(erp_source()), config)
        .await
        .unwrap();

    let outcome = retriever.apply("Show stock levels", &AlwaysAccept).await.unwrap();

    assert!(!outcome.answer().unwrap().from_cache);
    assert_eq!(model.selection_calls(), 1);
}

#[tokio::test]
async fn test_save_question_persists_pairs() {
    let dir = TempDir::new().unwrap();
    let model = Arc::new(ScriptedModel::new(Vec::<String>::new()));
    let mut retriever = retriever(&model, &dir, 2).await;

    retriever
        .save_question(
            "  Show open work orders ",
            vec![Statement::new("SELECT WO_NO FROM WO_HDR WHERE STATUS = 'O'", "open_work_orders")],
        )
        .unwrap();

    let path = dir.path().join("answered_questions.json");
    let raw: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
    assert_eq!(
        raw,
        json!({"Show open work orders": [["SELECT WO_NO FROM WO_HDR WHERE STATUS = 'O'", "open_work_orders"]]})
    );
}

#[tokio::test]
async fn test_reformulate_returns_new_question() {
    let dir = TempDir::new().unwrap();
    let model = Arc::new(ScriptedModel::new([
        "<new_question>Show open work orders opened in March 2024</new_question>",
    ]));
    let retriever = retriever(&model, &dir, 2).await;

    let rewritten = retriever
        .reformulate("Show work orders", "I only want open ones from March")
        .await
        .unwrap();
    assert_eq!(rewritten, "Show open work orders opened in March 2024");
}

#[tokio::test]
async fn test_empty_question_makes_no_model_call() {
    let dir = TempDir::new().unwrap();
    let model = Arc::new(ScriptedModel::new(Vec::<String>::new()));
    let retriever = retriever(&model, &dir, 2).await;

    let outcome = retriever.apply("   ", &AlwaysAccept).await.unwrap();
    assert!(matches!(outcome, Outcome::Rejected(_)));
    assert!(model.requests().is_empty());
}

#[tokio::test]
async fn test_model_transport_error_propagates() {
    let dir = TempDir::new().unwrap();
    let model = Arc::new(ScriptedModel::new(Vec::<String>::new()));
    let retriever = retriever(&model, &dir, 2).await;

    let err = retriever.apply("Open work orders?", &AlwaysAccept).await.unwrap_err();
    assert!(matches!(err, RetrieverError::LlmError(_)));
}

struct UnreachableSource;

#[async_trait]
impl DataSource for UnreachableSource {
    async fn columns(&self) -> Result<Vec<(String, String)>> {
        Err(RetrieverError::Source("server unreachable".to_string()))
    }

    async fn query(&self, _sql: &str) -> Result<RawRows> {
        Err(RetrieverError::Source("server unreachable".to_string()))
    }

    fn system(&self) -> &'static str {
        "unreachable"
    }

    fn dialect(&self) -> SqlDialect {
        SqlDialect::MsSql
    }
}

#[tokio::test]
async fn test_catalog_failure_stops_before_model_calls() {
    let dir = TempDir::new().unwrap();
    let model = Arc::new(ScriptedModel::new([selection_reply("[WO_HDR]")]));

    let result = Retriever::connect(model.clone(), Arc::new(UnreachableSource), config_in(dir.path(), 2)).await;

    assert!(matches!(result, Err(RetrieverError::CatalogUnavailable(_))));
    assert!(model.requests().is_empty());
}

//! SQL Retriever CLI
//!
//! Ask questions about a database in plain language.

use anyhow::Context;
use clap::{Parser, Subcommand};
use sql_retriever::export::CsvExporter;
use sql_retriever::logging::{init_logging, LogFormat};
use sql_retriever::{
    AlwaysAccept, Answer, Confirm, LlmClient, Outcome, ResultTable, Retriever, RetrieverConfig, SqliteSource,
};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// SQL Retriever - natural-language questions over a SQL database
#[derive(Parser)]
#[command(name = "sqlr")]
#[command(about = "Answer natural-language questions with generated SQL", long_about = None)]
#[command(version)]
struct Cli {
    /// SQLite database file (overrides SQLR_DB_PATH)
    #[arg(long, env = "SQLR_DB_PATH", default_value = "~/.sqlr/data.db")]
    db: PathBuf,

    /// Config file (default: ~/.sqlr/config.json)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log format: compact or json
    #[arg(long, default_value = "compact")]
    log_format: String,

    /// Log level when RUST_LOG is not set
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer one question
    Ask {
        /// Question in natural language
        question: String,

        /// Store the answer for similar questions
        #[arg(long)]
        save: bool,

        /// Write every result table as CSV into this directory
        #[arg(long)]
        export: Option<PathBuf>,

        /// Accept a similar cached question without asking
        #[arg(long)]
        yes: bool,
    },

    /// Interactive question loop
    Shell,

    /// List tables known to the retriever
    Tables,

    /// List stored questions
    Cache,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(LogFormat::from_str(&cli.log_format), &cli.log_level)?;

    let config = RetrieverConfig::load(cli.config.as_deref())?;

    // Expand ~ in path
    let db_path = PathBuf::from(shellexpand::tilde(&cli.db.to_string_lossy()).to_string());

    match cli.command {
        Commands::Ask {
            question,
            save,
            export,
            yes,
        } => {
            let mut retriever = connect(&db_path, config).await?;
            cmd_ask(&mut retriever, &question, save, export.as_deref(), yes).await?;
        }
        Commands::Shell => {
            let mut retriever = connect(&db_path, config).await?;
            cmd_shell(&mut retriever).await?;
        }
        Commands::Tables => {
            let retriever = connect(&db_path, config).await?;
            cmd_tables(&retriever);
        }
        Commands::Cache => {
            cmd_cache(&config)?;
        }
    }

    Ok(())
}

async fn connect(db_path: &Path, config: RetrieverConfig) -> anyhow::Result<Retriever> {
    if !db_path.exists() {
        anyhow::bail!("Database not found: {}", db_path.display());
    }

    let model = LlmClient::from_env(&config.model)?;
    let source = SqliteSource::open(db_path)?;

    Retriever::connect(Arc::new(model), Arc::new(source), config)
        .await
        .context("Could not read the database schema")
}

// ============================================================================
// COMMANDS
// ============================================================================

async fn cmd_ask(
    retriever: &mut Retriever,
    question: &str,
    save: bool,
    export: Option<&Path>,
    yes: bool,
) -> anyhow::Result<()> {
    let outcome = if yes {
        retriever.apply(question, &AlwaysAccept).await?
    } else {
        retriever.apply(question, &TerminalConfirm).await?
    };

    print_outcome(&outcome, retriever.config().preview_rows);

    if let Outcome::Answered(answer) = outcome {
        if let Some(dir) = export {
            export_tables(&answer.tables, dir)?;
        }
        if save && !answer.from_cache {
            retriever.save_question(question, answer.attempt.statements)?;
            println!("✓ Question saved");
        }
    }

    Ok(())
}

async fn cmd_shell(retriever: &mut Retriever) -> anyhow::Result<()> {
    println!("Ask a question about your data. Type 'help' for commands, 'exit' to quit.");

    let mut input = Terminal;
    let mut last: Option<Answer> = None;
    loop {
        let Some(line) = input.read_line("\n> ")? else {
            break;
        };

        match line.as_str() {
            "" => continue,
            "exit" | "quit" => break,
            "help" => {
                println!("  <question>              ask a question");
                println!("  tables                  list known tables");
                println!("  export [DIR] [1,3|all]  write tables of the last answer as CSV files (default: all)");
                println!("  exit | quit             leave the shell");
            }
            "tables" => cmd_tables(retriever),
            cmd if cmd == "export" || cmd.starts_with("export ") => match &last {
                Some(answer) => {
                    if let Err(e) = cmd_export(answer, &cmd["export".len()..]) {
                        println!("✗ {}", e);
                    }
                }
                None => println!("Nothing to export yet."),
            },
            question => match answer_interactively(retriever, question, &TerminalConfirm, &mut input).await {
                Ok(answer) => last = answer,
                Err(e) => println!("✗ {}", e),
            },
        }
    }

    Ok(())
}

/// Ask, then let the user accept, save, or explain what was wrong and retry
/// with a reformulated question once they agree to it.
async fn answer_interactively(
    retriever: &mut Retriever,
    question: &str,
    confirm: &dyn Confirm,
    input: &mut dyn Prompter,
) -> anyhow::Result<Option<Answer>> {
    let rounds = retriever.config().tries.max(1);
    let mut question = question.to_string();

    for round in 1..=rounds {
        let outcome = retriever.apply(&question, confirm).await?;
        print_outcome(&outcome, retriever.config().preview_rows);

        let Outcome::Answered(answer) = outcome else {
            return Ok(None);
        };

        if input.ask_yes_no("Was this answer satisfactory?")? {
            if !answer.from_cache && input.ask_yes_no("Save this question for next time?")? {
                retriever.save_question(&question, answer.attempt.statements.clone())?;
                println!("✓ Question saved");
            }
            return Ok(Some(answer));
        }

        if round == rounds {
            println!("{}", GIVE_UP);
            return Ok(Some(answer));
        }

        let Some(explanation) = input.read_line("What was wrong with the answer? ")? else {
            return Ok(Some(answer));
        };
        let rewritten = retriever.reformulate(&question, &explanation).await?;
        println!("New question: {}", rewritten);
        if !input.ask_yes_no("Should I proceed with this new question?")? {
            println!("{}", GIVE_UP);
            return Ok(Some(answer));
        }
        question = rewritten;
    }

    Ok(None)
}

const GIVE_UP: &str = "Sorry I could not help this time. Try asking the question differently.";

/// `export [DIR] [1,3|all]` in the shell.
fn cmd_export(answer: &Answer, args: &str) -> anyhow::Result<()> {
    let (dir, pick) = parse_export_args(args)?;
    let tables = pick.select(&answer.tables)?;
    export_tables(&tables, &dir.unwrap_or_else(default_export_dir))
}

/// Which tables of an answer to export.
#[derive(Debug, PartialEq)]
enum Pick {
    All,
    /// 1-based positions, in the order given
    Tables(Vec<usize>),
}

impl Pick {
    fn select(&self, tables: &[ResultTable]) -> anyhow::Result<Vec<ResultTable>> {
        let Self::Tables(positions) = self else {
            return Ok(tables.to_vec());
        };

        let mut picked: Vec<usize> = Vec::new();
        for &n in positions {
            if n == 0 || n > tables.len() {
                anyhow::bail!("No table {}; the answer has {} table(s)", n, tables.len());
            }
            if !picked.contains(&n) {
                picked.push(n);
            }
        }
        Ok(picked.into_iter().map(|n| tables[n - 1].clone()).collect())
    }
}

/// Split shell export arguments into a directory and a table pick.
///
/// The last word is the pick when it is `all` or a comma-separated list of
/// table numbers; everything before it is the directory.
fn parse_export_args(args: &str) -> anyhow::Result<(Option<PathBuf>, Pick)> {
    let mut words: Vec<&str> = args.split_whitespace().collect();

    let pick = match words.last().copied() {
        Some("all") => {
            words.pop();
            Pick::All
        }
        Some(last) if is_table_list(last) => {
            words.pop();
            let positions = last
                .split(',')
                .filter(|n| !n.is_empty())
                .map(str::parse)
                .collect::<Result<Vec<usize>, _>>()
                .with_context(|| format!("Invalid table list '{}'", last))?;
            Pick::Tables(positions)
        }
        _ => Pick::All,
    };

    let dir = (!words.is_empty()).then(|| PathBuf::from(words.join(" ")));
    Ok((dir, pick))
}

fn is_table_list(word: &str) -> bool {
    word.chars().any(|c| c.is_ascii_digit()) && word.chars().all(|c| c.is_ascii_digit() || c == ',')
}

fn cmd_tables(retriever: &Retriever) {
    let catalog = retriever.catalog();
    println!("{} tables:", catalog.len());
    for (table, columns) in catalog.iter() {
        if columns.is_empty() {
            println!("  {}", table);
        } else {
            println!("  {} ({})", table, columns.join(", "));
        }
    }
}

fn cmd_cache(config: &RetrieverConfig) -> anyhow::Result<()> {
    let cache = sql_retriever::QuestionCache::open(config.cache_file())?;
    if cache.is_empty() {
        println!("No stored questions in {}", cache.path().display());
        return Ok(());
    }

    println!("{} stored questions ({}):", cache.len(), cache.path().display());
    for question in cache.questions() {
        let statements = cache.get(question).map(|s| s.len()).unwrap_or(0);
        println!("  {} [{} statement(s)]", question, statements);
    }
    Ok(())
}

// ============================================================================
// TERMINAL HELPERS
// ============================================================================

/// Line-oriented user input.
trait Prompter {
    /// Print `prompt` and read one trimmed line; `None` on end of input.
    fn read_line(&mut self, prompt: &str) -> io::Result<Option<String>>;

    /// Repeat `question` until the answer is yes or no. End of input is no.
    fn ask_yes_no(&mut self, question: &str) -> io::Result<bool> {
        loop {
            match self.read_line(&format!("{} [y/n] ", question))? {
                None => return Ok(false),
                Some(answer) => match answer.to_lowercase().as_str() {
                    "y" | "yes" => return Ok(true),
                    "n" | "no" => return Ok(false),
                    _ => println!("Please answer y or n."),
                },
            }
        }
    }
}

/// Stdin/stdout.
struct Terminal;

impl Prompter for Terminal {
    fn read_line(&mut self, prompt: &str) -> io::Result<Option<String>> {
        print!("{}", prompt);
        io::stdout().flush()?;

        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }
}

/// Asks the user before reusing a cached question.
struct TerminalConfirm;

impl Confirm for TerminalConfirm {
    fn same_question(&self, asked: &str, stored: &str) -> bool {
        if asked == stored {
            return true;
        }
        println!("A similar question was answered before: \"{}\"", stored);
        Terminal.ask_yes_no("Use that answer?").unwrap_or(false)
    }
}

fn print_outcome(outcome: &Outcome, preview_rows: usize) {
    match outcome {
        Outcome::Answered(answer) => {
            if answer.from_cache {
                println!("(answer from a previously saved question)");
            }
            if !answer.attempt.reasoning.is_empty() {
                println!("\n{}", answer.attempt.reasoning);
            }
            for (n, (statement, table)) in answer.attempt.statements.iter().zip(&answer.tables).enumerate() {
                println!("\n{}. {} ({} rows)", n + 1, table.name, table.len());
                println!("  {}", statement.sql);
                println!("{}", table.to_text(preview_rows));
                if table.len() > preview_rows {
                    println!("  ... {} more rows", table.len() - preview_rows);
                }
            }
        }
        Outcome::Rejected(message) => println!("{}", message),
        Outcome::NoAnswer { stage } => println!(
            "Sorry, I could not build a working query for this question ({} failed). Please try rephrasing it.",
            stage
        ),
    }
}

fn export_tables(tables: &[ResultTable], dir: &Path) -> anyhow::Result<()> {
    for path in CsvExporter::export_all(tables, dir)? {
        println!("✓ Wrote {}", path.display());
    }
    Ok(())
}

fn default_export_dir() -> PathBuf {
    PathBuf::from(format!("sqlr-export-{}", chrono::Local::now().format("%Y%m%d-%H%M%S")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use sql_retriever::{AlwaysDecline, ChatModel, ChatRequest, RetrieverError};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct ScriptedModel {
        replies: Mutex<VecDeque<String>>,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl ScriptedModel {
        fn new(replies: &[&str]) -> Self {
            Self {
                replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn requests(&self) -> Vec<ChatRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn complete(&self, request: &ChatRequest) -> sql_retriever::Result<String> {
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

    struct ScriptedInput(VecDeque<&'static str>);

    impl ScriptedInput {
        fn new(lines: &[&'static str]) -> Self {
            Self(lines.iter().copied().collect())
        }
    }

    impl Prompter for ScriptedInput {
        fn read_line(&mut self, _prompt: &str) -> io::Result<Option<String>> {
            Ok(self.0.pop_front().map(str::to_string))
        }
    }

    const SELECTION: &str = "<reasoning>Headers hold the status.</reasoning>\n<tables>[WO_HDR]</tables>";
    const ALL_ORDERS: &str = "<user_reasoning>All work orders.</user_reasoning>\n<code>SELECT WO_NO FROM WO_HDR ORDER BY WO_NO</code>\n<tablename>work_orders</tablename>";
    const OPEN_ORDERS: &str = "<user_reasoning>Open work orders.</user_reasoning>\n<code>SELECT WO_NO FROM WO_HDR WHERE STATUS = 'O'</code>\n<tablename>open_work_orders</tablename>";
    const REWRITE: &str = "<new_question>Show open work orders</new_question>";

    async fn retriever(model: &Arc<ScriptedModel>, dir: &TempDir) -> Retriever {
        let source = SqliteSource::in_memory().unwrap();
        source
            .execute_batch(
                "CREATE TABLE WO_HDR (WO_NO INTEGER PRIMARY KEY, STATUS TEXT);
                 INSERT INTO WO_HDR VALUES (1, 'O'), (2, 'C');",
            )
            .unwrap();
        let config = RetrieverConfig {
            tries: 2,
            cache_path: dir.path().join("answered.json").to_string_lossy().into_owned(),
            essential_tables: Vec::new(),
            ..RetrieverConfig::default()
        };
        Retriever::connect(model.clone(), Arc::new(source), config).await.unwrap()
    }

    #[tokio::test]
    async fn test_declined_rewrite_stops_without_asking_again() {
        let dir = TempDir::new().unwrap();
        let model = Arc::new(ScriptedModel::new(&[SELECTION, ALL_ORDERS, REWRITE]));
        let mut retriever = retriever(&model, &dir).await;
        let mut input = ScriptedInput::new(&["n", "I only want open ones", "n"]);

        let answer = answer_interactively(&mut retriever, "Show work orders", &AlwaysDecline, &mut input)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(answer.tables[0].name, "work_orders");
        assert_eq!(model.requests().len(), 3);
        assert!(input.0.is_empty());
        assert!(retriever.cache().is_empty());
    }

    #[tokio::test]
    async fn test_accepted_rewrite_is_answered() {
        let dir = TempDir::new().unwrap();
        let model = Arc::new(ScriptedModel::new(&[SELECTION, ALL_ORDERS, REWRITE, SELECTION, OPEN_ORDERS]));
        let mut retriever = retriever(&model, &dir).await;
        let mut input = ScriptedInput::new(&["n", "I only want open ones", "y", "y", "y"]);

        let answer = answer_interactively(&mut retriever, "Show work orders", &AlwaysDecline, &mut input)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(answer.tables[0].rows, vec![vec![json!(1)]]);
        let requests = model.requests();
        assert_eq!(requests.len(), 5);
        assert!(requests[3].last_user().unwrap().contains("Show open work orders"));
        assert!(retriever.cache().get("Show open work orders").is_some());
    }

    #[test]
    fn test_parse_export_args() {
        assert_eq!(parse_export_args("").unwrap(), (None, Pick::All));
        assert_eq!(
            parse_export_args(" out/march ").unwrap(),
            (Some(PathBuf::from("out/march")), Pick::All)
        );
        assert_eq!(
            parse_export_args(" out 1,3").unwrap(),
            (Some(PathBuf::from("out")), Pick::Tables(vec![1, 3]))
        );
        assert_eq!(parse_export_args(" 2").unwrap(), (None, Pick::Tables(vec![2])));
        assert_eq!(parse_export_args(" my dir all").unwrap(), (Some(PathBuf::from("my dir")), Pick::All));
        assert!(parse_export_args(" 99999999999999999999999").is_err());
    }

    #[test]
    fn test_pick_select() {
        let tables: Vec<ResultTable> = ["a", "b", "c"]
            .iter()
            .map(|name| ResultTable::new(*name, vec!["X".to_string()], Vec::new()))
            .collect();

        let names = |picked: Vec<ResultTable>| picked.into_iter().map(|t| t.name).collect::<Vec<_>>();
        assert_eq!(names(Pick::All.select(&tables).unwrap()), vec!["a", "b", "c"]);
        assert_eq!(names(Pick::Tables(vec![3, 1, 3]).select(&tables).unwrap()), vec!["c", "a"]);
        assert!(Pick::Tables(vec![4]).select(&tables).is_err());
        assert!(Pick::Tables(vec![0]).select(&tables).is_err());
    }

    #[test]
    fn test_export_picked_tables() {
        let dir = TempDir::new().unwrap();
        let answer = Answer {
            attempt: sql_retriever::QueryAttempt::from_statements(Vec::new()),
            tables: vec![
                ResultTable::new("orders", vec!["X".to_string()], vec![vec![json!(1)]]),
                ResultTable::new("stock", vec!["X".to_string()], vec![vec![json!(2)]]),
            ],
            from_cache: false,
        };

        let args = format!(" {} 2", dir.path().display());
        cmd_export(&answer, &args).unwrap();

        assert!(dir.path().join("stock.csv").exists());
        assert!(!dir.path().join("orders.csv").exists());
    }
}

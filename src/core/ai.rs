// llm integration - turns a plain language question into candidate sql
// nothing here is trusted: whatever comes back still goes through the guard

use crate::Error;
use crate::config::GeneratorConfig;
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Provider {
    #[default]
    Ollama,
    Claude,
    #[value(name = "openai")]
    OpenAi,
}

impl Provider {
    pub fn default_model(self) -> &'static str {
        match self {
            Provider::Ollama => "qwen2.5:7b-instruct",
            Provider::Claude => "claude-sonnet-4-20250514",
            Provider::OpenAi => "gpt-4o-mini",
        }
    }

    fn name(self) -> &'static str {
        match self {
            Provider::Ollama => "ollama",
            Provider::Claude => "claude",
            Provider::OpenAi => "openai",
        }
    }
}

/// A chat model that answers one system + user prompt pair.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> Result<String, Error>;
}

pub fn client_for(config: &GeneratorConfig) -> Result<Box<dyn LlmClient>, Error> {
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;
    let model = config.model().to_string();

    let client: Box<dyn LlmClient> = match config.provider {
        Provider::Ollama => Box::new(Ollama {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model,
        }),
        Provider::Claude => {
            // check common env var names for the api key
            let api_key = config
                .api_key
                .clone()
                .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok())
                .or_else(|| std::env::var("CLAUDE_API_KEY").ok())
                .or_else(|| std::env::var("CLAUDE_KEY").ok())
                .ok_or(Error::MissingApiKey(Provider::Claude.name()))?;
            Box::new(Claude {
                http,
                api_key,
                model,
            })
        }
        Provider::OpenAi => {
            let api_key = config
                .api_key
                .clone()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok())
                .ok_or(Error::MissingApiKey(Provider::OpenAi.name()))?;
            Box::new(OpenAi {
                http,
                api_key,
                model,
            })
        }
    };

    Ok(client)
}

// chat message shape shared by ollama, openai and claude
#[derive(Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

impl Message {
    fn new(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
        }
    }
}

struct Ollama {
    http: reqwest::Client,
    base_url: String,
    model: String,
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct OllamaResponse {
    message: Option<Message>,
}

#[async_trait]
impl LlmClient for Ollama {
    async fn complete(&self, system: &str, user: &str) -> Result<String, Error> {
        let request = OllamaRequest {
            model: &self.model,
            messages: vec![Message::new("system", system), Message::new("user", user)],
            stream: false,
            options: OllamaOptions { temperature: 0.0 },
        };

        let response = self
            .http
            .post(format!("{}/api/chat", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Llm("ollama request timed out".to_string())
                } else if e.is_connect() {
                    Error::Llm(format!("could not reach ollama at {}", self.base_url))
                } else {
                    Error::Http(e)
                }
            })?;

        if !response.status().is_success() {
            let error = response.text().await?;
            return Err(Error::Llm(error));
        }

        let response: OllamaResponse = response.json().await?;
        Ok(response.message.map(|m| m.content).unwrap_or_default())
    }
}

struct Claude {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct ClaudeRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<Message>,
}

#[derive(Deserialize)]
struct ClaudeResponse {
    content: Vec<ClaudeContent>,
}

#[derive(Deserialize)]
struct ClaudeContent {
    text: String,
}

#[async_trait]
impl LlmClient for Claude {
    async fn complete(&self, system: &str, user: &str) -> Result<String, Error> {
        let request = ClaudeRequest {
            model: &self.model,
            max_tokens: 1024,
            system,
            messages: vec![Message::new("user", user)],
        };

        let response = self
            .http
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let error = response.text().await?;
            return Err(Error::Llm(error));
        }

        let response: ClaudeResponse = response.json().await?;
        Ok(response
            .content
            .into_iter()
            .next()
            .map(|c| c.text)
            .unwrap_or_default())
    }
}

struct OpenAi {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    temperature: f32,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: Message,
}

#[async_trait]
impl LlmClient for OpenAi {
    async fn complete(&self, system: &str, user: &str) -> Result<String, Error> {
        let request = OpenAiRequest {
            model: &self.model,
            messages: vec![Message::new("system", system), Message::new("user", user)],
            temperature: 0.0,
        };

        let response = self
            .http
            .post("https://api.openai.com/v1/chat/completions")
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let error = response.text().await?;
            return Err(Error::Llm(error));
        }

        let response: OpenAiResponse = response.json().await?;
        Ok(response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default())
    }
}

const SQL_SYSTEM: &str = "You are a SQL query generator. \
Answer ONLY with the SQL query: no markdown, no extra text, no explanations. \
Use exactly the table and column names you are given. \
Generate SELECT statements only (NEVER INSERT, UPDATE, DELETE, DROP, CREATE). \
Use LIMIT sparingly.";

const SQL_STRICT: &str = " Answer with EXACTLY one line that starts with SELECT \
and does not end with a semicolon. No markdown or explanations.";

const NO_SCHEMA: &str = "/* schema unavailable */";

fn sql_prompt(question: &str, schema: &str) -> String {
    format!(
        r#"Schema:
{schema}

Question:
{question}

Extra rules:
- SELECT only.
- No comments.
- Just the query, nothing around it.
- If the question is ambiguous, assume the most common reading (e.g. monthly totals for the year mentioned).

SQL:
"#
    )
}

/// Asks the model for sql, retrying once with a stricter instruction.
///
/// `Ok(None)` means the model answered but nothing in the reply looked
/// like a query. Transport errors are returned as-is and not retried.
pub async fn generate_sql(
    client: &dyn LlmClient,
    question: &str,
    schema: Option<&str>,
) -> Result<Option<String>, Error> {
    let schema = schema.filter(|s| !s.trim().is_empty()).unwrap_or(NO_SCHEMA);
    let user = sql_prompt(question, schema);

    for hint in ["", SQL_STRICT] {
        let system = format!("{SQL_SYSTEM}{hint}");
        let raw = client.complete(&system, &user).await?;
        let sql = extract_sql(&raw);

        if !sql.is_empty() && looks_like_select(&sql) {
            return Ok(Some(sql));
        }
        debug!(reply_len = raw.len(), "model reply did not contain a query");
    }

    warn!("no sql produced after retry");
    Ok(None)
}

static CODE_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)```(?:sql)?\s*([\s\S]*?)```").expect("code block pattern"));

static LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*(?:sql|query)\s*:\s*").expect("label pattern"));

static LINE_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^[ \t]*(?:select|with)\b").expect("line start pattern"));

static ANY_SELECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bselect\b").expect("select pattern"));

static TRAILING_SEMI: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r";+\s*$").expect("trailing semicolon pattern"));

static LINE_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)--.*$").expect("line comment pattern"));

static BLOCK_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/\*[\s\S]*?\*/").expect("block comment pattern"));

// models like to wrap sql in prose, fences and labels
fn extract_sql(reply: &str) -> String {
    let mut text = reply.trim();

    // a fenced block wins over everything around it
    if let Some(body) = CODE_BLOCK.captures(text).and_then(|c| c.get(1)) {
        let body = body.as_str().trim();
        if !body.is_empty() {
            text = body;
        }
    }

    let text = text.trim_matches('`').trim();
    let text = LABEL.replace(text, "");
    let text = text.trim();

    let start = LINE_START
        .find(text)
        .or_else(|| ANY_SELECT.find(text))
        .map(|m| m.start())
        .unwrap_or(0);
    let text = text[start..].trim();

    TRAILING_SEMI.replace(text, "").trim().to_string()
}

fn looks_like_select(sql: &str) -> bool {
    let stripped = LINE_COMMENT.replace_all(sql, "");
    let stripped = BLOCK_COMMENT.replace_all(&stripped, "");
    let lower = stripped.trim().to_lowercase();
    lower.starts_with("select") || lower.starts_with("with")
}

const SUMMARY_SYSTEM: &str = "You are an analytics assistant. You will receive the executed SQL, \
its columns and the first rows of the result. Answer concisely and factually, \
using only the data provided.";

const SUMMARY_ROWS: usize = 20;
const SUMMARY_MAX_CHARS: usize = 500;

/// Short natural language reading of a result, built from a row sample.
pub async fn summarize(
    client: &dyn LlmClient,
    question: &str,
    columns: &[String],
    rows: &[Vec<serde_json::Value>],
    sql: &str,
) -> Result<String, Error> {
    let sample = &rows[..rows.len().min(SUMMARY_ROWS)];
    let user = format!(
        r#"Original question:
{question}

Executed SQL:
{sql}

Columns:
{columns}

Sample rows (up to {SUMMARY_ROWS}):
{rows}

Instructions:
- Summarize the main finding in 2-4 short sentences.
- If there is a period or grouping, point out the trend (growth, decline, peaks).
- Avoid technical jargon."#,
        columns = serde_json::to_string(columns)?,
        rows = serde_json::to_string(sample)?,
    );

    let out = client.complete(SUMMARY_SYSTEM, &user).await?;
    Ok(truncate(out.trim(), SUMMARY_MAX_CHARS))
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let head: String = text.chars().take(max_chars - 3).collect();
    format!("{}...", head.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // replays canned replies in order
    struct Scripted(Mutex<Vec<&'static str>>);

    #[async_trait]
    impl LlmClient for Scripted {
        async fn complete(&self, _system: &str, _user: &str) -> Result<String, Error> {
            let mut replies = self.0.lock().unwrap();
            Ok(replies.remove(0).to_string())
        }
    }

    #[test]
    fn extract_prefers_fenced_block() {
        let reply = "Here you go:\n```sql\nSELECT id FROM cliente;\n```\nHope it helps";
        assert_eq!(extract_sql(reply), "SELECT id FROM cliente");
    }

    #[test]
    fn extract_strips_label_and_prose() {
        assert_eq!(extract_sql("SQL: SELECT 1;;"), "SELECT 1");
        assert_eq!(
            extract_sql("The query you want is\nSELECT nome FROM produto"),
            "SELECT nome FROM produto"
        );
    }

    #[test]
    fn extract_keeps_cte_from_line_start() {
        let reply = "Query with a cte:\nWITH x AS (SELECT 1) SELECT * FROM x";
        assert_eq!(extract_sql(reply), "WITH x AS (SELECT 1) SELECT * FROM x");
    }

    #[test]
    fn select_check_ignores_comments() {
        assert!(looks_like_select("-- totals\nSELECT 1"));
        assert!(looks_like_select("/* x */ with a as (select 1) select * from a"));
        assert!(!looks_like_select("I cannot answer that"));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let long = "é".repeat(600);
        let out = truncate(&long, 500);
        assert_eq!(out.chars().count(), 500);
        assert!(out.ends_with("..."));
        assert_eq!(truncate("short", 500), "short");
    }

    #[tokio::test]
    async fn generate_retries_once() {
        let client = Scripted(Mutex::new(vec!["sorry, no idea", "SELECT 1"]));
        let sql = generate_sql(&client, "one", None).await.unwrap();
        assert_eq!(sql.as_deref(), Some("SELECT 1"));
    }

    #[tokio::test]
    async fn generate_gives_up_after_retry() {
        let client = Scripted(Mutex::new(vec!["nope", "still nope"]));
        let sql = generate_sql(&client, "one", Some("TABLE t")).await.unwrap();
        assert!(sql.is_none());
    }
}

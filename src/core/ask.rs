// question -> candidate sql -> guard -> read-only execution
// every expected failure ends up in the response, never as an Err

use super::ai::{self, LlmClient};
use super::db::Db;
use super::guard::{StatementClassifier, Verdict};
use serde::Serialize;
use std::num::NonZeroU32;
use tracing::{info, warn};

const MIN_QUESTION_CHARS: usize = 3;

pub struct AskOptions {
    pub result_limit: NonZeroU32,
    pub summarize: bool,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct AskResponse {
    pub ok: bool,
    pub sql: Option<String>,
    pub columns: Option<Vec<String>>,
    pub rows: Option<Vec<Vec<serde_json::Value>>>,
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
}

impl AskResponse {
    fn failed(sql: Option<String>, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            sql,
            columns: None,
            rows: None,
            message: Some(message.into()),
            answer: None,
        }
    }
}

pub async fn ask(
    generator: &dyn LlmClient,
    guard: &dyn StatementClassifier,
    db: &Db,
    schema: Option<&str>,
    question: &str,
    options: &AskOptions,
) -> AskResponse {
    let question = question.trim();
    if question.chars().count() < MIN_QUESTION_CHARS {
        return AskResponse::failed(None, "question too short");
    }

    let candidate = match ai::generate_sql(generator, question, schema).await {
        Ok(Some(sql)) => sql,
        Ok(None) => return AskResponse::failed(None, "failed to generate SQL"),
        Err(e) => {
            warn!(error = %e, "sql generation failed");
            return AskResponse::failed(None, format!("error generating SQL: {e}"));
        }
    };

    // the raw candidate goes back on rejection so the user can see what was refused
    let sql = match guard.sanitize(&candidate, options.result_limit) {
        Verdict::Accepted { sql } => sql,
        Verdict::Rejected { reason } => {
            warn!(%reason, "generated sql rejected");
            return AskResponse::failed(Some(candidate), reason.to_string());
        }
    };

    let result = match db.execute(&sql).await {
        Ok(result) => result,
        Err(e) => {
            warn!(error = %e, "query execution failed");
            return AskResponse::failed(Some(sql), format!("error executing SQL: {e}"));
        }
    };
    info!(rows = result.row_count, "query answered");

    let answer = if options.summarize {
        match ai::summarize(generator, question, &result.columns, &result.rows, &sql).await {
            Ok(text) => Some(text),
            Err(e) => {
                warn!(error = %e, "summary failed");
                None
            }
        }
    } else {
        None
    };

    AskResponse {
        ok: true,
        sql: Some(sql),
        columns: Some(result.columns),
        rows: Some(result.rows),
        message: None,
        answer,
    }
}

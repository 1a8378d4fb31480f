use miette::Diagnostic;
use thiserror::Error;

// infrastructure failures only - guard rejections are verdicts, not errors
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Missing API key for {0}. Pass --api-key or set LLM_API_KEY")]
    MissingApiKey(&'static str),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not a usable SQLite database: {0}")]
    Upload(String),

    #[error("Server error: {0}")]
    Server(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_into_a_report() {
        let report: miette::Report = Error::Llm("model unavailable".to_string()).into();
        assert_eq!(report.to_string(), "LLM error: model unavailable");

        let result: miette::Result<()> = Err(Error::MissingApiKey("claude")).map_err(Into::into);
        assert!(result.unwrap_err().to_string().starts_with("Missing API key for claude"));
    }
}

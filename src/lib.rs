// sqlgate library - plain language questions, read-only sql answers

pub mod cli;
pub mod config;
mod core;
mod error;
pub mod logging;
mod output;
mod server;

pub use config::{Config, GeneratorConfig};
pub use crate::core::{
    AskOptions, AskResponse, Db, Dialect, FORBIDDEN_KEYWORDS, LexicalGuard, LlmClient, Provider,
    QueryResult, Rejection, StatementClassifier, Verdict, ask, client_for, generate_sql,
    sanitize, summarize,
};
pub use error::Error;
pub use server::{AppState, Server, router};

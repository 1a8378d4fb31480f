// core logic - guard, generation, execution and the pipeline tying them together

mod ai;
mod ask;
mod db;
mod guard;

pub use ai::{LlmClient, Provider, client_for, generate_sql, summarize};
pub use ask::{AskOptions, AskResponse, ask};
pub use db::{Db, Dialect, QueryResult};
pub use guard::{
    FORBIDDEN_KEYWORDS, LexicalGuard, Rejection, StatementClassifier, Verdict, sanitize,
};

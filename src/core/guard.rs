// sql guard - decides whether generated sql may run at all
// lexical filter, not a parser: it blocks obvious writes and bounds row counts

use regex::{Captures, Regex};
use serde::ser::{Serialize, SerializeStruct, Serializer};
use std::num::NonZeroU32;
use std::sync::LazyLock;

/// Words that reject a statement wherever they appear as a whole word.
pub const FORBIDDEN_KEYWORDS: [&str; 14] = [
    "insert", "update", "delete", "drop", "truncate", "alter", "create", "attach", "vacuum",
    "pragma", "reindex", "replace", "grant", "revoke",
];

// leading ```sql / ``` and trailing ``` on any line
static FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?imR)^```(?:sql)?\s*|```$").expect("fence pattern"));

// line comments need a terminating newline, so callers append one first.
// an unclosed block comment runs to the end of input, as sqlite reads it
static COMMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)--[^\n]*\n|/\*.*?(?:\*/|\z)").expect("comment pattern")
});

static FORBIDDEN: LazyLock<Regex> = LazyLock::new(|| {
    let words = FORBIDDEN_KEYWORDS.join("|");
    Regex::new(&format!(r"(?i)\b(?:{words})\b")).expect("forbidden keyword pattern")
});

static SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*(?:select|with)\b").expect("shape pattern"));

// trailing `limit n`, `limit n offset m` or `limit m, n`; n is the row count
static LIMIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\blimit\s+(?:\d+\s*,\s*)?)(\d+)((?:\s+offset\s+\d+)?\s*)$")
        .expect("limit pattern")
});

/// Why a candidate statement was refused.
///
/// The messages are shown to end users as-is, so they name the rule that
/// failed and nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("empty SQL")]
    Empty,
    #[error("command not allowed; only SELECT/CTE accepted")]
    ForbiddenCommand,
    #[error("only SELECT is allowed")]
    NotSelect,
    #[error("multiple statements not allowed")]
    MultipleStatements,
}

/// Outcome of running a candidate through the guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Single read-only statement carrying an explicit row bound.
    Accepted { sql: String },
    Rejected { reason: Rejection },
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }

    pub fn sql(&self) -> Option<&str> {
        match self {
            Self::Accepted { sql } => Some(sql),
            Self::Rejected { .. } => None,
        }
    }

    pub fn reason(&self) -> Option<Rejection> {
        match self {
            Self::Accepted { .. } => None,
            Self::Rejected { reason } => Some(*reason),
        }
    }

    fn rejected(reason: Rejection) -> Self {
        Self::Rejected { reason }
    }
}

// {"accepted": true, "sql": ...} | {"accepted": false, "reason": ...}
impl Serialize for Verdict {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Verdict", 2)?;
        match self {
            Self::Accepted { sql } => {
                state.serialize_field("accepted", &true)?;
                state.serialize_field("sql", sql)?;
            }
            Self::Rejected { reason } => {
                state.serialize_field("accepted", &false)?;
                state.serialize_field("reason", &reason.to_string())?;
            }
        }
        state.end()
    }
}

/// Anything that can turn candidate sql into a verdict.
///
/// Callers hold a `dyn StatementClassifier` so a parser-backed
/// implementation can replace the lexical one without touching them.
pub trait StatementClassifier: Send + Sync {
    fn sanitize(&self, candidate: &str, max_rows: NonZeroU32) -> Verdict;
}

/// Regex-based classifier. Pure and stateless.
#[derive(Debug, Default, Clone, Copy)]
pub struct LexicalGuard;

impl StatementClassifier for LexicalGuard {
    fn sanitize(&self, candidate: &str, max_rows: NonZeroU32) -> Verdict {
        if candidate.trim().is_empty() {
            return Verdict::rejected(Rejection::Empty);
        }

        let sql = clean(candidate);

        // nothing left once fences and comments are gone
        if sql.is_empty() {
            return Verdict::rejected(Rejection::Empty);
        }

        if FORBIDDEN.is_match(&sql) {
            return Verdict::rejected(Rejection::ForbiddenCommand);
        }

        if !SHAPE.is_match(&sql) {
            return Verdict::rejected(Rejection::NotSelect);
        }

        if sql.contains(';') {
            return Verdict::rejected(Rejection::MultipleStatements);
        }

        Verdict::Accepted {
            sql: bound_rows(&sql, max_rows),
        }
    }
}

/// Runs `candidate` through the default [`LexicalGuard`].
pub fn sanitize(candidate: &str, max_rows: NonZeroU32) -> Verdict {
    LexicalGuard.sanitize(candidate, max_rows)
}

// fences, then comments, then one trailing semicolon
fn clean(candidate: &str) -> String {
    let mut sql = FENCE.replace_all(candidate, "").trim().to_string();
    if !sql.ends_with('\n') {
        sql.push('\n');
    }

    let sql = COMMENT.replace_all(&sql, "\n");
    let sql = sql.trim();
    let sql = sql.strip_suffix(';').map(str::trim_end).unwrap_or(sql);
    sql.to_string()
}

// only the statement's own trailing clause bounds rows; limits elsewhere
// (subqueries, string literals) are left alone
fn bound_rows(sql: &str, max_rows: NonZeroU32) -> String {
    let max = u64::from(max_rows.get());

    if !LIMIT.is_match(sql) {
        return format!("{sql} LIMIT {max}");
    }

    LIMIT
        .replace(sql, |caps: &Captures| {
            // digits too long for u64 are certainly above the cap
            let n = caps[2].parse::<u64>().unwrap_or(u64::MAX);
            if n > max {
                format!("{}{max}{}", &caps[1], &caps[3])
            } else {
                caps[0].to_string()
            }
        })
        .into_owned()
}

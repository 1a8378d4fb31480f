//! Property tests for the sql guard.

use proptest::prelude::*;
use regex::Regex;
use sqlgate::{FORBIDDEN_KEYWORDS, Verdict, sanitize};
use std::num::NonZeroU32;

fn arb_limit() -> impl Strategy<Value = NonZeroU32> {
    (1u32..=5_000).prop_map(|n| NonZeroU32::new(n).unwrap())
}

/// Harmless tokens, some of which embed forbidden words inside identifiers.
fn arb_body() -> impl Strategy<Value = String> {
    let token = prop::sample::select(vec![
        "id", "nome", "created_at", "updated_by", "is_deleted", "total", "cliente", "*", ",",
        "COUNT(*)", "=", ">", "1", "'a'", "FROM", "WHERE", "AND", "ORDER", "BY", "x", "limit",
        "10", "GROUP",
    ]);
    prop::collection::vec(token, 0..20).prop_map(|tokens| tokens.join(" "))
}

fn arb_statement() -> impl Strategy<Value = String> {
    let head = prop::sample::select(vec!["SELECT", "select", "WITH x AS (SELECT 1) SELECT"]);
    (head, arb_body()).prop_map(|(head, body)| format!("{head} {body}"))
}

/// A statement dressed the way a model tends to return it.
fn arb_candidate() -> impl Strategy<Value = String> {
    (
        arb_statement(),
        any::<bool>(),
        any::<bool>(),
        any::<bool>(),
        any::<bool>(),
    )
        .prop_map(|(stmt, fenced, line_comment, block_comment, semicolon)| {
            let mut sql = stmt;
            if block_comment {
                sql = format!("/* drop it all */ {sql}");
            }
            if line_comment {
                sql = format!("-- delete later\n{sql}");
            }
            if semicolon {
                sql.push(';');
            }
            if fenced {
                sql = format!("```sql\n{sql}\n```");
            }
            sql
        })
}

/// Arbitrary text, half of it behind a leading SELECT so it gets past the shape check.
fn arb_noise() -> impl Strategy<Value = String> {
    prop_oneof![
        ".{0,200}",
        ".{0,200}".prop_map(|rest| format!("SELECT {rest}")),
    ]
}

fn forbidden_word() -> Regex {
    Regex::new(&format!(r"(?i)\b(?:{})\b", FORBIDDEN_KEYWORDS.join("|"))).unwrap()
}

/// Row count of the statement's trailing limit clause.
fn row_cap(sql: &str) -> Option<u64> {
    Regex::new(r"(?i)\blimit\s+(?:\d+\s*,\s*)?(\d+)(?:\s+offset\s+\d+)?\s*$")
        .unwrap()
        .captures(sql)
        .map(|c| c[1].parse().unwrap())
}

proptest! {
    #[test]
    fn prop_rewrite_is_idempotent(candidate in arb_candidate(), max in arb_limit()) {
        let first = sanitize(&candidate, max);
        let sql = first.sql().expect("generated candidates are accepted").to_string();

        let second = sanitize(&sql, max);
        prop_assert_eq!(second, Verdict::Accepted { sql });
    }

    #[test]
    fn prop_explicit_limit_never_raised(
        stmt in arb_statement(),
        n in 1u64..20_000,
        max in arb_limit(),
    ) {
        // keep the body free of its own limit clause
        prop_assume!(!stmt.to_lowercase().contains("limit"));

        let verdict = sanitize(&format!("{stmt} LIMIT {n}"), max);
        let sql = verdict.sql().expect("accepted");
        let expected = n.min(u64::from(max.get()));
        prop_assert!(sql.ends_with(&format!("LIMIT {expected}")), "{}", sql);
    }

    #[test]
    fn prop_offset_count_limit_never_raised(
        stmt in arb_statement(),
        offset in 0u64..100_000,
        n in 1u64..20_000,
        max in arb_limit(),
    ) {
        let verdict = sanitize(&format!("{stmt} LIMIT {offset}, {n}"), max);
        let sql = verdict.sql().expect("accepted");
        let expected = n.min(u64::from(max.get()));
        prop_assert!(sql.ends_with(&format!("LIMIT {offset}, {expected}")), "{}", sql);
    }

    #[test]
    fn prop_accepted_output_is_bounded_and_read_only(input in arb_noise(), max in arb_limit()) {
        if let Verdict::Accepted { sql } = sanitize(&input, max) {
            prop_assert!(!sql.contains(';'));
            prop_assert!(!forbidden_word().is_match(&sql), "{}", sql);

            let shape = Regex::new(r"(?i)^(?:select|with)\b").unwrap();
            prop_assert!(shape.is_match(&sql), "{}", sql);

            let cap = row_cap(&sql);
            prop_assert!(cap.is_some_and(|n| n <= u64::from(max.get())), "{}", sql);
        }
    }

    #[test]
    fn prop_dressed_statements_keep_their_shape(candidate in arb_candidate(), max in arb_limit()) {
        let sql = sanitize(&candidate, max).sql().map(str::to_string);
        prop_assert!(sql.is_some());
        let sql = sql.unwrap();
        prop_assert!(!sql.contains("```"));
        prop_assert!(!sql.contains("--"));
        prop_assert!(!sql.contains("/*"));
    }
}

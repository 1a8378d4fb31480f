// output formatting - pretty tables or raw json

use crate::core::{AskResponse, Verdict};

const MAX_WIDTH: usize = 40;

pub struct Output;

impl Output {
    // nice table format for humans
    pub fn pretty(response: &AskResponse) {
        if let Some(sql) = &response.sql {
            println!("sql: {sql}\n");
        }

        if !response.ok {
            println!("error: {}", response.message.as_deref().unwrap_or("unknown"));
            return;
        }

        let columns = response.columns.as_deref().unwrap_or_default();
        let rows = response.rows.as_deref().unwrap_or_default();
        println!("rows: {}\n", rows.len());

        if rows.is_empty() {
            println!("no results");
        } else {
            print!("{}", render_table(columns, rows));
        }

        if let Some(answer) = &response.answer {
            println!("\n{answer}");
        }
    }

    // raw json for scripts
    pub fn raw(response: &AskResponse) {
        println!("{}", serde_json::to_string(response).unwrap_or_default());
    }

    pub fn verdict(verdict: &Verdict, raw: bool) {
        if raw {
            println!("{}", serde_json::to_string(verdict).unwrap_or_default());
            return;
        }
        match verdict {
            Verdict::Accepted { sql } => println!("accepted: {sql}"),
            Verdict::Rejected { reason } => println!("rejected: {reason}"),
        }
    }
}

fn render_table(columns: &[String], rows: &[Vec<serde_json::Value>]) -> String {
    // figure out column widths, capped so things don't get crazy
    let mut widths: Vec<usize> = columns.iter().map(|c| c.chars().count()).collect();
    for row in rows {
        for (i, val) in row.iter().enumerate().take(widths.len()) {
            widths[i] = widths[i].max(format_value(val).chars().count());
        }
    }
    for w in &mut widths {
        *w = (*w).min(MAX_WIDTH);
    }

    let mut out = String::new();

    let header: Vec<String> = columns
        .iter()
        .zip(&widths)
        .map(|(c, w)| format!("{:w$}", clip(c), w = *w))
        .collect();
    out.push_str(&header.join(" | "));
    out.push('\n');

    let sep: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    out.push_str(&sep.join("-+-"));
    out.push('\n');

    for row in rows {
        let formatted: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(v, w)| format!("{:w$}", clip(&format_value(v)), w = *w))
            .collect();
        out.push_str(&formatted.join(" | "));
        out.push('\n');
    }

    out
}

fn clip(s: &str) -> String {
    if s.chars().count() > MAX_WIDTH {
        let head: String = s.chars().take(MAX_WIDTH - 3).collect();
        format!("{head}...")
    } else {
        s.to_string()
    }
}

fn format_value(val: &serde_json::Value) -> String {
    match val {
        serde_json::Value::Null => "null".to_string(),
        serde_json::Value::String(s) => s.clone(),
        _ => val.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn table_pads_columns() {
        let columns = vec!["id".to_string(), "nome".to_string()];
        let rows = vec![vec![json!(1), json!("Ana")], vec![json!(22), json!(null)]];
        assert_eq!(
            render_table(&columns, &rows),
            "id | nome\n---+-----\n1  | Ana \n22 | null\n"
        );
    }

    #[test]
    fn long_values_are_clipped() {
        let long = "x".repeat(60);
        let clipped = clip(&long);
        assert_eq!(clipped.chars().count(), MAX_WIDTH);
        assert!(clipped.ends_with("..."));
    }
}

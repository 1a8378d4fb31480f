// database connection and query execution
// supports postgres, sqlite, and mysql

use crate::Error;
use serde::Serialize;
use sqlx::{AnyPool, Column, Executor, Row, any::AnyPoolOptions};
use tracing::{debug, info};

pub struct Db {
    pool: AnyPool,
    dialect: Dialect,
    read_only: bool,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
    pub row_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    Sqlite,
    Mysql,
}

impl Dialect {
    // figure out dialect from connection string
    pub fn from_url(url: &str) -> Self {
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            Dialect::Postgres
        } else if url.starts_with("mysql://") || url.starts_with("mariadb://") {
            Dialect::Mysql
        } else {
            Dialect::Sqlite
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Dialect::Postgres => "postgres",
            Dialect::Sqlite => "sqlite",
            Dialect::Mysql => "mysql",
        }
    }

    // session setting that makes every later statement on the connection read-only
    fn read_only_statement(self) -> &'static str {
        match self {
            Dialect::Postgres => "SET SESSION CHARACTERISTICS AS TRANSACTION READ ONLY",
            Dialect::Sqlite => "PRAGMA query_only = ON",
            Dialect::Mysql => "SET SESSION TRANSACTION READ ONLY",
        }
    }
}

impl Db {
    /// Read-write connection, for seeding and administration.
    pub async fn connect(url: &str) -> Result<Self, Error> {
        Self::open(url, false).await
    }

    /// Connection whose sessions refuse writes, used to run generated sql.
    pub async fn connect_read_only(url: &str) -> Result<Self, Error> {
        Self::open(url, true).await
    }

    async fn open(url: &str, read_only: bool) -> Result<Self, Error> {
        sqlx::any::install_default_drivers();

        let dialect = Dialect::from_url(url);

        let mut options = AnyPoolOptions::new().max_connections(5);
        if read_only {
            let statement = dialect.read_only_statement();
            options = options.after_connect(move |conn, _meta| {
                Box::pin(async move {
                    conn.execute(statement).await?;
                    Ok(())
                })
            });
        }

        let pool = options.connect(url).await?;
        info!(dialect = dialect.name(), read_only, "connected to database");

        Ok(Self {
            pool,
            dialect,
            read_only,
        })
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    // markdown table/column listing handed to the model as context
    pub async fn schema(&self) -> Result<String, Error> {
        let tables = match self.dialect {
            Dialect::Postgres => self.postgres_schema().await?,
            Dialect::Sqlite => self.sqlite_schema().await?,
            Dialect::Mysql => self.mysql_schema().await?,
        };
        Ok(format_schema(&tables))
    }

    async fn postgres_schema(&self) -> Result<Vec<TableInfo>, Error> {
        let rows: Vec<(String, String, String)> = sqlx::query_as(
            r#"SELECT table_name::text, column_name::text, data_type::text
               FROM information_schema.columns
               WHERE table_schema = 'public'
               ORDER BY table_name, ordinal_position"#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(group_columns(rows))
    }

    async fn sqlite_schema(&self) -> Result<Vec<TableInfo>, Error> {
        let names: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut tables = Vec::new();
        for (name,) in names {
            let escaped = name.replace('"', "\"\"");

            // cid, name, type, notnull, dflt_value, pk
            let query = format!("PRAGMA table_info(\"{escaped}\")");
            let cols: Vec<(i64, String, String, i64, Option<String>, i64)> =
                sqlx::query_as(&query).fetch_all(&self.pool).await?;

            // id, seq, table, from, to, on_update, on_delete, match
            let query = format!("PRAGMA foreign_key_list(\"{escaped}\")");
            let fks: Vec<(i64, i64, String, String, Option<String>, String, String, String)> =
                sqlx::query_as(&query).fetch_all(&self.pool).await?;

            tables.push(TableInfo {
                name,
                columns: cols
                    .into_iter()
                    .map(|(_, name, dtype, notnull, _, pk)| ColumnInfo {
                        name,
                        dtype: if dtype.is_empty() { "TEXT".to_string() } else { dtype },
                        primary_key: pk > 0,
                        not_null: notnull == 1,
                    })
                    .collect(),
                relations: fks
                    .into_iter()
                    .map(|(_, _, target, from, to, _, _, _)| {
                        format!("{from} -> {target}({})", to.as_deref().unwrap_or("?"))
                    })
                    .collect(),
            });
        }

        Ok(tables)
    }

    async fn mysql_schema(&self) -> Result<Vec<TableInfo>, Error> {
        let rows: Vec<(String, String, String)> = sqlx::query_as(
            r#"SELECT table_name, column_name, data_type
               FROM information_schema.columns
               WHERE table_schema = DATABASE()
               ORDER BY table_name, ordinal_position"#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(group_columns(rows))
    }

    // run the sql and return results as json
    pub async fn execute(&self, sql: &str) -> Result<QueryResult, Error> {
        debug!(dialect = self.dialect.name(), "executing query");
        let rows = sqlx::query(sql).fetch_all(&self.pool).await?;

        if rows.is_empty() {
            return Ok(QueryResult {
                columns: vec![],
                rows: vec![],
                row_count: 0,
            });
        }

        let columns: Vec<String> = rows[0]
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();

        let json_rows: Vec<Vec<serde_json::Value>> = rows
            .iter()
            .map(|row| {
                (0..columns.len())
                    .map(|i| row_value_to_json(row, i))
                    .collect()
            })
            .collect();

        let row_count = json_rows.len();

        Ok(QueryResult {
            columns,
            rows: json_rows,
            row_count,
        })
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }
}

#[derive(Debug, Clone, PartialEq)]
struct TableInfo {
    name: String,
    columns: Vec<ColumnInfo>,
    relations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
struct ColumnInfo {
    name: String,
    dtype: String,
    primary_key: bool,
    not_null: bool,
}

// information_schema rows come sorted by table, fold them into tables
fn group_columns(rows: Vec<(String, String, String)>) -> Vec<TableInfo> {
    let mut tables: Vec<TableInfo> = Vec::new();

    for (table, column, dtype) in rows {
        let column = ColumnInfo {
            name: column,
            dtype,
            primary_key: false,
            not_null: false,
        };
        match tables.last_mut() {
            Some(last) if last.name == table => last.columns.push(column),
            _ => tables.push(TableInfo {
                name: table,
                columns: vec![column],
                relations: vec![],
            }),
        }
    }

    tables
}

// turn table info into markdown the model can read
fn format_schema(tables: &[TableInfo]) -> String {
    if tables.is_empty() {
        return "/* database has no user tables */".to_string();
    }

    let mut sections = Vec::with_capacity(tables.len());
    for table in tables {
        let mut section = format!("### Table {}\n", table.name);

        let columns: Vec<String> = table
            .columns
            .iter()
            .map(|c| {
                let mut flags = Vec::new();
                if c.primary_key {
                    flags.push("PK");
                }
                if c.not_null {
                    flags.push("NOT NULL");
                }
                if flags.is_empty() {
                    format!("{} {}", c.name, c.dtype)
                } else {
                    format!("{} {} [{}]", c.name, c.dtype, flags.join(", "))
                }
            })
            .collect();

        if columns.is_empty() {
            section.push_str("Columns: (none)");
        } else {
            section.push_str(&format!("Columns: {}", columns.join(", ")));
        }

        if !table.relations.is_empty() {
            section.push_str(&format!("\nRelationships: {}", table.relations.join(", ")));
        }

        sections.push(section);
    }

    sections.join("\n\n")
}

// convert database values to json (handling type mismatches gracefully)
fn row_value_to_json(row: &sqlx::any::AnyRow, index: usize) -> serde_json::Value {
    use sqlx::ValueRef;

    // null check first
    if row.try_get_raw(index).map(|v| v.is_null()).unwrap_or(true) {
        return serde_json::Value::Null;
    }

    // try types in order of how common they are
    if let Ok(v) = row.try_get::<String, _>(index) {
        return serde_json::Value::String(v);
    }
    if let Ok(v) = row.try_get::<i64, _>(index) {
        return serde_json::Value::Number(v.into());
    }
    if let Ok(v) = row.try_get::<i32, _>(index) {
        return serde_json::Value::Number(v.into());
    }
    if let Ok(v) = row.try_get::<f64, _>(index) {
        return serde_json::Number::from_f64(v)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null);
    }
    if let Ok(v) = row.try_get::<bool, _>(index) {
        return serde_json::Value::Bool(v);
    }

    // some postgres types just don't work with the any driver
    serde_json::Value::String("<unsupported>".to_string())
}

// shared fixtures: a seeded sqlite file and a scripted model

#![allow(dead_code)]

use async_trait::async_trait;
use sqlgate::{Db, Error, LlmClient};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::TempDir;

pub struct Seeded {
    pub dir: TempDir,
    pub path: PathBuf,
}

impl Seeded {
    pub fn url(&self) -> String {
        sqlite_url(&self.path)
    }
}

pub fn sqlite_url(path: &Path) -> String {
    format!("sqlite://{}", path.display())
}

// two small tables with a foreign key between them
pub async fn seed() -> Seeded {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("erp.db");

    let db = Db::connect(&format!("{}?mode=rwc", sqlite_url(&path)))
        .await
        .unwrap();

    for stmt in [
        "CREATE TABLE cliente (id INTEGER PRIMARY KEY, nome TEXT NOT NULL, cidade TEXT)",
        "CREATE TABLE pedido (id INTEGER PRIMARY KEY, cliente_id INTEGER NOT NULL REFERENCES cliente(id), total REAL)",
        "INSERT INTO cliente (id, nome, cidade) VALUES (1, 'Ana', 'Recife'), (2, 'Bruno', 'Natal'), (3, 'Carla', NULL)",
        "INSERT INTO pedido (id, cliente_id, total) VALUES (1, 1, 10.5), (2, 3, 99.0)",
    ] {
        sqlx::query(stmt).execute(db.pool()).await.unwrap();
    }
    db.pool().close().await;

    Seeded { dir, path }
}

/// Replays replies in order; `None` stands for a transport failure.
pub struct Scripted(Mutex<Vec<Option<&'static str>>>);

impl Scripted {
    pub fn new(replies: Vec<Option<&'static str>>) -> Self {
        Self(Mutex::new(replies))
    }

    pub fn replying(reply: &'static str) -> Self {
        Self::new(vec![Some(reply)])
    }

    pub fn remaining(&self) -> usize {
        self.0.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmClient for Scripted {
    async fn complete(&self, _system: &str, _user: &str) -> Result<String, Error> {
        let next = self.0.lock().unwrap().remove(0);
        next.map(str::to_string)
            .ok_or_else(|| Error::Llm("model unavailable".to_string()))
    }
}

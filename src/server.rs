// http server mode - ask questions over an api

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::core::{AskOptions, AskResponse, LexicalGuard, LlmClient, StatementClassifier, Verdict};
use crate::{Config, Db, Error, ask, client_for};

const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

// a queryable database plus the schema text handed to the model
struct Target {
    db: Arc<Db>,
    schema: String,
}

pub struct AppState {
    config: Config,
    default: Target,
    uploads: RwLock<HashMap<String, Target>>,
    generator: Box<dyn LlmClient>,
    guard: Box<dyn StatementClassifier>,
}

impl AppState {
    pub fn new(config: Config, db: Db, schema: String, generator: Box<dyn LlmClient>) -> Self {
        Self {
            config,
            default: Target {
                db: Arc::new(db),
                schema,
            },
            uploads: RwLock::new(HashMap::new()),
            generator,
            guard: Box::new(LexicalGuard),
        }
    }

    // unknown or missing ids fall back to the default database
    async fn target(&self, db_id: Option<&str>) -> (Arc<Db>, String) {
        if let Some(id) = db_id {
            if let Some(t) = self.uploads.read().await.get(id) {
                return (t.db.clone(), t.schema.clone());
            }
            warn!(db_id = id, "unknown db_id, using default database");
        }
        (self.default.db.clone(), self.default.schema.clone())
    }
}

#[derive(Deserialize)]
struct AskRequest {
    question: String,
    #[serde(default)]
    db_id: Option<String>,
}

#[derive(Deserialize)]
struct SanitizeRequest {
    sql: String,
    #[serde(default)]
    max_rows: Option<NonZeroU32>,
}

#[derive(Deserialize)]
struct SchemaParams {
    db_id: Option<String>,
}

#[derive(Serialize)]
struct UploadResponse {
    db_id: String,
    name: String,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

type Rejected = (StatusCode, Json<serde_json::Value>);

fn detail(status: StatusCode, message: impl Into<String>) -> Rejected {
    (status, Json(serde_json::json!({ "detail": message.into() })))
}

pub struct Server;

impl Server {
    pub async fn run(config: Config, db_url: &str, host: &str, port: u16) -> Result<(), Error> {
        let db = Db::connect_read_only(db_url).await?;
        let schema = db.schema().await?;
        let generator = client_for(&config.generator)?;

        let state = Arc::new(AppState::new(config, db, schema, generator));
        let app = router(state);

        let addr = format!("{host}:{port}");
        info!("server running at http://{addr}");

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| Error::Server(e.to_string()))?;

        axum::serve(listener, app)
            .await
            .map_err(|e| Error::Server(e.to_string()))?;

        Ok(())
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/schema", get(get_schema))
        .route("/ask", post(ask_question))
        .route("/sanitize", post(sanitize_sql))
        .route("/db/upload", post(upload_db))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn get_schema(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SchemaParams>,
) -> Json<serde_json::Value> {
    let (_, schema) = state.target(params.db_id.as_deref()).await;
    Json(serde_json::json!({ "schema": schema }))
}

// expected failures still answer 200 with ok=false
async fn ask_question(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AskRequest>,
) -> Json<AskResponse> {
    let (db, schema) = state.target(req.db_id.as_deref()).await;
    let options = AskOptions {
        result_limit: state.config.result_limit,
        summarize: state.config.summarize,
    };

    Json(
        ask(
            state.generator.as_ref(),
            state.guard.as_ref(),
            &db,
            Some(&schema),
            &req.question,
            &options,
        )
        .await,
    )
}

async fn sanitize_sql(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SanitizeRequest>,
) -> Json<Verdict> {
    let max_rows = req.max_rows.unwrap_or(state.config.result_limit);
    Json(state.guard.sanitize(&req.sql, max_rows))
}

async fn upload_db(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, Rejected> {
    let field = loop {
        match multipart.next_field().await {
            Ok(Some(field)) if field.name() == Some("file") => break field,
            Ok(Some(_)) => continue,
            Ok(None) => return Err(detail(StatusCode::BAD_REQUEST, "missing file field")),
            Err(e) => return Err(detail(StatusCode::BAD_REQUEST, e.body_text())),
        }
    };

    // keep only the final path component of whatever the client claims
    let name = field
        .file_name()
        .and_then(|n| Path::new(n).file_name())
        .and_then(|n| n.to_str())
        .unwrap_or("base.db")
        .to_string();
    if !name.to_lowercase().ends_with(".db") {
        return Err(detail(StatusCode::BAD_REQUEST, "upload a .db (SQLite) file"));
    }

    let bytes = field
        .bytes()
        .await
        .map_err(|e| detail(StatusCode::BAD_REQUEST, e.body_text()))?;

    let db_id = Uuid::new_v4().simple().to_string();
    let path = state.config.upload_dir.join(format!("{db_id}_{name}"));

    let target = register(&path, &bytes).await.map_err(|e| {
        error!(error = %e, "upload failed");
        detail(StatusCode::INTERNAL_SERVER_ERROR, format!("upload failed: {e}"))
    })?;

    state.uploads.write().await.insert(db_id.clone(), target);
    info!(%db_id, %name, "database uploaded");

    Ok(Json(UploadResponse { db_id, name }))
}

// write the file and open it read-only; a non-sqlite file fails here
// and is removed again
async fn register(path: &Path, bytes: &[u8]) -> Result<Target, Error> {
    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir).await?;
    }
    tokio::fs::write(path, bytes).await?;

    match open_upload(path).await {
        Ok(target) => Ok(target),
        Err(e) => {
            if let Err(rm) = tokio::fs::remove_file(path).await {
                warn!(error = %rm, path = %path.display(), "could not remove rejected upload");
            }
            Err(Error::Upload(e.to_string()))
        }
    }
}

async fn open_upload(path: &Path) -> Result<Target, Error> {
    let db = Db::connect_read_only(&format!("sqlite://{}", path.display())).await?;
    let schema = match db.schema().await {
        Ok(schema) => schema,
        Err(e) => {
            db.pool().close().await;
            return Err(e);
        }
    };

    Ok(Target {
        db: Arc::new(db),
        schema,
    })
}

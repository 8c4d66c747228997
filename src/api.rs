use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use tokio::spawn;
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    app_state::{AppState, Status},
    error::PipelineError,
    models::Answer,
    pipeline::PipelineInfo,
    rag::EvaluationReport,
};

type ApiError = (StatusCode, Json<serde_json::Value>);

// --- Payloads ---

#[derive(Debug, Default, Deserialize)]
pub struct SetupPayload {
    #[serde(default)]
    max_articles: Option<usize>,
    #[serde(default)]
    force_rescrape: bool,
    #[serde(default)]
    force_recreate_index: bool,
}

#[derive(Deserialize)]
pub struct AskPayload {
    question: String,
}

// --- Router ---

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/api/setup", post(setup_handler))
        .route("/api/ask", post(ask_handler))
        .route("/api/evaluate", post(evaluate_handler))
        .route("/api/status", get(status_handler))
        .route("/api/info", get(info_handler))
        .route("/api/shutdown", post(shutdown_handler))
        .with_state(app_state)
}

// --- Handlers ---

#[axum::debug_handler]
async fn setup_handler(
    State(state): State<AppState>,
    Json(payload): Json<SetupPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let job_id = Uuid::new_v4().to_string();
    if !state.try_begin(&job_id, "Configurando el pipeline...") {
        return Err(busy());
    }
    info!("Setup {job_id} lanzado: {payload:?}");

    let task_state = state.clone();
    let task_job = job_id.clone();
    spawn(async move {
        // El setup corre en su propia tarea: si hace panic, el JoinHandle lo
        // devuelve como error y el estado se libera igualmente.
        let pipeline = task_state.pipeline.clone();
        let job = spawn(async move {
            let mut pipeline = pipeline.write().await;
            pipeline
                .setup(
                    payload.max_articles,
                    payload.force_rescrape,
                    payload.force_recreate_index,
                )
                .await
        });
        let ok = match job.await {
            Ok(ok) => ok,
            Err(e) => {
                error!("Setup {task_job} abortado: {e}");
                false
            }
        };

        task_state.update_status(|status| {
            status.is_busy = false;
            status.message = if ok {
                "¡Pipeline listo!".to_string()
            } else {
                "Error en el setup; revisa los logs.".to_string()
            };
        });
        if !ok {
            error!("Setup {task_job} fallido");
        }
    });

    Ok((StatusCode::ACCEPTED, Json(json!({ "job_id": job_id }))))
}

#[axum::debug_handler]
async fn ask_handler(
    State(state): State<AppState>,
    Json(payload): Json<AskPayload>,
) -> Result<Json<Answer>, ApiError> {
    if state.status().is_busy {
        return Err(busy());
    }
    let pipeline = state.pipeline.read().await;
    pipeline
        .ask(&payload.question)
        .await
        .map(Json)
        .map_err(pipeline_error)
}

#[axum::debug_handler]
async fn evaluate_handler(
    State(state): State<AppState>,
) -> Result<Json<EvaluationReport>, ApiError> {
    if state.status().is_busy {
        return Err(busy());
    }
    let pipeline = state.pipeline.read().await;
    pipeline
        .run_evaluation()
        .await
        .map(Json)
        .map_err(pipeline_error)
}

#[axum::debug_handler]
async fn status_handler(State(state): State<AppState>) -> Json<Status> {
    Json(state.status())
}

#[axum::debug_handler]
async fn info_handler(State(state): State<AppState>) -> Result<Json<PipelineInfo>, ApiError> {
    // Durante un setup el pipeline está bloqueado en escritura.
    let pipeline = state.pipeline.try_read().map_err(|_| busy())?;
    Ok(Json(pipeline.get_info().await))
}

#[axum::debug_handler]
async fn shutdown_handler(State(state): State<AppState>) -> impl IntoResponse {
    info!("Petición de apagado recibida.");
    state.request_shutdown();
    StatusCode::OK
}

// --- Utilidades ---

fn busy() -> ApiError {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({"error": "El pipeline está ocupado; inténtalo de nuevo en unos segundos."})),
    )
}

fn pipeline_error(e: PipelineError) -> ApiError {
    let status = match e {
        PipelineError::NotInitialized => StatusCode::CONFLICT,
        PipelineError::EmptyQuestion => StatusCode::BAD_REQUEST,
    };
    (status, Json(json!({ "error": e.to_string() })))
}

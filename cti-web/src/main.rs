//! Servidor Axum que expõe o codec BIOUL de CTI em lote (JSON)

use std::env::VarError;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use cti_core::{
    batch::{align_batch, decode_batch, encode_batch, merge_batch, BatchReport},
    records::{AlignRecord, TokenizedRecord},
    CodecConfig, PredictedToken, TagVocabulary,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Estado compartilhado da aplicação: configuração e vocabulário, somente leitura
struct AppState {
    config: CodecConfig,
    vocab: TagVocabulary,
}

impl AppState {
    fn from_config(config: CodecConfig) -> cti_core::Result<Self> {
        let vocab = config.vocabulary()?;
        Ok(Self { config, vocab })
    }
}

#[derive(Deserialize)]
struct EncodeRequest {
    records: Vec<TokenizedRecord>,
}

#[derive(Deserialize)]
struct AlignRequest {
    records: Vec<AlignRecord>,
}

/// Predições de vários textos, uma lista por texto
#[derive(Deserialize)]
struct PredictionsRequest {
    predictions: Vec<Vec<PredictedToken>>,
}

#[derive(Serialize)]
struct BatchResponse<T> {
    #[serde(flatten)]
    report: BatchReport<T>,
    processing_ms: u64,
}

fn bad_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "error": message })),
    )
        .into_response()
}

/// Roda o lote fora do runtime async (Rayon é síncrono) e monta a resposta.
async fn run_blocking<T, F>(job: F) -> Response
where
    T: Serialize + Send + 'static,
    F: FnOnce() -> BatchReport<T> + Send + 'static,
{
    let start = Instant::now();
    match tokio::task::spawn_blocking(job).await {
        Ok(report) => {
            info!(
                succeeded = report.succeeded,
                failed = report.failed,
                warnings = report.warnings,
                "lote concluído"
            );
            Json(BatchResponse {
                report,
                processing_ms: start.elapsed().as_millis() as u64,
            })
            .into_response()
        }
        Err(err) => {
            error!("tarefa de lote abortada: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "falha interna no lote" })),
            )
                .into_response()
        }
    }
}

fn app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/vocabulary", get(vocabulary_handler))
        .route("/encode", post(encode_handler))
        .route("/align", post(align_handler))
        .route("/merge", post(merge_handler))
        .route("/decode", post(decode_handler))
        .layer(cors)
        .with_state(state)
}

/// Lê a configuração do arquivo JSON apontado por `config_path` (valor de
/// `CTI_CONFIG`); sem variável, usa os padrões.
fn load_config(
    config_path: Result<String, VarError>,
) -> Result<CodecConfig, Box<dyn std::error::Error>> {
    match config_path {
        Ok(path) => {
            let json = std::fs::read_to_string(&path)?;
            let config = CodecConfig::from_json_str(&json)?;
            info!("configuração carregada de {path}");
            Ok(config)
        }
        Err(VarError::NotPresent) => Ok(CodecConfig::default()),
        Err(err @ VarError::NotUnicode(_)) => Err(format!("CTI_CONFIG: {err}").into()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let loaded = load_config(std::env::var("CTI_CONFIG"))
        .and_then(|config| Ok(AppState::from_config(config)?));
    let state = match loaded {
        Ok(state) => Arc::new(state),
        Err(err) => {
            error!("configuração inválida: {err}");
            return Err(err);
        }
    };
    info!(
        labels = state.vocab.labels().len(),
        tags = state.vocab.len(),
        "vocabulário construído"
    );

    let addr = std::env::var("CTI_BIND").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("🚀 Servidor do codec CTI iniciado em http://{addr}");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Vocabulário na ordem de id (o índice em `tags` é o id)
async fn vocabulary_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.vocab.clone())
}

async fn encode_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<EncodeRequest>,
) -> Response {
    if req.records.is_empty() {
        return bad_request("lote vazio");
    }
    let policy = state.config.overlap_policy;
    run_blocking(move || encode_batch(&state.vocab, &req.records, policy)).await
}

async fn align_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AlignRequest>,
) -> Response {
    if req.records.is_empty() {
        return bad_request("lote vazio");
    }
    run_blocking(move || align_batch(&state.vocab, &req.records)).await
}

/// Funde predições já agregadas (rótulos sem prefixo)
async fn merge_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PredictionsRequest>,
) -> Response {
    if req.predictions.is_empty() {
        return bad_request("lote vazio");
    }
    let options = state.config.merge_options();
    run_blocking(move || merge_batch(&req.predictions, options)).await
}

/// Agrega predições BIOUL por token e funde o resultado
async fn decode_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PredictionsRequest>,
) -> Response {
    if req.predictions.is_empty() {
        return bad_request("lote vazio");
    }
    let options = state.config.merge_options();
    run_blocking(move || decode_batch(&req.predictions, options)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    fn test_app() -> Router {
        let state = AppState::from_config(CodecConfig::default()).unwrap();
        app(Arc::new(state))
    }

    async fn call(method: &str, uri: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = test_app().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    #[test]
    fn test_load_config_env_cases() {
        assert_eq!(load_config(Err(VarError::NotPresent)).unwrap(), CodecConfig::default());

        let raw = std::ffi::OsString::from("cti.json");
        assert!(load_config(Err(VarError::NotUnicode(raw))).is_err());

        let path = std::env::temp_dir().join(format!("cti-config-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"labels":["MALWARE"],"keep_outside":true}"#).unwrap();
        let config = load_config(Ok(path.to_string_lossy().into_owned())).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(config.labels, ["MALWARE"]);
        assert!(config.keep_outside);
    }

    #[tokio::test]
    async fn test_health_and_vocabulary() {
        let (status, body) = call("GET", "/health", serde_json::Value::Null).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");

        let (status, body) = call("GET", "/vocabulary", serde_json::Value::Null).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["tags"].as_array().unwrap().len(), 33);
        assert_eq!(body["tags"][0], "O");
        assert_eq!(body["tags"][1], "B-URL");
    }

    #[tokio::test]
    async fn test_encode_reports_per_record_counts() {
        let body = serde_json::json!({
            "records": [
                {
                    "text": "APT28 used Emotet",
                    "entities": [
                        { "start": 0, "end": 5, "label": "CTI_GROUP" },
                        { "start": 11, "end": 17, "label": "MALWARE" }
                    ],
                    "tokens": [
                        { "text": "APT", "start": 0, "end": 3 },
                        { "text": "28", "start": 3, "end": 5 },
                        { "text": "used", "start": 6, "end": 10 },
                        { "text": "Emotet", "start": 11, "end": 17 }
                    ]
                },
                {
                    "text": "Emotet",
                    "entities": [{ "start": 0, "end": 6, "label": "VIRUS" }],
                    "tokens": [{ "text": "Emotet", "start": 0, "end": 6 }]
                }
            ]
        });
        let (status, body) = call("POST", "/encode", body).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["succeeded"], 1);
        assert_eq!(body["failed"], 1);
        assert_eq!(body["records"][0]["status"], "ok");
        assert_eq!(
            body["records"][0]["output"]["ner_tags"],
            serde_json::json!(["B-CTI_GROUP", "L-CTI_GROUP", "O", "U-MALWARE"])
        );
        assert_eq!(body["records"][1]["status"], "failed");
    }

    #[tokio::test]
    async fn test_empty_batch_is_bad_request() {
        let (status, body) = call("POST", "/encode", serde_json::json!({ "records": [] })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "lote vazio");
    }

    #[tokio::test]
    async fn test_align_endpoint() {
        let body = serde_json::json!({
            "records": [{ "ner_tags": ["U-TOOL", "O"], "word_ids": [null, 0, 0, 1, null] }]
        });
        let (status, body) = call("POST", "/align", body).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body["records"][0]["output"],
            serde_json::json!([-100, 28, -100, 0, -100])
        );
    }

    #[tokio::test]
    async fn test_merge_and_decode_endpoints() {
        let merge = serde_json::json!({
            "predictions": [[
                { "label": "MALWARE", "text": "Troj", "score": 0.9, "start": 0, "end": 4 },
                { "label": "MALWARE", "text": "an", "score": 0.8, "start": 4, "end": 6 }
            ]]
        });
        let (status, body) = call("POST", "/merge", merge).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["records"][0]["output"]["entities"][0]["text"], "Trojan");

        let decode = serde_json::json!({
            "predictions": [[
                { "label": "B-MITRE_TACTIC", "text": "Credential", "score": 0.9, "start": 0, "end": 10 },
                { "label": "L-MITRE_TACTIC", "text": "Access", "score": 0.9, "start": 11, "end": 17 }
            ]]
        });
        let (status, body) = call("POST", "/decode", decode).await;
        assert_eq!(status, StatusCode::OK);
        let entity = &body["records"][0]["output"]["entities"][0];
        assert_eq!(entity["text"], "Credential Access");
        assert_eq!(entity["label"], "MITRE_TACTIC");
    }
}

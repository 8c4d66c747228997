mod common;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use common::*;
use serde_json::{json, Value};
use support_rag::{api, app_state::AppState, pipeline::Pipeline, scraper};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

async fn spawn_server(state: AppState, shutdown: oneshot::Receiver<()>) -> (SocketAddr, JoinHandle<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = api::create_router(state);
    let handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                shutdown.await.ok();
            })
            .await
            .unwrap();
    });
    (addr, handle)
}

fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

async fn wait_until_idle(http: &reqwest::Client, base: &str) -> Value {
    for _ in 0..100 {
        let status: Value = http
            .get(format!("{base}/api/status"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        if status["is_busy"] == json!(false) {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("el setup no terminó a tiempo");
}

#[tokio::test]
async fn serve_setup_ask_and_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    scraper::save_articles(&dir.path().join("articles.json"), &sample_articles())
        .await
        .unwrap();
    let pipeline = test_pipeline(
        dir.path(),
        Arc::new(MockSite::default()),
        Arc::new(HashEmbedder::new("hash-embedder")),
        Arc::new(GroundedModel),
    );

    let (tx, rx) = oneshot::channel();
    let state = AppState::new(test_config(dir.path()), pipeline, tx, "Pipeline sin inicializar.");
    let (addr, server) = spawn_server(state.clone(), rx).await;
    let base = format!("http://{addr}");
    let http = client();

    // Antes del setup.
    let res = http
        .post(format!("{base}/api/ask"))
        .json(&json!({"question": "Como funciona o Pix?"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::CONFLICT);

    let res = http
        .post(format!("{base}/api/setup"))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::ACCEPTED);
    let body: Value = res.json().await.unwrap();
    let job_id = body["job_id"].as_str().unwrap().to_string();

    let status = wait_until_idle(&http, &base).await;
    assert_eq!(status["job_id"], json!(job_id));

    let info: Value = http
        .get(format!("{base}/api/info"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(info["is_initialized"], json!(true));
    assert_eq!(info["store_type"], json!("flat"));
    assert_eq!(info["vector_store_info"]["document_count"], json!(2));

    let res = http
        .post(format!("{base}/api/ask"))
        .json(&json!({"question": "Como funciona o Pix na InfinitePay?"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::OK);
    let answer: Value = res.json().await.unwrap();
    assert!(answer["formatted_answer"]
        .as_str()
        .unwrap()
        .contains("**Fontes:**"));
    assert!(answer["sources"]
        .as_array()
        .unwrap()
        .iter()
        .any(|s| s["url"] == json!(PIX_URL)));

    let res = http
        .post(format!("{base}/api/ask"))
        .json(&json!({"question": "  "}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::BAD_REQUEST);

    let res = http
        .post(format!("{base}/api/shutdown"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::OK);

    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("el servidor no se cerró")
        .unwrap();
}

#[tokio::test]
async fn second_setup_while_busy_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = test_pipeline(
        dir.path(),
        Arc::new(MockSite::default()),
        Arc::new(HashEmbedder::new("hash-embedder")),
        Arc::new(GroundedModel),
    );
    let (tx, rx) = oneshot::channel();
    let state = AppState::new(test_config(dir.path()), pipeline, tx, "listo");

    assert!(state.try_begin("job-1", "ocupado"));
    let (addr, _server) = spawn_server(state.clone(), rx).await;
    let base = format!("http://{addr}");
    let http = client();

    let res = http
        .post(format!("{base}/api/setup"))
        .json(&json!({"force_rescrape": true}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);

    let status: Value = http
        .get(format!("{base}/api/status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["is_busy"], json!(true));
    assert_eq!(status["job_id"], json!("job-1"));

    state.request_shutdown();
}

#[tokio::test]
async fn panicking_setup_releases_busy_status() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::new(
        test_config(dir.path()),
        Arc::new(PanickingFetcher),
        Arc::new(HashEmbedder::new("hash-embedder")),
        Arc::new(GroundedModel),
    )
    .unwrap();
    let (tx, rx) = oneshot::channel();
    let state = AppState::new(test_config(dir.path()), pipeline, tx, "listo");
    let (addr, _server) = spawn_server(state.clone(), rx).await;
    let base = format!("http://{addr}");
    let http = client();

    let res = http
        .post(format!("{base}/api/setup"))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::ACCEPTED);

    let status = wait_until_idle(&http, &base).await;
    assert_eq!(status["message"], json!("Error en el setup; revisa los logs."));

    // El servidor sigue aceptando trabajo.
    let res = http
        .post(format!("{base}/api/ask"))
        .json(&json!({"question": "Como funciona o Pix?"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::CONFLICT);

    let res = http
        .post(format!("{base}/api/setup"))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::ACCEPTED);
    wait_until_idle(&http, &base).await;

    state.request_shutdown();
}

mod common;

use std::sync::Arc;

use common::*;
use support_rag::error::PipelineError;
use support_rag::rag::{EvalQuestion, DONT_KNOW};
use support_rag::scraper;

#[tokio::test]
async fn crawl_collects_each_article_once() {
    let dir = tempfile::tempdir().unwrap();
    let site = Arc::new(help_site());
    let mut pipeline = test_pipeline(
        dir.path(),
        site.clone(),
        Arc::new(HashEmbedder::new("hash-embedder")),
        Arc::new(GroundedModel),
    );

    let articles = pipeline.scrape_articles(None, false).await;

    let mut urls: Vec<&str> = articles.iter().map(|a| a.url.as_str()).collect();
    urls.sort();
    assert_eq!(urls, vec![PIX_URL, SMART_URL]);

    let fetched = site.fetched();
    assert_eq!(fetched.len(), 3, "{fetched:?}");
    assert!(fetched.iter().all(|u| u.starts_with("https://help.test/pt-BR")));

    let pix = articles.iter().find(|a| a.url == PIX_URL).unwrap();
    assert_eq!(pix.title, "Como usar o Pix");
    assert!(pix.content.contains("24 horas"));

    // El resultado queda guardado para la siguiente ejecución.
    let saved = scraper::load_articles(&dir.path().join("articles.json")).await.unwrap();
    assert_eq!(saved, articles);
}

#[tokio::test]
async fn max_articles_caps_visited_pages() {
    let dir = tempfile::tempdir().unwrap();
    let site = Arc::new(help_site());
    let mut pipeline = test_pipeline(
        dir.path(),
        site.clone(),
        Arc::new(HashEmbedder::new("hash-embedder")),
        Arc::new(GroundedModel),
    );

    let articles = pipeline.scrape_articles(Some(2), true).await;

    assert_eq!(site.fetched().len(), 2);
    assert_eq!(articles.len(), 1);
    assert_eq!(articles[0].url, PIX_URL);
}

#[tokio::test]
async fn setup_reuses_existing_articles_without_fetching() {
    let dir = tempfile::tempdir().unwrap();
    scraper::save_articles(&dir.path().join("articles.json"), &sample_articles())
        .await
        .unwrap();

    let site = Arc::new(MockSite::default());
    let mut pipeline = test_pipeline(
        dir.path(),
        site.clone(),
        Arc::new(HashEmbedder::new("hash-embedder")),
        Arc::new(GroundedModel),
    );

    assert!(pipeline.setup(None, false, false).await);
    assert!(pipeline.is_initialized());
    assert!(site.fetched().is_empty());
}

#[tokio::test]
async fn setup_from_crawl_answers_with_citations() {
    let dir = tempfile::tempdir().unwrap();
    let mut pipeline = test_pipeline(
        dir.path(),
        Arc::new(help_site()),
        Arc::new(HashEmbedder::new("hash-embedder")),
        Arc::new(GroundedModel),
    );
    assert!(pipeline.init().await);

    let answer = pipeline.ask("Como fazer um PIX?").await.unwrap();

    assert!(answer.error.is_none());
    assert_ne!(answer.formatted_answer, DONT_KNOW);
    assert!(answer.sources.iter().any(|s| s.url == PIX_URL));
    assert!(answer.formatted_answer.contains("**Fontes:**"));
    assert!(answer
        .formatted_answer
        .contains(&format!("[Como usar o Pix]({PIX_URL})")));
}

#[tokio::test]
async fn unrelated_question_gets_plain_refusal() {
    let dir = tempfile::tempdir().unwrap();
    scraper::save_articles(&dir.path().join("articles.json"), &sample_articles())
        .await
        .unwrap();
    let mut pipeline = test_pipeline(
        dir.path(),
        Arc::new(MockSite::default()),
        Arc::new(HashEmbedder::new("hash-embedder")),
        Arc::new(GroundedModel),
    );
    assert!(pipeline.init().await);

    let answer = pipeline.ask("Qual é a capital da França?").await.unwrap();

    assert_eq!(answer.formatted_answer, DONT_KNOW);
    assert!(answer.sources.is_empty());
    assert!(answer.error.is_none());
}

#[tokio::test]
async fn ask_before_setup_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = test_pipeline(
        dir.path(),
        Arc::new(MockSite::default()),
        Arc::new(HashEmbedder::new("hash-embedder")),
        Arc::new(GroundedModel),
    );

    assert_eq!(
        pipeline.ask("Como funciona o Pix?").await,
        Err(PipelineError::NotInitialized)
    );
    assert!(matches!(
        pipeline.run_evaluation().await,
        Err(PipelineError::NotInitialized)
    ));
}

#[tokio::test]
async fn empty_question_is_rejected_after_setup() {
    let dir = tempfile::tempdir().unwrap();
    scraper::save_articles(&dir.path().join("articles.json"), &sample_articles())
        .await
        .unwrap();
    let mut pipeline = test_pipeline(
        dir.path(),
        Arc::new(MockSite::default()),
        Arc::new(HashEmbedder::new("hash-embedder")),
        Arc::new(GroundedModel),
    );
    assert!(pipeline.init().await);

    assert_eq!(pipeline.ask("   ").await, Err(PipelineError::EmptyQuestion));
}

#[tokio::test]
async fn model_failure_returns_fallback_answer() {
    let dir = tempfile::tempdir().unwrap();
    scraper::save_articles(&dir.path().join("articles.json"), &sample_articles())
        .await
        .unwrap();
    let mut pipeline = test_pipeline(
        dir.path(),
        Arc::new(MockSite::default()),
        Arc::new(HashEmbedder::new("hash-embedder")),
        Arc::new(FailingModel),
    );
    assert!(pipeline.init().await);

    let answer = pipeline.ask("Como funciona o Pix?").await.unwrap();

    assert!(answer.error.unwrap().contains("timeout simulado"));
    assert!(answer.sources.is_empty());
    assert!(answer.formatted_answer.contains("canais oficiais"));
}

#[tokio::test]
async fn persisted_index_is_reused_and_guarded_by_model_name() {
    let dir = tempfile::tempdir().unwrap();
    scraper::save_articles(&dir.path().join("articles.json"), &sample_articles())
        .await
        .unwrap();

    let first = Arc::new(HashEmbedder::new("hash-embedder"));
    let mut pipeline = test_pipeline(
        dir.path(),
        Arc::new(MockSite::default()),
        first.clone(),
        Arc::new(GroundedModel),
    );
    assert!(pipeline.init().await);
    assert_eq!(first.calls(), 1);

    // Mismo modelo: se carga el índice sin volver a embeber nada.
    let second = Arc::new(HashEmbedder::new("hash-embedder"));
    let mut reloaded = test_pipeline(
        dir.path(),
        Arc::new(MockSite::default()),
        second.clone(),
        Arc::new(GroundedModel),
    );
    assert!(reloaded.init().await);
    assert_eq!(second.calls(), 0);

    let info = reloaded.get_info().await;
    assert!(info.is_initialized);
    assert!(info.vector_store_info.loaded);

    // Modelo distinto: el setup se niega salvo que se fuerce la recreación.
    let other = Arc::new(HashEmbedder::new("other-embedder"));
    let mut mismatched = test_pipeline(
        dir.path(),
        Arc::new(MockSite::default()),
        other.clone(),
        Arc::new(GroundedModel),
    );
    assert!(!mismatched.init().await);
    assert!(!mismatched.is_initialized());

    assert!(mismatched.setup(None, false, true).await);
    assert_eq!(other.calls(), 1);
}

#[tokio::test]
async fn evaluation_reports_metrics() {
    let dir = tempfile::tempdir().unwrap();
    scraper::save_articles(&dir.path().join("articles.json"), &sample_articles())
        .await
        .unwrap();
    let mut pipeline = test_pipeline(
        dir.path(),
        Arc::new(MockSite::default()),
        Arc::new(HashEmbedder::new("hash-embedder")),
        Arc::new(GroundedModel),
    );
    assert!(pipeline.init().await);

    let report = pipeline.run_evaluation().await.unwrap();
    assert_eq!(report.metrics.total_questions, 8);
    assert_eq!(report.results.len(), 8);
    assert_eq!(report.metrics.error_rate, 0.0);

    let report = pipeline
        .evaluate(&[
            EvalQuestion {
                question: "Como funciona o Pix?".to_string(),
                expected_sources: vec!["1-pix".to_string()],
            },
            EvalQuestion::new("Qual é a capital da França?"),
        ])
        .await
        .unwrap();

    assert_eq!(report.results[0].source_coverage, 1.0);
    assert_eq!(report.results[1].sources_found, 0);
    assert_eq!(report.metrics.avg_source_coverage, 0.5);
    assert_eq!(report.metrics.avg_sources_per_question, 1.0);
}

#[tokio::test]
async fn shutdown_requires_new_setup() {
    let dir = tempfile::tempdir().unwrap();
    scraper::save_articles(&dir.path().join("articles.json"), &sample_articles())
        .await
        .unwrap();
    let mut pipeline = test_pipeline(
        dir.path(),
        Arc::new(MockSite::default()),
        Arc::new(HashEmbedder::new("hash-embedder")),
        Arc::new(GroundedModel),
    );
    assert!(pipeline.init().await);

    pipeline.shutdown().await;

    assert!(!pipeline.is_initialized());
    assert_eq!(
        pipeline.ask("Como funciona o Pix?").await,
        Err(PipelineError::NotInitialized)
    );
}

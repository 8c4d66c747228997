//! Orquestador: scrape -> chunks -> índice -> cadena QA.
//!
//! `setup` es idempotente por defecto: reutiliza el fichero de artículos y el
//! índice persistido salvo que se fuerce lo contrario. Cada etapa que se queda
//! sin resultados corta la secuencia y `setup` devuelve `false`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::chunker::{self, DocumentProcessor};
use crate::config::{AppConfig, StoreKind};
use crate::error::{IndexError, PipelineError};
use crate::llm::{ChatModel, Embedder, LlmManager};
use crate::models::{Answer, Article, DocumentChunk};
use crate::rag::{default_eval_questions, EvalQuestion, EvaluationReport, RagChain, RagEvaluator};
use crate::scraper::{self, HttpFetcher, PageFetcher, Scraper, ScraperConfig};
use crate::vector_store::{StoreInfo, VectorStoreManager};

#[derive(Debug, Clone, Serialize)]
pub struct PipelineInfo {
    pub base_url: String,
    pub articles_file: PathBuf,
    pub vector_store_dir: PathBuf,
    pub store_type: StoreKind,
    pub is_initialized: bool,
    pub vector_store_info: StoreInfo,
}

pub struct Pipeline {
    config: AppConfig,
    scraper: Scraper,
    processor: DocumentProcessor,
    vector_manager: VectorStoreManager,
    rag_chain: RagChain,
    is_initialized: bool,
}

impl Pipeline {
    /// Construye el pipeline con sus dependencias externas inyectadas.
    pub fn new(
        config: AppConfig,
        fetcher: Arc<dyn PageFetcher>,
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn ChatModel>,
    ) -> Result<Self> {
        config.validate()?;
        let scraper = Scraper::new(ScraperConfig::from_app_config(&config)?, fetcher);
        let processor = DocumentProcessor::new(config.chunk_size, config.chunk_overlap)?;
        let vector_manager = VectorStoreManager::from_config(&config, embedder);
        let rag_chain = RagChain::new(llm, config.llm_temperature, config.support_brand.clone());

        Ok(Self {
            config,
            scraper,
            processor,
            vector_manager,
            rag_chain,
            is_initialized: false,
        })
    }

    /// Pipeline de producción: HTTP real y OpenAI vía Rig.
    pub fn from_config(config: AppConfig) -> Result<Self> {
        let llm = Arc::new(LlmManager::from_config(&config));
        let fetcher = Arc::new(HttpFetcher::new()?);
        Self::new(config, fetcher, llm.clone(), llm)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn is_initialized(&self) -> bool {
        self.is_initialized
    }

    /// Artículos del fichero si existen (y no se fuerza), o un crawl nuevo.
    pub async fn scrape_articles(
        &mut self,
        max_articles: Option<usize>,
        force_rescrape: bool,
    ) -> Vec<Article> {
        let path = self.config.articles_file.clone();
        if !force_rescrape {
            match scraper::load_articles(&path).await {
                Ok(articles) if !articles.is_empty() => {
                    info!("Reutilizando {} artículos de {}", articles.len(), path.display());
                    return articles;
                }
                Ok(_) => {}
                Err(e) => warn!("No se pudieron cargar los artículos existentes: {e:#}"),
            }
        }

        let max_pages = max_articles.unwrap_or(self.config.crawl_max_pages);
        info!("Iniciando scraping de artículos...");
        let articles = self.scraper.crawl(max_pages, self.config.crawl_delay).await;

        if articles.is_empty() {
            warn!("No se extrajo ningún artículo");
        } else if let Err(e) = scraper::save_articles(&path, &articles).await {
            error!("No se pudieron guardar los artículos: {e:#}");
        }
        articles
    }

    pub fn process_documents(&self, articles: &[Article]) -> Vec<DocumentChunk> {
        let chunks = self.processor.process(articles);
        if let Some(stats) = chunker::stats(&chunks) {
            info!(
                "Chunks: {} de {} fuentes, {} tokens (media {:.1}, min {}, max {})",
                stats.total_chunks,
                stats.unique_sources,
                stats.total_tokens,
                stats.avg_tokens_per_chunk,
                stats.min_tokens,
                stats.max_tokens
            );
        }
        chunks
    }

    /// Carga el índice existente o lo construye a partir de `chunks`.
    pub async fn create_vector_store(&mut self, chunks: &[DocumentChunk], force_recreate: bool) -> bool {
        if !force_recreate {
            match self.vector_manager.load().await {
                Ok(Some(_)) => {
                    info!("Índice vectorial existente cargado");
                    return true;
                }
                Ok(None) => info!("No hay índice previo; se creará uno nuevo"),
                Err(e) => {
                    if let Some(IndexError::EmbeddingModelMismatch { .. }) =
                        e.downcast_ref::<IndexError>()
                    {
                        error!("{e}. Usa --force-recreate-index para reconstruirlo");
                        return false;
                    }
                    warn!("No se pudo cargar el índice existente ({e:#}); se creará uno nuevo");
                }
            }
        }

        if chunks.is_empty() {
            error!("No hay documentos para crear el índice vectorial");
            return false;
        }

        match self.rebuild_index(chunks).await {
            Ok(()) => {
                info!("Índice vectorial creado y guardado");
                true
            }
            Err(e) => {
                error!("Error creando el índice vectorial: {e:#}");
                false
            }
        }
    }

    async fn rebuild_index(&mut self, chunks: &[DocumentChunk]) -> Result<()> {
        self.vector_manager.build(chunks).await?;
        self.vector_manager.save().await
    }

    pub fn initialize_rag_chain(&mut self) -> bool {
        match self.rag_chain.setup_qa_chain(&self.vector_manager) {
            Ok(()) => {
                self.is_initialized = true;
                true
            }
            Err(e) => {
                error!("Error inicializando la cadena RAG: {e:#}");
                false
            }
        }
    }

    pub async fn setup(
        &mut self,
        max_articles: Option<usize>,
        force_rescrape: bool,
        force_recreate_vector_store: bool,
    ) -> bool {
        info!("Configurando el pipeline RAG de {}...", self.config.support_brand);

        let articles = self.scrape_articles(max_articles, force_rescrape).await;
        if articles.is_empty() {
            error!("No hay artículos disponibles");
            return false;
        }

        let chunks = self.process_documents(&articles);
        if chunks.is_empty() {
            error!("No se generó ningún chunk");
            return false;
        }

        if !self.create_vector_store(&chunks, force_recreate_vector_store).await {
            error!("No se pudo preparar el índice vectorial");
            return false;
        }

        if !self.initialize_rag_chain() {
            return false;
        }

        info!("Pipeline listo");
        true
    }

    /// Arranque por defecto: reutiliza todo lo persistido.
    pub async fn init(&mut self) -> bool {
        self.setup(None, false, false).await
    }

    pub async fn ask(&self, question: &str) -> Result<Answer, PipelineError> {
        if !self.is_initialized {
            return Err(PipelineError::NotInitialized);
        }
        self.rag_chain.ask(question).await
    }

    pub async fn run_evaluation(&self) -> Result<EvaluationReport, PipelineError> {
        self.evaluate(&default_eval_questions()).await
    }

    pub async fn evaluate(
        &self,
        questions: &[EvalQuestion],
    ) -> Result<EvaluationReport, PipelineError> {
        if !self.is_initialized {
            return Err(PipelineError::NotInitialized);
        }
        RagEvaluator::new(&self.rag_chain)
            .evaluate_questions(questions)
            .await
    }

    pub async fn get_info(&self) -> PipelineInfo {
        PipelineInfo {
            base_url: self.scraper.base_url().to_string(),
            articles_file: self.config.articles_file.clone(),
            vector_store_dir: self.config.vector_store_dir.clone(),
            store_type: self.vector_manager.store_kind(),
            is_initialized: self.is_initialized,
            vector_store_info: self.vector_manager.get_store_info().await,
        }
    }

    /// Suelta la cadena QA; el pipeline vuelve a necesitar `setup`.
    pub async fn shutdown(&mut self) {
        self.rag_chain.reset();
        self.is_initialized = false;
        info!("Pipeline cerrado");
    }
}

//! Abstracción sobre Rig para embeddings y generación.
//!
//! El resto del crate sólo ve los traits [`Embedder`] y [`ChatModel`]; la
//! implementación real ([`LlmManager`]) habla con OpenAI a través de Rig, y los
//! tests inyectan dobles deterministas.

use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rig::completion::Prompt;
use rig::embeddings::EmbeddingModel; // <- para .embed_texts
use tracing::debug;

use crate::config::AppConfig;

/// Servicio de embeddings: texto -> vector de longitud fija.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Identificador del modelo; se guarda junto al índice persistido.
    fn model_name(&self) -> &str;

    async fn embed_texts(&self, texts: Vec<String>) -> Result<Vec<Vec<f64>>>;

    async fn embed_query(&self, text: &str) -> Result<Vec<f64>> {
        self.embed_texts(vec![text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No se pudo generar embedding de la query"))
    }
}

/// Modelo generativo: prompt completo -> texto.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;

    async fn complete(&self, prompt: &str, temperature: f64) -> Result<String>;
}

/// Gestor de LLMs y embeddings sobre OpenAI.
#[derive(Debug, Clone)]
pub struct LlmManager {
    pub embedding_model: String,
    pub chat_model: String,
    pub timeout: Duration,
}

impl LlmManager {
    /// Construye el manager a partir de la configuración.
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            embedding_model: cfg.llm_embedding_model.clone(),
            chat_model: cfg.llm_chat_model.clone(),
            timeout: cfg.llm_timeout,
        }
    }
}

#[async_trait]
impl Embedder for LlmManager {
    fn model_name(&self) -> &str {
        &self.embedding_model
    }

    async fn embed_texts(&self, texts: Vec<String>) -> Result<Vec<Vec<f64>>> {
        use rig::providers::openai;
        // Trait para client.embedding_model(...)
        use rig::client::EmbeddingsClient as _;

        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let client = openai::Client::from_env();
        let embedding_model = client.embedding_model(&self.embedding_model);

        let expected = texts.len();
        debug!("Calculando {expected} embeddings con {}", self.embedding_model);
        let embeddings = tokio::time::timeout(self.timeout, embedding_model.embed_texts(texts))
            .await
            .map_err(|_| anyhow!("Timeout ({:?}) calculando embeddings", self.timeout))??;

        if embeddings.len() != expected {
            return Err(anyhow!(
                "Número de embeddings ({}) distinto al número de textos ({})",
                embeddings.len(),
                expected
            ));
        }

        Ok(embeddings.into_iter().map(|e| e.vec).collect())
    }
}

#[async_trait]
impl ChatModel for LlmManager {
    fn model_name(&self) -> &str {
        &self.chat_model
    }

    async fn complete(&self, prompt: &str, temperature: f64) -> Result<String> {
        use rig::providers::openai;
        // Trait para client.agent(...)
        use rig::client::CompletionClient as _;

        const SYSTEM_PROMPT: &str =
            "Você é um assistente de suporte. Siga rigorosamente as instruções do usuário.";

        let client = openai::Client::from_env();
        let agent = client
            .agent(&self.chat_model)
            .preamble(SYSTEM_PROMPT)
            .temperature(temperature)
            .build();

        let answer = tokio::time::timeout(self.timeout, agent.prompt(prompt))
            .await
            .map_err(|_| anyhow!("Timeout ({:?}) esperando al modelo de chat", self.timeout))??;
        Ok(answer)
    }
}

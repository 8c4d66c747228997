//! Carga y gestión de configuración del pipeline (crawler, chunker, índice vectorial y LLM).

use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::ValueEnum;
use serde::Serialize;
use url::Url;

/// Backend del índice vectorial. Se elige una sola vez al construir el pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// Índice plano en memoria, guardado explícitamente en un directorio.
    Flat,
    /// Nodos `:HelpChunk` en Neo4j; se persiste en cada escritura.
    Neo4j,
}

impl StoreKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Flat => "flat",
            Self::Neo4j => "neo4j",
        }
    }
}

impl FromStr for StoreKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "flat" => Ok(Self::Flat),
            "neo4j" => Ok(Self::Neo4j),
            other => Err(anyhow!("Tipo de vector store no soportado: {other}")),
        }
    }
}

/// Configuración completa de la aplicación.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server_addr: String,

    pub help_center_url: String,
    pub help_center_domain: String,
    pub support_brand: String,
    pub crawl_max_pages: usize,
    pub crawl_delay: Duration,

    pub articles_file: PathBuf,
    pub vector_store_dir: PathBuf,
    pub store_kind: StoreKind,

    pub neo4j_uri: String,
    pub neo4j_user: String,
    pub neo4j_password: String,

    pub llm_embedding_model: String,
    pub llm_chat_model: String,
    pub llm_temperature: f64,
    pub llm_timeout: Duration,

    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:3322".to_string(),
            help_center_url: "https://ajuda.infinitepay.io/pt-BR/".to_string(),
            help_center_domain: "ajuda.infinitepay.io".to_string(),
            support_brand: "InfinitePay".to_string(),
            crawl_max_pages: 500,
            crawl_delay: Duration::from_millis(500),
            articles_file: PathBuf::from("infinitepay_articles.json"),
            vector_store_dir: PathBuf::from("./infinitepay_vector_store"),
            store_kind: StoreKind::Flat,
            neo4j_uri: "bolt://localhost:7687".to_string(),
            neo4j_user: "neo4j".to_string(),
            neo4j_password: String::new(),
            llm_embedding_model: "text-embedding-3-large".to_string(),
            llm_chat_model: "gpt-4o-mini".to_string(),
            llm_temperature: 0.0,
            llm_timeout: Duration::from_secs(60),
            chunk_size: 1200,
            chunk_overlap: 150,
        }
    }
}

impl AppConfig {
    /// Carga la configuración desde variables de entorno (usando .env si existe).
    ///
    /// `OPENAI_API_KEY` es obligatoria; el resto tiene valores por defecto.
    pub fn from_env() -> Result<Self> {
        env::var("OPENAI_API_KEY").map_err(|_| anyhow!("Falta OPENAI_API_KEY en el entorno"))?;

        let defaults = Self::default();

        let help_center_url = env::var("HELP_CENTER_URL").unwrap_or(defaults.help_center_url);
        let parsed = Url::parse(&help_center_url)
            .map_err(|e| anyhow!("HELP_CENTER_URL inválida ({help_center_url}): {e}"))?;
        let help_center_domain = match env::var("HELP_CENTER_DOMAIN") {
            Ok(domain) => domain,
            Err(_) => parsed
                .host_str()
                .ok_or_else(|| anyhow!("HELP_CENTER_URL sin host: {help_center_url}"))?
                .to_string(),
        };

        let store_kind = match env::var("VECTOR_STORE_TYPE") {
            Ok(raw) => raw.parse()?,
            Err(_) => defaults.store_kind,
        };

        let config = Self {
            server_addr: env::var("SERVER_ADDR").unwrap_or(defaults.server_addr),
            help_center_url,
            help_center_domain,
            support_brand: env::var("SUPPORT_BRAND").unwrap_or(defaults.support_brand),
            crawl_max_pages: parse_var("CRAWL_MAX_PAGES", defaults.crawl_max_pages)?,
            crawl_delay: Duration::from_millis(parse_var("CRAWL_DELAY_MS", 500u64)?),
            articles_file: env::var("ARTICLES_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.articles_file),
            vector_store_dir: env::var("VECTOR_STORE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.vector_store_dir),
            store_kind,
            neo4j_uri: env::var("NEO4J_URI").unwrap_or(defaults.neo4j_uri),
            neo4j_user: env::var("NEO4J_USER").unwrap_or(defaults.neo4j_user),
            neo4j_password: env::var("NEO4J_PASSWORD").unwrap_or(defaults.neo4j_password),
            llm_embedding_model: env::var("LLM_EMBEDDING_MODEL")
                .unwrap_or(defaults.llm_embedding_model),
            llm_chat_model: env::var("LLM_CHAT_MODEL").unwrap_or(defaults.llm_chat_model),
            llm_temperature: parse_var("LLM_TEMPERATURE", defaults.llm_temperature)?,
            llm_timeout: Duration::from_secs(parse_var("LLM_TIMEOUT_SECS", 60u64)?),
            chunk_size: parse_var("CHUNK_SIZE", defaults.chunk_size)?,
            chunk_overlap: parse_var("CHUNK_OVERLAP", defaults.chunk_overlap)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Comprueba combinaciones que no tienen sentido antes de arrancar nada.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(anyhow!("CHUNK_SIZE debe ser mayor que 0"));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(anyhow!(
                "CHUNK_OVERLAP ({}) debe ser menor que CHUNK_SIZE ({})",
                self.chunk_overlap,
                self.chunk_size
            ));
        }
        if self.crawl_max_pages == 0 {
            return Err(anyhow!("CRAWL_MAX_PAGES debe ser mayor que 0"));
        }
        if !(0.0..=2.0).contains(&self.llm_temperature) {
            return Err(anyhow!(
                "LLM_TEMPERATURE fuera de rango: {}",
                self.llm_temperature
            ));
        }
        Ok(())
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("Valor inválido para {name} ({raw}): {e}")),
        Err(_) => Ok(default),
    }
}

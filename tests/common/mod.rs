//! Dobles deterministas compartidos por los tests de integración.
#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use support_rag::config::{AppConfig, StoreKind};
use support_rag::llm::{ChatModel, Embedder};
use support_rag::models::Article;
use support_rag::pipeline::Pipeline;
use support_rag::scraper::{FetchedPage, PageFetcher};
use url::Url;

pub const BASE_URL: &str = "https://help.test/pt-BR/";
pub const PIX_URL: &str = "https://help.test/pt-BR/articles/1-pix";
pub const SMART_URL: &str = "https://help.test/pt-BR/articles/2-maquininha";

const DIMS: usize = 256;

fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
}

/// Bolsa de palabras con hash FNV-1a sobre 256 dimensiones.
pub struct HashEmbedder {
    name: String,
    calls: AtomicUsize,
}

impl HashEmbedder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn embed(text: &str) -> Vec<f64> {
        let mut v = vec![0.0; DIMS];
        for word in words(text) {
            let mut hash: u64 = 0xcbf29ce484222325;
            for byte in word.bytes() {
                hash ^= u64::from(byte);
                hash = hash.wrapping_mul(0x100000001b3);
            }
            v[(hash % DIMS as u64) as usize] += 1.0;
        }
        v
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        &self.name
    }

    async fn embed_texts(&self, texts: Vec<String>) -> Result<Vec<Vec<f64>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| Self::embed(t)).collect())
    }
}

/// Responde con la primera línea del contexto si comparte alguna palabra
/// (de 4 letras o más) con la pregunta; si no, se niega.
pub struct GroundedModel;

#[async_trait]
impl ChatModel for GroundedModel {
    fn model_name(&self) -> &str {
        "grounded-fake"
    }

    async fn complete(&self, prompt: &str, _temperature: f64) -> Result<String> {
        let Some((_, rest)) = prompt.split_once("CONTEXTO:\n") else {
            bail!("prompt sin contexto");
        };
        let Some((context, rest)) = rest.split_once("\n\nPERGUNTA: ") else {
            bail!("prompt sin pregunta");
        };
        let question = rest.split_once("\n\nRESPOSTA:").map_or(rest, |(q, _)| q);

        let context_words: Vec<String> = words(context).collect();
        let grounded = words(question)
            .filter(|w| w.chars().count() >= 4)
            .any(|w| context_words.contains(&w));
        if !grounded {
            return Ok("Não sei.".to_string());
        }
        let first_line = context.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
        Ok(format!("Segundo a documentação: {}", first_line.trim_start_matches("# ")))
    }
}

pub struct FailingModel;

#[async_trait]
impl ChatModel for FailingModel {
    fn model_name(&self) -> &str {
        "failing-fake"
    }

    async fn complete(&self, _prompt: &str, _temperature: f64) -> Result<String> {
        bail!("timeout simulado del proveedor")
    }
}

/// Sitio en memoria; registra cada URL pedida.
#[derive(Default)]
pub struct MockSite {
    pages: HashMap<String, String>,
    fetched: Mutex<Vec<String>>,
}

impl MockSite {
    pub fn with_page(mut self, url: &str, html: String) -> Self {
        self.pages.insert(url.to_string(), html);
        self
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageFetcher for MockSite {
    async fn get(&self, url: &Url) -> Result<FetchedPage> {
        self.fetched.lock().unwrap().push(url.to_string());
        Ok(match self.pages.get(url.as_str()) {
            Some(body) => FetchedPage {
                status: 200,
                body: body.clone(),
            },
            None => FetchedPage {
                status: 404,
                body: String::new(),
            },
        })
    }
}

/// Fetcher que hace panic en la primera petición.
pub struct PanickingFetcher;

#[async_trait]
impl PageFetcher for PanickingFetcher {
    async fn get(&self, url: &Url) -> Result<FetchedPage> {
        panic!("fallo inesperado al pedir {url}");
    }
}

pub fn page(title: &str, paragraphs: &[&str], links: &[&str]) -> String {
    let body: String = paragraphs.iter().map(|p| format!("<p>{p}</p>")).collect();
    let anchors: String = links
        .iter()
        .map(|href| format!("<a href=\"{href}\">link</a>"))
        .collect();
    format!(
        "<html><head><title>InfinitePay</title></head><body><nav>{anchors}</nav>\
         <main><h1>{title}</h1>{body}</main></body></html>"
    )
}

pub const PIX_TEXT: &[&str] = &[
    "O Pix funciona 24 horas por dia, inclusive em feriados e finais de semana.",
    "Para receber um Pix na InfinitePay, compartilhe sua chave ou gere um QR Code no aplicativo.",
    "Como o Pix cai na hora, o dinheiro fica disponível imediatamente na sua conta.",
];

pub const SMART_TEXT: &[&str] = &[
    "A maquininha Smart aceita cartões de crédito e débito de todas as bandeiras.",
    "Ela imprime comprovantes e possui bateria de longa duração para vender fora de casa.",
    "Você pode parcelar vendas em até doze vezes sem custo extra de adesão.",
];

/// Inicio -> PIX (también con query y fragmento) y SMART; los artículos se enlazan entre sí.
pub fn help_site() -> MockSite {
    MockSite::default()
        .with_page(
            "https://help.test/pt-BR",
            page(
                "Central de Ajuda",
                &["Encontre respostas para as dúvidas mais comuns sobre seus produtos."],
                &[
                    "/pt-BR/articles/1-pix",
                    "/pt-BR/articles/1-pix?utm_source=home#topo",
                    "/pt-BR/articles/2-maquininha",
                    "/pt-BR/login",
                    "https://externo.test/pt-BR/articles/9",
                    "mailto:ajuda@help.test",
                ],
            ),
        )
        .with_page(
            PIX_URL,
            page("Como usar o Pix", PIX_TEXT, &["/pt-BR/articles/2-maquininha"]),
        )
        .with_page(
            SMART_URL,
            page("Maquininha Smart", SMART_TEXT, &["/pt-BR/articles/1-pix/"]),
        )
}

pub fn sample_articles() -> Vec<Article> {
    vec![
        Article {
            title: "Como usar o Pix".to_string(),
            url: PIX_URL.to_string(),
            content: PIX_TEXT.join("\n\n"),
            category: String::new(),
        },
        Article {
            title: "Maquininha Smart".to_string(),
            url: SMART_URL.to_string(),
            content: SMART_TEXT.join("\n\n"),
            category: String::new(),
        },
    ]
}

pub fn test_config(dir: &Path) -> AppConfig {
    AppConfig {
        help_center_url: BASE_URL.to_string(),
        help_center_domain: "help.test".to_string(),
        crawl_delay: Duration::ZERO,
        articles_file: dir.join("articles.json"),
        vector_store_dir: dir.join("vector_store"),
        store_kind: StoreKind::Flat,
        llm_embedding_model: "hash-embedder".to_string(),
        ..AppConfig::default()
    }
}

pub fn test_pipeline(
    dir: &Path,
    site: Arc<MockSite>,
    embedder: Arc<HashEmbedder>,
    llm: Arc<dyn ChatModel>,
) -> Pipeline {
    Pipeline::new(test_config(dir), site, embedder, llm).unwrap()
}

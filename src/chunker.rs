//! Conversión de artículos en chunks acotados en tokens.
//!
//! Los tokens se cuentan con `cl100k_base` (familia de modelos de OpenAI), que es
//! la unidad de todas las decisiones de tamaño.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{anyhow, bail, ensure, Result};
use serde::Serialize;
use text_splitter::{ChunkConfig, TextSplitter};
use tiktoken_rs::{cl100k_base, CoreBPE};
use tracing::{error, info};

use crate::models::{Article, ChunkMetadata, DocumentChunk};

/// Caracteres invisibles que aparecen en el HTML de la Central de Ajuda.
const ZERO_WIDTH: [char; 5] = ['\u{200B}', '\u{200C}', '\u{200D}', '\u{2060}', '\u{FEFF}'];

const UNTITLED: &str = "Untitled";

/// Estadísticas agregadas de un conjunto de chunks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessingStats {
    pub total_chunks: usize,
    pub unique_sources: usize,
    pub total_tokens: usize,
    pub avg_tokens_per_chunk: f64,
    pub min_tokens: usize,
    pub max_tokens: usize,
}

#[derive(Clone)]
pub struct DocumentProcessor {
    chunk_size: usize,
    chunk_overlap: usize,
    bpe: Arc<CoreBPE>,
    splitter: Arc<TextSplitter<CoreBPE>>,
}

impl DocumentProcessor {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        ensure!(chunk_size > 0, "chunk_size debe ser mayor que 0");
        ensure!(
            chunk_overlap < chunk_size,
            "chunk_overlap ({chunk_overlap}) debe ser menor que chunk_size ({chunk_size})"
        );
        let bpe = cl100k_base()
            .map_err(|e| anyhow!("No se pudo cargar el tokenizador cl100k_base: {e}"))?;
        let config = ChunkConfig::new(chunk_size)
            .with_sizer(bpe.clone())
            .with_overlap(chunk_overlap)
            .map_err(|e| anyhow!("Configuración de chunks inválida: {e}"))?;
        Ok(Self {
            chunk_size,
            chunk_overlap,
            bpe: Arc::new(bpe),
            splitter: Arc::new(TextSplitter::new(config)),
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    pub fn count_tokens(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }

    /// Texto del artículo tal y como se indexa: `# título` + cuerpo limpio.
    pub fn format_article(&self, article: &Article) -> String {
        let body = clean_text(&article.content);
        let title = article.title.trim();
        match (title.is_empty(), body.is_empty()) {
            (true, _) => body,
            (false, true) => format!("# {title}"),
            (false, false) => format!("# {title}\n\n{body}"),
        }
    }

    pub fn process_article(&self, article: &Article) -> Result<Vec<DocumentChunk>> {
        if article.url.trim().is_empty() {
            bail!("artículo sin URL");
        }
        if clean_text(&article.content).is_empty() {
            bail!("artículo sin contenido");
        }

        let formatted = self.format_article(article);
        let pieces = if self.count_tokens(&formatted) <= self.chunk_size {
            vec![formatted]
        } else {
            self.split_text(&formatted)
        };

        let title = match article.title.trim() {
            "" => UNTITLED.to_string(),
            t => t.to_string(),
        };
        let total_chunks = pieces.len();
        Ok(pieces
            .into_iter()
            .enumerate()
            .map(|(chunk_id, text)| DocumentChunk {
                metadata: ChunkMetadata {
                    source: article.url.clone(),
                    title: title.clone(),
                    chunk_id,
                    total_chunks,
                    chunk_token_count: self.count_tokens(&text),
                },
                page_content: text,
            })
            .collect())
    }

    /// Procesa todos los artículos; los que fallan se registran y se omiten.
    pub fn process(&self, articles: &[Article]) -> Vec<DocumentChunk> {
        info!("Procesando {} artículos...", articles.len());
        let mut chunks = Vec::new();
        for (i, article) in articles.iter().enumerate() {
            match self.process_article(article) {
                Ok(mut produced) => chunks.append(&mut produced),
                Err(e) => error!("Error procesando el artículo {}: {e}", article.url),
            }
            if (i + 1) % 10 == 0 {
                info!("Procesados {}/{} artículos", i + 1, articles.len());
            }
        }
        info!(
            "Creados {} chunks a partir de {} artículos",
            chunks.len(),
            articles.len()
        );
        chunks
    }

    /// Divide un texto en trozos de como mucho `chunk_size` tokens, con solape.
    ///
    /// `TextSplitter` baja por niveles semánticos (párrafo, línea, frase,
    /// palabra, carácter) hasta que cada trozo cabe.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.splitter.chunks(text).map(str::to_string).collect()
    }
}

/// Quita caracteres invisibles y colapsa espacios; los saltos de línea
/// se reducen a separadores de párrafo (`\n\n`).
pub fn clean_text(text: &str) -> String {
    let visible: String = text.chars().filter(|c| !ZERO_WIDTH.contains(c)).collect();

    let mut paragraphs: Vec<String> = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in visible.lines() {
        let words: Vec<&str> = line.split_whitespace().collect();
        if words.is_empty() {
            if !current.is_empty() {
                paragraphs.push(current.join(" "));
                current.clear();
            }
        } else {
            current.extend(words);
        }
    }
    if !current.is_empty() {
        paragraphs.push(current.join(" "));
    }
    paragraphs.join("\n\n")
}

/// `None` cuando no hay chunks.
pub fn stats(chunks: &[DocumentChunk]) -> Option<ProcessingStats> {
    if chunks.is_empty() {
        return None;
    }
    let counts: Vec<usize> = chunks
        .iter()
        .map(|c| c.metadata.chunk_token_count)
        .collect();
    let sources: HashSet<&str> = chunks.iter().map(|c| c.metadata.source.as_str()).collect();
    let total_tokens: usize = counts.iter().sum();

    Some(ProcessingStats {
        total_chunks: chunks.len(),
        unique_sources: sources.len(),
        total_tokens,
        avg_tokens_per_chunk: total_tokens as f64 / counts.len() as f64,
        min_tokens: counts.iter().copied().min().unwrap_or(0),
        max_tokens: counts.iter().copied().max().unwrap_or(0),
    })
}

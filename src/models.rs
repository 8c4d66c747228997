//! Modelos de dominio: artículos de la Central de Ajuda, chunks indexables y respuestas.

use serde::{Deserialize, Serialize};

/// Artículo extraído de una página de la Central de Ajuda.
///
/// Se persiste tal cual en el fichero JSON de artículos; `url` es la URL
/// normalizada y actúa como clave de deduplicación.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    pub url: String,
    pub content: String,
    #[serde(default)]
    pub category: String,
}

/// Procedencia y posición de un chunk dentro de su artículo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source: String,
    pub title: String,
    pub chunk_id: usize,
    pub total_chunks: usize,
    pub chunk_token_count: usize,
}

/// Trozo de texto acotado en tokens; unidad atómica del índice vectorial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub page_content: String,
    pub metadata: ChunkMetadata,
}

/// Fuente citada en una respuesta.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub url: String,
    pub title: String,
}

/// Respuesta de la cadena RAG.
///
/// `formatted_answer` es `raw_answer` más el bloque de citas; `raw_answer`
/// se conserva aparte para la evaluación.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub raw_answer: String,
    pub formatted_answer: String,
    pub sources: Vec<SourceRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Respuesta de `batch_ask`, acompañada de la pregunta original.
#[derive(Debug, Clone, Serialize)]
pub struct BatchAnswer {
    pub question: String,
    #[serde(flatten)]
    pub answer: Answer,
}

/// Vista plana de un chunk recuperado, pensada para depuración y la API.
#[derive(Debug, Clone, Serialize)]
pub struct RelevantDocument {
    pub content: String,
    pub source: String,
    pub title: String,
    pub chunk_id: usize,
    pub token_count: usize,
}

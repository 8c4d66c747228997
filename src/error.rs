//! Errores tipados que el llamador necesita distinguir.
//!
//! Los fallos operativos (red, modelo, disco) viajan como `anyhow::Error` y se
//! absorben en el borde de cada componente; estos en cambio son errores de
//! programación o de compatibilidad y se propagan.

use thiserror::Error;

/// Violaciones de precondición en la cadena de respuestas y el pipeline.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("la cadena QA no está inicializada; llama primero a setup")]
    NotInitialized,
    #[error("la pregunta no puede estar vacía")]
    EmptyQuestion,
}

/// Errores al cargar un índice persistido.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IndexError {
    #[error(
        "el índice se construyó con el modelo de embeddings '{stored}' pero la configuración usa '{configured}'; recrea el índice"
    )]
    EmbeddingModelMismatch { stored: String, configured: String },
    #[error("no hay ningún índice vectorial cargado")]
    NotLoaded,
}

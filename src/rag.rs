//! Cadena de respuestas RAG sobre el índice de la Central de Ajuda.
//!
//! Flujo por pregunta:
//!   1. MMR sobre el índice (k=5 de un pool de 10).
//!   2. Prompt en pt-BR con el contexto concatenado y la regla de "Não sei.".
//!   3. Llamada al modelo a temperatura 0.
//!   4. Citas deduplicadas por URL (máximo 5) añadidas a la respuesta.
//!
//! Los fallos de recuperación o de generación se convierten en una respuesta
//! de cortesía con `error`; llamar a `ask` sin `setup_qa_chain` es un error tipado.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::error::PipelineError;
use crate::llm::ChatModel;
use crate::models::{Answer, BatchAnswer, RelevantDocument, SourceRef};
use crate::vector_store::{Retriever, RetrievedChunk, SearchType, VectorStoreManager};

pub const DONT_KNOW: &str = "Não sei.";
pub const MAX_SOURCES: usize = 5;
pub const DEFAULT_K: usize = 5;
pub const DEFAULT_FETCH_K: usize = 10;

const UNTITLED_SOURCE: &str = "Documento sem título";

/// Batería fija de preguntas representativas para la evaluación.
pub const DEFAULT_EVAL_QUESTIONS: [&str; 8] = [
    "Como encerrar minha conta InfinitePay?",
    "Quais são as taxas das maquininhas?",
    "Como entrar em contato com o suporte?",
    "Qual o prazo para receber o dinheiro?",
    "Como fazer um PIX?",
    "Quais são os canais oficiais da InfinitePay?",
    "Como solicitar uma maquininha?",
    "Posso usar a maquininha sem internet?",
];

pub struct RagChain {
    llm: Arc<dyn ChatModel>,
    temperature: f64,
    brand: String,
    retriever: Option<Retriever>,
}

impl RagChain {
    pub fn new(llm: Arc<dyn ChatModel>, temperature: f64, brand: impl Into<String>) -> Self {
        Self {
            llm,
            temperature,
            brand: brand.into(),
            retriever: None,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.retriever.is_some()
    }

    /// Enlaza el retriever (MMR, k=5, pool de 10) sobre el índice cargado.
    pub fn setup_qa_chain(&mut self, vector_store: &VectorStoreManager) -> Result<()> {
        self.retriever =
            Some(vector_store.as_retriever(DEFAULT_K, SearchType::mmr(DEFAULT_FETCH_K))?);
        info!("Cadena QA configurada (modelo {})", self.llm.model_name());
        Ok(())
    }

    /// Deja la cadena sin retriever (estado inicial).
    pub fn reset(&mut self) {
        self.retriever = None;
    }

    pub fn build_prompt(&self, context: &str, question: &str) -> String {
        let brand = &self.brand;
        format!(
            "Você é um assistente de suporte da {brand} que responde perguntas com base EXCLUSIVAMENTE nos trechos de documentação fornecidos abaixo.

INSTRUÇÕES CRÍTICAS:
1. NUNCA invente, suponha ou adicione informações que não estejam EXPLICITAMENTE no contexto fornecido
2. Se o contexto contém informações específicas e relevantes para a pergunta, responda de forma direta e confiante
3. Se o contexto NÃO contém informações específicas sobre a pergunta, responda APENAS \"{DONT_KNOW}\"
4. NÃO adicione informações gerais, suposições ou conhecimento externo
5. NÃO mencione fontes na resposta - isso será adicionado automaticamente
6. Responda em português do Brasil, de forma clara e concisa
7. Seja profissional como um representante oficial da {brand}
8. Se as informações estão claramente disponíveis no contexto, não adicione expressões de incerteza

CONTEXTO:
{context}

PERGUNTA: {question}

RESPOSTA:
"
        )
    }

    /// Texto que ve el usuario cuando algo falla por el camino.
    pub fn fallback_answer(&self) -> String {
        format!(
            "Não encontrei essa informação na Central de Ajuda. Sugiro entrar em contato pelos canais oficiais da {}.",
            self.brand
        )
    }

    pub async fn ask(&self, question: &str) -> Result<Answer, PipelineError> {
        let retriever = self.retriever.as_ref().ok_or(PipelineError::NotInitialized)?;
        let question = question.trim();
        if question.is_empty() {
            return Err(PipelineError::EmptyQuestion);
        }

        info!("Procesando pregunta: {question}");
        match self.answer(retriever, question).await {
            Ok(answer) => {
                info!(
                    "Pregunta respondida con {} fuentes",
                    answer.sources.len()
                );
                Ok(answer)
            }
            Err(e) => {
                error!("Error procesando la pregunta: {e:#}");
                Ok(Answer {
                    raw_answer: String::new(),
                    formatted_answer: self.fallback_answer(),
                    sources: Vec::new(),
                    error: Some(format!("{e:#}")),
                })
            }
        }
    }

    async fn answer(&self, retriever: &Retriever, question: &str) -> Result<Answer> {
        let docs = retriever.get_relevant_documents(question).await?;
        let context = docs
            .iter()
            .map(|d| d.chunk.page_content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let prompt = self.build_prompt(&context, question);
        let raw = self.llm.complete(&prompt, self.temperature).await?;
        Ok(format_response(raw.trim(), &docs))
    }

    /// Como `ask`, pero una pregunta vacía se convierte en una fila con error
    /// en lugar de cortar el lote. Sólo propaga `NotInitialized`.
    async fn ask_in_batch(&self, question: &str) -> Result<Answer, PipelineError> {
        match self.ask(question).await {
            Err(PipelineError::EmptyQuestion) => {
                warn!("Pregunta vacía en el lote; se marca como error");
                Ok(Answer {
                    raw_answer: String::new(),
                    formatted_answer: self.fallback_answer(),
                    sources: Vec::new(),
                    error: Some(PipelineError::EmptyQuestion.to_string()),
                })
            }
            other => other,
        }
    }

    /// Respuestas secuenciales, una por pregunta y en el mismo orden.
    pub async fn batch_ask(&self, questions: &[String]) -> Result<Vec<BatchAnswer>, PipelineError> {
        let mut answers = Vec::with_capacity(questions.len());
        for (i, question) in questions.iter().enumerate() {
            info!("Procesando pregunta {}/{}", i + 1, questions.len());
            let answer = self.ask_in_batch(question).await?;
            answers.push(BatchAnswer {
                question: question.clone(),
                answer,
            });
        }
        Ok(answers)
    }

    /// Chunks que vería el modelo para `question`, como vista plana.
    pub async fn get_relevant_documents(
        &self,
        question: &str,
        k: usize,
    ) -> Result<Vec<RelevantDocument>> {
        let retriever = self.retriever.as_ref().ok_or(PipelineError::NotInitialized)?;
        Ok(retriever
            .get_relevant_documents_k(question, k)
            .await?
            .into_iter()
            .map(RelevantDocument::from)
            .collect())
    }
}

/// `true` si el modelo se ha negado con la frase canónica (con o sin punto final).
pub fn is_refusal(answer: &str) -> bool {
    answer
        .trim()
        .trim_end_matches('.')
        .trim()
        .to_lowercase()
        == "não sei"
}

/// Fuentes en orden de relevancia, sin URLs repetidas y como mucho [`MAX_SOURCES`].
pub fn collect_sources(docs: &[RetrievedChunk]) -> Vec<SourceRef> {
    let mut seen = HashSet::new();
    docs.iter()
        .filter_map(|d| {
            let meta = &d.chunk.metadata;
            if meta.source.is_empty() || !seen.insert(meta.source.as_str()) {
                return None;
            }
            let title = match meta.title.trim() {
                "" => UNTITLED_SOURCE.to_string(),
                t => t.to_string(),
            };
            Some(SourceRef {
                url: meta.source.clone(),
                title,
            })
        })
        .take(MAX_SOURCES)
        .collect()
}

/// Añade el bloque de citas. Una negativa se normaliza a "Não sei." sin fuentes.
pub fn format_response(raw_answer: &str, docs: &[RetrievedChunk]) -> Answer {
    if is_refusal(raw_answer) {
        return Answer {
            raw_answer: raw_answer.to_string(),
            formatted_answer: DONT_KNOW.to_string(),
            sources: Vec::new(),
            error: None,
        };
    }

    let sources = collect_sources(docs);
    let mut formatted = raw_answer.to_string();
    if !sources.is_empty() {
        formatted.push_str("\n\n**Fontes:**\n");
        for (i, source) in sources.iter().enumerate() {
            formatted.push_str(&format!("{}. [{}]({})\n", i + 1, source.title, source.url));
        }
    }

    Answer {
        raw_answer: raw_answer.to_string(),
        formatted_answer: formatted,
        sources,
        error: None,
    }
}

// ---------------------------------------------------------------------
// EVALUACIÓN
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalQuestion {
    pub question: String,
    /// Fragmentos de URL que deberían aparecer entre las fuentes.
    #[serde(default)]
    pub expected_sources: Vec<String>,
}

impl EvalQuestion {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            expected_sources: Vec::new(),
        }
    }
}

pub fn default_eval_questions() -> Vec<EvalQuestion> {
    DEFAULT_EVAL_QUESTIONS
        .iter()
        .map(|q| EvalQuestion::new(*q))
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct EvalResult {
    pub question: String,
    pub answer: String,
    pub sources_found: usize,
    pub source_coverage: f64,
    pub has_error: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvalMetrics {
    pub avg_sources_per_question: f64,
    pub avg_source_coverage: f64,
    pub error_rate: f64,
    pub total_questions: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport {
    pub results: Vec<EvalResult>,
    pub metrics: EvalMetrics,
}

pub struct RagEvaluator<'a> {
    chain: &'a RagChain,
}

impl<'a> RagEvaluator<'a> {
    pub fn new(chain: &'a RagChain) -> Self {
        Self { chain }
    }

    pub async fn evaluate_questions(
        &self,
        questions: &[EvalQuestion],
    ) -> Result<EvaluationReport, PipelineError> {
        let mut results = Vec::with_capacity(questions.len());
        for case in questions {
            let answer = self.chain.ask_in_batch(&case.question).await?;

            let source_coverage = if case.expected_sources.is_empty() {
                0.0
            } else {
                let matches = case
                    .expected_sources
                    .iter()
                    .filter(|expected| answer.sources.iter().any(|s| s.url.contains(expected.as_str())))
                    .count();
                matches as f64 / case.expected_sources.len() as f64
            };

            results.push(EvalResult {
                question: case.question.clone(),
                answer: answer.formatted_answer,
                sources_found: answer.sources.len(),
                source_coverage,
                has_error: answer.error.is_some(),
            });
        }

        let metrics = summarize(&results);
        info!(
            "Evaluación: {} preguntas, {:.2} fuentes de media, tasa de error {:.2}",
            metrics.total_questions, metrics.avg_sources_per_question, metrics.error_rate
        );
        Ok(EvaluationReport { results, metrics })
    }
}

fn summarize(results: &[EvalResult]) -> EvalMetrics {
    let total = results.len();
    if total == 0 {
        return EvalMetrics {
            avg_sources_per_question: 0.0,
            avg_source_coverage: 0.0,
            error_rate: 0.0,
            total_questions: 0,
        };
    }
    let n = total as f64;
    EvalMetrics {
        avg_sources_per_question: results.iter().map(|r| r.sources_found as f64).sum::<f64>() / n,
        avg_source_coverage: results.iter().map(|r| r.source_coverage).sum::<f64>() / n,
        error_rate: results.iter().filter(|r| r.has_error).count() as f64 / n,
        total_questions: total,
    }
}

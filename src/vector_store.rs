//! Índice vectorial de chunks con dos backends.
//!
//!   - `Flat`: vectores en memoria, guardados explícitamente como JSON en
//!     `<dir>/flat_index/` junto a un manifiesto con el modelo de embeddings.
//!   - `Neo4j`: nodos `:HelpChunk` con índice vectorial nativo; cada escritura
//!     queda persistida y el manifiesto vive en un nodo `:IndexManifest`.
//!
//! Cargar un índice construido con otro modelo de embeddings falla con
//! [`IndexError::EmbeddingModelMismatch`].

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, ensure, Context, Result};
use chrono::Utc;
use neo4rs::{query, Graph, Row};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{AppConfig, StoreKind};
use crate::error::IndexError;
use crate::llm::Embedder;
use crate::models::{ChunkMetadata, DocumentChunk, RelevantDocument};
use crate::neo4j_client;
use crate::retrieval::{cosine_similarity, mmr_select};

pub const EMBED_BATCH_SIZE: usize = 64;
pub const DEFAULT_MMR_LAMBDA: f64 = 0.5;

const FLAT_DIR: &str = "flat_index";
const INDEX_FILE: &str = "index.json";
const MANIFEST_FILE: &str = "manifest.json";

const NEO4J_INDEX_NAME: &str = "helpChunkEmbeddingIndex";
const NEO4J_MANIFEST_NAME: &str = "default";

/// Estrategia de recuperación.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SearchType {
    Similarity,
    /// MMR sobre un pool de `fetch_k` candidatos.
    Mmr { fetch_k: usize, lambda: f64 },
}

impl SearchType {
    pub fn mmr(fetch_k: usize) -> Self {
        Self::Mmr {
            fetch_k,
            lambda: DEFAULT_MMR_LAMBDA,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedChunk {
    pub chunk: DocumentChunk,
    pub embedding: Vec<f64>,
}

/// Metadatos que acompañan a un índice persistido.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexManifest {
    pub embedding_model: String,
    pub dims: usize,
    pub document_count: usize,
    pub created_at: String,
}

/// Chunk recuperado con su posición (0 = más relevante) y similitud coseno con la query.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedChunk {
    pub chunk: DocumentChunk,
    pub rank: usize,
    pub score: f64,
}

impl From<RetrievedChunk> for RelevantDocument {
    fn from(r: RetrievedChunk) -> Self {
        Self {
            content: r.chunk.page_content,
            source: r.chunk.metadata.source,
            title: r.chunk.metadata.title,
            chunk_id: r.chunk.metadata.chunk_id,
            token_count: r.chunk.metadata.chunk_token_count,
        }
    }
}

/// Recuento de documentos "best effort": nunca es un error.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DocumentCount {
    Known(usize),
    Unavailable(String),
}

impl fmt::Display for DocumentCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known(n) => write!(f, "{n}"),
            Self::Unavailable(reason) => write!(f, "no disponible ({reason})"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreInfo {
    pub loaded: bool,
    pub store_type: StoreKind,
    pub persist_directory: PathBuf,
    pub embedding_model: String,
    pub document_count: DocumentCount,
}

// ---------------------------------------------------------------------
// BACKEND PLANO
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct FlatIndex {
    entries: Vec<IndexedChunk>,
}

impl FlatIndex {
    pub fn new(entries: Vec<IndexedChunk>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dims(&self) -> Option<usize> {
        self.entries.first().map(|e| e.embedding.len())
    }

    pub fn extend(&mut self, entries: Vec<IndexedChunk>) {
        self.entries.extend(entries);
    }

    /// Los `n` vecinos más cercanos por coseno, de más a menos similar.
    pub fn nearest(&self, query: &[f64], n: usize) -> Vec<(f64, &IndexedChunk)> {
        let mut scored: Vec<(f64, &IndexedChunk)> = self
            .entries
            .iter()
            .map(|e| (cosine_similarity(query, &e.embedding), e))
            .collect();
        // sort estable: a igual score se conserva el orden de inserción
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored.truncate(n);
        scored
    }

    pub async fn save(&self, dir: &Path, embedding_model: &str) -> Result<()> {
        let dims = self
            .dims()
            .ok_or_else(|| anyhow!("No se puede guardar un índice vacío"))?;
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("No se pudo crear {}", dir.display()))?;

        let manifest = IndexManifest {
            embedding_model: embedding_model.to_string(),
            dims,
            document_count: self.len(),
            created_at: Utc::now().to_rfc3339(),
        };

        write_atomic(&dir.join(INDEX_FILE), &serde_json::to_vec(&self.entries)?).await?;
        // El manifiesto va al final: si existe, el índice está completo.
        write_atomic(
            &dir.join(MANIFEST_FILE),
            &serde_json::to_vec_pretty(&manifest)?,
        )
        .await?;
        Ok(())
    }

    /// `Ok(None)` si no hay nada guardado en `dir`.
    pub async fn load(dir: &Path) -> Result<Option<(Self, IndexManifest)>> {
        let manifest_path = dir.join(MANIFEST_FILE);
        let raw_manifest = match tokio::fs::read(&manifest_path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("No se pudo leer {}", manifest_path.display()))
            }
        };
        let manifest: IndexManifest = serde_json::from_slice(&raw_manifest)
            .with_context(|| format!("Manifiesto corrupto en {}", manifest_path.display()))?;

        let index_path = dir.join(INDEX_FILE);
        let raw_index = tokio::fs::read(&index_path)
            .await
            .with_context(|| format!("No se pudo leer {}", index_path.display()))?;
        let entries: Vec<IndexedChunk> = serde_json::from_slice(&raw_index)
            .with_context(|| format!("Índice corrupto en {}", index_path.display()))?;

        ensure!(
            entries.iter().all(|e| e.embedding.len() == manifest.dims),
            "El índice contiene vectores con dimensión distinta de {}",
            manifest.dims
        );
        Ok(Some((Self::new(entries), manifest)))
    }
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp = OsString::from(path.as_os_str());
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    tokio::fs::write(&tmp, bytes)
        .await
        .with_context(|| format!("No se pudo escribir {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("No se pudo renombrar a {}", path.display()))?;
    Ok(())
}

// ---------------------------------------------------------------------
// BACKEND NEO4J
// ---------------------------------------------------------------------

#[derive(Clone)]
pub struct Neo4jIndex {
    graph: Arc<Graph>,
}

impl Neo4jIndex {
    pub fn new(graph: Arc<Graph>) -> Self {
        Self { graph }
    }

    /// Borra los chunks existentes y recrea el índice vectorial con `dims` dimensiones.
    pub async fn reset(&self, dims: usize, embedding_model: &str) -> Result<()> {
        neo4j_client::ensure_schema(&self.graph).await?;
        self.graph
            .run(query("MATCH (c:HelpChunk) DETACH DELETE c"))
            .await?;
        self.graph
            .run(query(&format!("DROP INDEX {NEO4J_INDEX_NAME} IF EXISTS")))
            .await?;

        let cypher = format!(
            "\
CREATE VECTOR INDEX {NEO4J_INDEX_NAME}
FOR (c:HelpChunk)
ON (c.embedding)
OPTIONS {{
  indexConfig: {{
    `vector.dimensions`: {dims},
    `vector.similarity_function`: 'cosine'
  }}
}}"
        );
        self.graph.run(query(&cypher)).await?;
        self.graph.run(query("CALL db.awaitIndexes()")).await?;
        info!("Índice vectorial '{NEO4J_INDEX_NAME}' creado ({dims} dimensiones).");

        self.graph
            .run(
                query(
                    "MERGE (m:IndexManifest {name: $name})
                     SET m.embedding_model = $model, m.dims = $dims, m.created_at = $created_at",
                )
                .param("name", NEO4J_MANIFEST_NAME)
                .param("model", embedding_model)
                .param("dims", dims as i64)
                .param("created_at", Utc::now().to_rfc3339()),
            )
            .await?;
        Ok(())
    }

    pub async fn insert(&self, entries: &[IndexedChunk]) -> Result<()> {
        for entry in entries {
            let meta = &entry.chunk.metadata;
            self.graph
                .run(
                    query(
                        "MERGE (c:HelpChunk {id: $id})
                         SET c.text = $text, c.source = $source, c.title = $title,
                             c.chunk_id = $chunk_id, c.total_chunks = $total_chunks,
                             c.token_count = $token_count, c.embedding = $embedding",
                    )
                    .param("id", format!("{}#{}", meta.source, meta.chunk_id))
                    .param("text", entry.chunk.page_content.clone())
                    .param("source", meta.source.clone())
                    .param("title", meta.title.clone())
                    .param("chunk_id", meta.chunk_id as i64)
                    .param("total_chunks", meta.total_chunks as i64)
                    .param("token_count", meta.chunk_token_count as i64)
                    .param("embedding", entry.embedding.clone()),
                )
                .await?;
        }
        Ok(())
    }

    pub async fn count(&self) -> Result<usize> {
        let mut cursor = self
            .graph
            .execute(query("MATCH (c:HelpChunk) RETURN count(c) AS n"))
            .await?;
        let row = cursor
            .next()
            .await?
            .ok_or_else(|| anyhow!("count(c) sin resultado"))?;
        let n: i64 = row
            .get("n")
            .ok_or_else(|| anyhow!("Falta campo 'n' en resultado de Neo4j"))?;
        Ok(n.max(0) as usize)
    }

    pub async fn manifest(&self) -> Result<Option<IndexManifest>> {
        let mut cursor = self
            .graph
            .execute(
                query(
                    "MATCH (m:IndexManifest {name: $name})
                     RETURN m.embedding_model AS model, m.dims AS dims, m.created_at AS created_at",
                )
                .param("name", NEO4J_MANIFEST_NAME),
            )
            .await?;
        let Some(row) = cursor.next().await? else {
            return Ok(None);
        };
        let embedding_model: String = row
            .get("model")
            .ok_or_else(|| anyhow!("Falta campo 'model' en el manifiesto"))?;
        let dims: i64 = row
            .get("dims")
            .ok_or_else(|| anyhow!("Falta campo 'dims' en el manifiesto"))?;
        let created_at: String = row.get("created_at").unwrap_or_default();

        Ok(Some(IndexManifest {
            embedding_model,
            dims: dims.max(0) as usize,
            document_count: self.count().await?,
            created_at,
        }))
    }

    pub async fn nearest(&self, query_vec: &[f64], n: usize) -> Result<Vec<(f64, IndexedChunk)>> {
        let mut cursor = self
            .graph
            .execute(
                query(
                    "CALL db.index.vector.queryNodes($index_name, $k, $embedding)
                     YIELD node, score
                     RETURN node.text AS text, node.source AS source, node.title AS title,
                            node.chunk_id AS chunk_id, node.total_chunks AS total_chunks,
                            node.token_count AS token_count, node.embedding AS embedding
                     ORDER BY score DESC",
                )
                .param("index_name", NEO4J_INDEX_NAME)
                .param("k", n as i64)
                .param("embedding", query_vec.to_vec()),
            )
            .await?;

        let mut output = Vec::new();
        while let Some(row) = cursor.next().await? {
            let entry = row_to_entry(&row)?;
            // La puntuación de Neo4j está reescalada a [0, 1]; se usa el coseno real.
            let score = cosine_similarity(query_vec, &entry.embedding);
            output.push((score, entry));
        }
        Ok(output)
    }
}

fn row_to_entry(row: &Row) -> Result<IndexedChunk> {
    let text: String = row
        .get("text")
        .ok_or_else(|| anyhow!("Falta campo 'text' en resultado de Neo4j"))?;
    let source: String = row
        .get("source")
        .ok_or_else(|| anyhow!("Falta campo 'source' en resultado de Neo4j"))?;
    let title: String = row.get("title").unwrap_or_default();
    let chunk_id: i64 = row.get("chunk_id").unwrap_or_default();
    let total_chunks: i64 = row.get("total_chunks").unwrap_or(1);
    let token_count: i64 = row.get("token_count").unwrap_or_default();
    let embedding: Vec<f64> = row
        .get("embedding")
        .ok_or_else(|| anyhow!("Falta campo 'embedding' en resultado de Neo4j"))?;

    Ok(IndexedChunk {
        chunk: DocumentChunk {
            page_content: text,
            metadata: ChunkMetadata {
                source,
                title,
                chunk_id: chunk_id.max(0) as usize,
                total_chunks: total_chunks.max(1) as usize,
                chunk_token_count: token_count.max(0) as usize,
            },
        },
        embedding,
    })
}

// ---------------------------------------------------------------------
// ÍNDICE + RECUPERACIÓN
// ---------------------------------------------------------------------

/// Backend concreto, elegido una vez al construir el manager.
#[derive(Clone)]
pub enum VectorIndex {
    Flat(FlatIndex),
    Neo4j(Neo4jIndex),
}

impl VectorIndex {
    async fn nearest(&self, query_vec: &[f64], n: usize) -> Result<Vec<(f64, IndexedChunk)>> {
        match self {
            Self::Flat(index) => Ok(index
                .nearest(query_vec, n)
                .into_iter()
                .map(|(score, entry)| (score, entry.clone()))
                .collect()),
            Self::Neo4j(index) => index.nearest(query_vec, n).await,
        }
    }

    async fn document_count(&self) -> DocumentCount {
        match self {
            Self::Flat(index) => DocumentCount::Known(index.len()),
            Self::Neo4j(index) => match index.count().await {
                Ok(n) => DocumentCount::Known(n),
                Err(e) => DocumentCount::Unavailable(e.to_string()),
            },
        }
    }
}

async fn search(
    index: &VectorIndex,
    embedder: &dyn Embedder,
    question: &str,
    k: usize,
    search_type: SearchType,
) -> Result<Vec<RetrievedChunk>> {
    if k == 0 {
        return Ok(Vec::new());
    }
    let query_vec = embedder.embed_query(question).await?;

    match search_type {
        SearchType::Similarity => Ok(index
            .nearest(&query_vec, k)
            .await?
            .into_iter()
            .enumerate()
            .map(|(rank, (score, entry))| RetrievedChunk {
                chunk: entry.chunk,
                rank,
                score,
            })
            .collect()),
        SearchType::Mmr { fetch_k, lambda } => {
            let pool = index.nearest(&query_vec, fetch_k.max(k)).await?;
            let embeddings: Vec<Vec<f64>> =
                pool.iter().map(|(_, e)| e.embedding.clone()).collect();
            let order = mmr_select(&query_vec, &embeddings, k, lambda);

            let mut slots: Vec<Option<(f64, IndexedChunk)>> = pool.into_iter().map(Some).collect();
            Ok(order
                .into_iter()
                .enumerate()
                .filter_map(|(rank, idx)| {
                    slots[idx].take().map(|(score, entry)| RetrievedChunk {
                        chunk: entry.chunk,
                        rank,
                        score,
                    })
                })
                .collect())
        }
    }
}

/// Vista de sólo lectura sobre un índice con parámetros de búsqueda fijos.
///
/// Mantiene una referencia al índice del momento en que se creó; tras
/// `add_documents` sobre un índice plano hay que pedir un retriever nuevo.
#[derive(Clone)]
pub struct Retriever {
    index: Arc<VectorIndex>,
    embedder: Arc<dyn Embedder>,
    k: usize,
    search: SearchType,
}

impl Retriever {
    pub fn k(&self) -> usize {
        self.k
    }

    pub fn search_type(&self) -> SearchType {
        self.search
    }

    pub async fn get_relevant_documents(&self, question: &str) -> Result<Vec<RetrievedChunk>> {
        search(&self.index, &*self.embedder, question, self.k, self.search).await
    }

    /// Igual que `get_relevant_documents` pero con otro `k`.
    pub async fn get_relevant_documents_k(
        &self,
        question: &str,
        k: usize,
    ) -> Result<Vec<RetrievedChunk>> {
        let search_type = match self.search {
            SearchType::Mmr { fetch_k, lambda } => SearchType::Mmr {
                fetch_k: fetch_k.max(k),
                lambda,
            },
            other => other,
        };
        search(&self.index, &*self.embedder, question, k, search_type).await
    }
}

// ---------------------------------------------------------------------
// MANAGER
// ---------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Neo4jSettings {
    uri: String,
    user: String,
    password: String,
}

pub struct VectorStoreManager {
    store_kind: StoreKind,
    persist_directory: PathBuf,
    embedder: Arc<dyn Embedder>,
    neo4j: Option<Neo4jSettings>,
    graph: Option<Arc<Graph>>,
    index: Option<Arc<VectorIndex>>,
}

impl VectorStoreManager {
    pub fn new(
        store_kind: StoreKind,
        persist_directory: impl Into<PathBuf>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self {
            store_kind,
            persist_directory: persist_directory.into(),
            embedder,
            neo4j: None,
            graph: None,
            index: None,
        }
    }

    pub fn with_neo4j(mut self, uri: &str, user: &str, password: &str) -> Self {
        self.neo4j = Some(Neo4jSettings {
            uri: uri.to_string(),
            user: user.to_string(),
            password: password.to_string(),
        });
        self
    }

    pub fn from_config(cfg: &AppConfig, embedder: Arc<dyn Embedder>) -> Self {
        Self::new(cfg.store_kind, cfg.vector_store_dir.clone(), embedder).with_neo4j(
            &cfg.neo4j_uri,
            &cfg.neo4j_user,
            &cfg.neo4j_password,
        )
    }

    pub fn store_kind(&self) -> StoreKind {
        self.store_kind
    }

    pub fn is_loaded(&self) -> bool {
        self.index.is_some()
    }

    pub fn embedding_model(&self) -> &str {
        self.embedder.model_name()
    }

    fn flat_dir(&self) -> PathBuf {
        self.persist_directory.join(FLAT_DIR)
    }

    async fn neo4j_index(&mut self) -> Result<Neo4jIndex> {
        if let Some(graph) = &self.graph {
            return Ok(Neo4jIndex::new(graph.clone()));
        }
        let settings = self
            .neo4j
            .as_ref()
            .ok_or_else(|| anyhow!("Backend Neo4j sin parámetros de conexión"))?;
        let graph = Arc::new(
            neo4j_client::connect(&settings.uri, &settings.user, &settings.password).await?,
        );
        self.graph = Some(graph.clone());
        Ok(Neo4jIndex::new(graph))
    }

    fn current(&self) -> Result<&Arc<VectorIndex>> {
        self.index
            .as_ref()
            .ok_or_else(|| anyhow::Error::from(IndexError::NotLoaded))
    }

    async fn embed_chunks(&self, chunks: &[DocumentChunk]) -> Result<Vec<IndexedChunk>> {
        let mut entries = Vec::with_capacity(chunks.len());
        for (i, batch) in chunks.chunks(EMBED_BATCH_SIZE).enumerate() {
            let texts: Vec<String> = batch.iter().map(|c| c.page_content.clone()).collect();
            let vectors = self.embedder.embed_texts(texts).await?;
            ensure!(
                vectors.len() == batch.len(),
                "Número de embeddings ({}) distinto al número de chunks ({})",
                vectors.len(),
                batch.len()
            );
            entries.extend(
                batch
                    .iter()
                    .cloned()
                    .zip(vectors)
                    .map(|(chunk, embedding)| IndexedChunk { chunk, embedding }),
            );
            debug!(
                "Lote {} de embeddings: {}/{} chunks",
                i + 1,
                entries.len(),
                chunks.len()
            );
        }

        let dims = entries.first().map(|e| e.embedding.len()).unwrap_or(0);
        ensure!(dims > 0, "El modelo de embeddings devolvió vectores vacíos");
        ensure!(
            entries.iter().all(|e| e.embedding.len() == dims),
            "El modelo de embeddings devolvió vectores de dimensiones distintas"
        );
        Ok(entries)
    }

    /// Embebe todos los chunks y construye un índice nuevo.
    ///
    /// Con Neo4j el índice anterior se borra y el nuevo queda persistido al terminar.
    pub async fn build(&mut self, chunks: &[DocumentChunk]) -> Result<()> {
        if chunks.is_empty() {
            bail!("No hay documentos para crear el índice vectorial");
        }
        info!(
            "Creando índice {} con {} chunks...",
            self.store_kind.as_str(),
            chunks.len()
        );

        let entries = self.embed_chunks(chunks).await?;
        let index = match self.store_kind {
            StoreKind::Flat => VectorIndex::Flat(FlatIndex::new(entries)),
            StoreKind::Neo4j => {
                let dims = entries.first().map(|e| e.embedding.len()).unwrap_or(0);
                let neo = self.neo4j_index().await?;
                neo.reset(dims, self.embedder.model_name()).await?;
                neo.insert(&entries).await?;
                VectorIndex::Neo4j(neo)
            }
        };
        self.index = Some(Arc::new(index));

        info!("Índice vectorial creado con {} chunks", chunks.len());
        Ok(())
    }

    /// Añade chunks a un índice existente.
    ///
    /// El plano sólo cambia en memoria (hace falta `save`); Neo4j persiste al momento.
    pub async fn add_documents(&mut self, chunks: &[DocumentChunk]) -> Result<()> {
        self.current()?;
        if chunks.is_empty() {
            warn!("No hay documentos que añadir");
            return Ok(());
        }
        info!("Añadiendo {} chunks al índice", chunks.len());

        let entries = self.embed_chunks(chunks).await?;
        let Some(index) = self.index.as_mut() else {
            return Err(IndexError::NotLoaded.into());
        };
        match Arc::make_mut(index) {
            VectorIndex::Flat(flat) => {
                if let Some(dims) = flat.dims() {
                    ensure!(
                        entries.iter().all(|e| e.embedding.len() == dims),
                        "Los nuevos embeddings no tienen la dimensión del índice ({dims})"
                    );
                }
                flat.extend(entries);
            }
            VectorIndex::Neo4j(neo) => neo.insert(&entries).await?,
        }
        Ok(())
    }

    pub async fn save(&self) -> Result<()> {
        match self.current()?.as_ref() {
            VectorIndex::Flat(flat) => {
                let dir = self.flat_dir();
                info!("Guardando índice plano en {}", dir.display());
                flat.save(&dir, self.embedder.model_name()).await?;
                info!("Índice guardado ({} chunks)", flat.len());
            }
            VectorIndex::Neo4j(_) => {
                debug!("Neo4j persiste en cada escritura; nada que guardar");
            }
        }
        Ok(())
    }

    /// Carga el índice persistido.
    ///
    /// `Ok(None)` si no existe; [`IndexError::EmbeddingModelMismatch`] si se
    /// construyó con otro modelo de embeddings.
    pub async fn load(&mut self) -> Result<Option<IndexManifest>> {
        info!(
            "Cargando índice {} desde {}",
            self.store_kind.as_str(),
            self.persist_directory.display()
        );

        let (index, manifest) = match self.store_kind {
            StoreKind::Flat => match FlatIndex::load(&self.flat_dir()).await? {
                Some((flat, manifest)) => (VectorIndex::Flat(flat), manifest),
                None => {
                    warn!("No existe índice plano en {}", self.flat_dir().display());
                    return Ok(None);
                }
            },
            StoreKind::Neo4j => {
                let neo = self.neo4j_index().await?;
                match neo.manifest().await? {
                    Some(manifest) if manifest.document_count > 0 => {
                        (VectorIndex::Neo4j(neo), manifest)
                    }
                    _ => {
                        warn!("No hay chunks indexados en Neo4j");
                        return Ok(None);
                    }
                }
            }
        };

        let configured = self.embedder.model_name();
        if manifest.embedding_model != configured {
            return Err(IndexError::EmbeddingModelMismatch {
                stored: manifest.embedding_model,
                configured: configured.to_string(),
            }
            .into());
        }

        self.index = Some(Arc::new(index));
        info!(
            "Índice cargado: {} chunks ({})",
            manifest.document_count, manifest.embedding_model
        );
        Ok(Some(manifest))
    }

    pub async fn retrieve(
        &self,
        question: &str,
        k: usize,
        search_type: SearchType,
    ) -> Result<Vec<RetrievedChunk>> {
        search(self.current()?, &*self.embedder, question, k, search_type).await
    }

    pub async fn similarity_search(&self, question: &str, k: usize) -> Result<Vec<DocumentChunk>> {
        Ok(self
            .retrieve(question, k, SearchType::Similarity)
            .await?
            .into_iter()
            .map(|r| r.chunk)
            .collect())
    }

    pub fn as_retriever(&self, k: usize, search: SearchType) -> Result<Retriever> {
        Ok(Retriever {
            index: self.current()?.clone(),
            embedder: self.embedder.clone(),
            k,
            search,
        })
    }

    pub async fn get_store_info(&self) -> StoreInfo {
        let document_count = match &self.index {
            Some(index) => index.document_count().await,
            None => DocumentCount::Unavailable("índice no cargado".to_string()),
        };
        StoreInfo {
            loaded: self.index.is_some(),
            store_type: self.store_kind,
            persist_directory: self.persist_directory.clone(),
            embedding_model: self.embedder.model_name().to_string(),
            document_count,
        }
    }
}

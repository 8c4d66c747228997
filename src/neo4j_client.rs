use anyhow::Result;
use neo4rs::{query, Graph};
use tracing::info;
use url::Url;

/// Acepta URIs `bolt://host:port`; neo4rs sólo quiere `host:port`.
pub async fn connect(uri: &str, user: &str, password: &str) -> Result<Graph> {
    let url = Url::parse(uri)?;
    let host = url.host_str().unwrap_or("localhost");
    let port = url.port().unwrap_or(7687);
    let addr = format!("{host}:{port}");

    info!("Conectando a Neo4j en {addr}...");
    let graph = Graph::new(&addr, user, password).await?;
    info!("Conexión a Neo4j OK");
    Ok(graph)
}

/// Constraints para las etiquetas del índice: :HelpChunk y el nodo único :IndexManifest.
pub async fn ensure_schema(graph: &Graph) -> Result<()> {
    let statements = [
        "CREATE CONSTRAINT help_chunk_id IF NOT EXISTS
         FOR (c:HelpChunk)
         REQUIRE c.id IS UNIQUE",
        "CREATE CONSTRAINT index_manifest_name IF NOT EXISTS
         FOR (m:IndexManifest)
         REQUIRE m.name IS UNIQUE",
    ];

    for stmt in statements {
        graph.run(query(stmt)).await?;
    }

    info!("Esquema de Neo4j asegurado.");
    Ok(())
}

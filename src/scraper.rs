//! Crawler BFS de la Central de Ajuda y persistencia de artículos.
//!
//! Flujo:
//!   1. La frontera (FIFO) arranca con la URL base normalizada.
//!   2. Cada URL se descarga una sola vez; de la misma respuesta se extraen
//!      el artículo (si la ruta lo parece) y los enlaces salientes.
//!   3. Los enlaces válidos y nunca encolados pasan a la frontera.
//!   4. Se para al vaciar la frontera o al alcanzar `max_pages` visitas.

use std::collections::{HashSet, VecDeque};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::redirect::Policy;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::AppConfig;
use crate::html::{ExtractedPage, PageExtractor};
use crate::models::Article;

pub const USER_AGENT: &str = "Mozilla/5.0 (compatible; SupportRAG/1.0)";
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Rutas funcionales que nunca contienen artículos.
const SKIP_PATHS: [&str; 5] = ["/search", "/contact", "/login", "/logout", "/admin"];

/// Un artículo con menos texto que esto es una página vacía o de navegación.
const MIN_ARTICLE_CHARS: usize = 100;

const PROGRESS_EVERY: usize = 10;

/// Respuesta HTTP mínima que necesita el crawler.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub status: u16,
    pub body: String,
}

/// Acceso HTTP del crawler. Los tests lo sustituyen por un sitio en memoria.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn get(&self, url: &Url) -> Result<FetchedPage>;
}

/// Implementación real sobre `reqwest`.
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .redirect(Policy::limited(5))
            .timeout(FETCH_TIMEOUT)
            .build()
            .context("No se pudo construir el cliente HTTP")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn get(&self, url: &Url) -> Result<FetchedPage> {
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(FetchedPage { status, body })
    }
}

/// Clave de deduplicación: sin fragmento, sin query y sin barra final.
pub fn normalize_url(raw: &str) -> Option<String> {
    let mut url = Url::parse(raw.trim()).ok()?;
    url.set_fragment(None);
    url.set_query(None);
    Some(url.as_str().trim_end_matches('/').to_string())
}

/// Parámetros del sitio a recorrer.
#[derive(Debug, Clone)]
pub struct ScraperConfig {
    pub base_url: Url,
    pub domain: String,
    /// Fragmentos de ruta que marcan una página como artículo.
    pub article_markers: Vec<String>,
    /// Título genérico del sitio que no vale como título de artículo.
    pub placeholder_title: String,
}

impl ScraperConfig {
    pub fn new(base_url: &str, domain: &str, placeholder_title: &str) -> Result<Self> {
        let base_url =
            Url::parse(base_url).map_err(|e| anyhow!("URL base inválida ({base_url}): {e}"))?;

        let mut article_markers = vec!["/articles/".to_string()];
        // El segmento de idioma (p. ej. /pt-BR/) también identifica páginas de contenido.
        if let Some(locale) = base_url
            .path_segments()
            .and_then(|mut segments| segments.next())
            .filter(|segment| !segment.is_empty())
        {
            article_markers.push(format!("/{locale}/"));
        }

        Ok(Self {
            base_url,
            domain: domain.to_lowercase(),
            article_markers,
            placeholder_title: placeholder_title.to_string(),
        })
    }

    pub fn from_app_config(cfg: &AppConfig) -> Result<Self> {
        Self::new(
            &cfg.help_center_url,
            &cfg.help_center_domain,
            &cfg.support_brand,
        )
    }
}

pub struct Scraper {
    config: ScraperConfig,
    fetcher: Arc<dyn PageFetcher>,
    extractor: PageExtractor,
    visited: HashSet<String>,
}

impl Scraper {
    pub fn new(config: ScraperConfig, fetcher: Arc<dyn PageFetcher>) -> Self {
        let extractor = PageExtractor::new(config.placeholder_title.clone());
        Self {
            config,
            fetcher,
            extractor,
            visited: HashSet::new(),
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.config.base_url
    }

    /// URLs visitadas en el último `crawl`.
    pub fn visited_count(&self) -> usize {
        self.visited.len()
    }

    /// Dentro del dominio (o un subdominio), http(s) y fuera de las rutas funcionales.
    pub fn is_valid_url(&self, raw: &str) -> bool {
        let Ok(url) = Url::parse(raw) else {
            return false;
        };
        if !matches!(url.scheme(), "http" | "https") {
            return false;
        }
        let Some(host) = url.host_str() else {
            return false;
        };
        let host = host.to_lowercase();
        let in_domain =
            host == self.config.domain || host.ends_with(&format!(".{}", self.config.domain));
        in_domain && !SKIP_PATHS.iter().any(|skip| url.path().contains(skip))
    }

    pub fn is_article_url(&self, raw: &str) -> bool {
        self.config
            .article_markers
            .iter()
            .any(|marker| raw.contains(marker.as_str()))
    }

    /// Recorre el sitio en anchura y devuelve los artículos encontrados.
    ///
    /// Los errores por página se registran y no interrumpen el recorrido.
    pub async fn crawl(&mut self, max_pages: usize, delay: Duration) -> Vec<Article> {
        self.visited.clear();

        let mut frontier: VecDeque<String> = VecDeque::new();
        let mut enqueued: HashSet<String> = HashSet::new();
        if let Some(seed) = normalize_url(self.config.base_url.as_str()) {
            enqueued.insert(seed.clone());
            frontier.push_back(seed);
        }

        info!(
            "Iniciando crawl de {} (máximo {} páginas)",
            self.config.base_url, max_pages
        );

        let mut articles = Vec::new();
        while let Some(url) = frontier.pop_front() {
            if self.visited.len() >= max_pages {
                info!("Alcanzado el límite de {max_pages} páginas");
                break;
            }
            if !self.visited.insert(url.clone()) {
                continue;
            }
            if self.visited.len() > 1 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            match self.visit(&url).await {
                Ok(page) => {
                    if let Some(article) = self.to_article(&url, &page) {
                        debug!("Artículo extraído: {} ({})", article.title, article.url);
                        articles.push(article);
                    }
                    for link in page.links {
                        let Some(normalized) = normalize_url(link.as_str()) else {
                            continue;
                        };
                        if !self.visited.contains(&normalized)
                            && !enqueued.contains(&normalized)
                            && self.is_valid_url(&normalized)
                        {
                            enqueued.insert(normalized.clone());
                            frontier.push_back(normalized);
                        }
                    }
                }
                Err(e) => warn!("Error procesando {url}: {e:#}"),
            }

            if self.visited.len() % PROGRESS_EVERY == 0 {
                info!(
                    "Progreso: {} páginas visitadas, {} artículos, {} en cola",
                    self.visited.len(),
                    articles.len(),
                    frontier.len()
                );
            }
        }

        info!(
            "Crawl terminado: {} páginas visitadas, {} artículos",
            self.visited.len(),
            articles.len()
        );
        articles
    }

    async fn visit(&self, url: &str) -> Result<ExtractedPage> {
        let parsed = Url::parse(url)?;
        let page = self.fetcher.get(&parsed).await?;
        if page.status >= 400 {
            bail!("HTTP {}", page.status);
        }
        Ok(self.extractor.extract(&page.body, &parsed))
    }

    fn to_article(&self, url: &str, page: &ExtractedPage) -> Option<Article> {
        if !self.is_article_url(url) || page.content.chars().count() <= MIN_ARTICLE_CHARS {
            return None;
        }
        Some(Article {
            title: page.title.clone(),
            url: url.to_string(),
            content: page.content.clone(),
            category: String::new(),
        })
    }
}

/// Guarda los artículos como JSON legible (UTF-8 sin escapar).
///
/// Escribe primero en un fichero temporal y luego renombra.
pub async fn save_articles(path: &Path, articles: &[Article]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("No se pudo crear el directorio {}", parent.display()))?;
    }

    let json = serde_json::to_string_pretty(articles)?;
    let tmp = tmp_path(path);
    tokio::fs::write(&tmp, json)
        .await
        .with_context(|| format!("No se pudo escribir {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("No se pudo renombrar a {}", path.display()))?;

    info!("Guardados {} artículos en {}", articles.len(), path.display());
    Ok(())
}

/// Carga artículos; si el fichero no existe devuelve una lista vacía.
pub async fn load_articles(path: &Path) -> Result<Vec<Article>> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("No existe {}; sin artículos previos", path.display());
            return Ok(Vec::new());
        }
        Err(e) => return Err(e).with_context(|| format!("No se pudo leer {}", path.display())),
    };
    let articles: Vec<Article> = serde_json::from_str(&raw)
        .with_context(|| format!("JSON de artículos corrupto en {}", path.display()))?;
    info!("Cargados {} artículos de {}", articles.len(), path.display());
    Ok(articles)
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

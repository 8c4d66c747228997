//! Extracción de título, texto y enlaces de las páginas de la Central de Ajuda.
//!
//! El parseo es síncrono: el `Html` de `scraper` no es `Send`, así que nunca
//! debe vivir a través de un `.await`. El crawler llama a [`PageExtractor::extract`]
//! y sólo conserva el resultado ya en propiedad.

use ::scraper::{ElementRef, Html, Selector};
use url::Url;

/// Párrafos con esta longitud o menos se consideran ruido (botones, migas, etc.).
const MIN_PARAGRAPH_CHARS: usize = 10;

pub const UNTITLED_ARTICLE: &str = "Untitled Article";

/// Resultado de procesar una página.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedPage {
    pub title: String,
    pub content: String,
    pub links: Vec<Url>,
}

/// Extractor sin estado; los selectores se compilan una sola vez.
#[derive(Clone)]
pub struct PageExtractor {
    placeholder_title: String,
    main_selectors: Vec<Selector>,
    title_selectors: Vec<Selector>,
    blocks: Selector,
    cells: Selector,
    anchors: Selector,
}

impl PageExtractor {
    /// `placeholder_title` es el título genérico del sitio (p. ej. el nombre de la marca),
    /// que nunca se acepta como título de artículo.
    pub fn new(placeholder_title: impl Into<String>) -> Self {
        Self {
            placeholder_title: placeholder_title.into(),
            main_selectors: ["main", "article", "div.content"]
                .into_iter()
                .map(selector)
                .collect(),
            title_selectors: ["h1", ".article-title", ".page-title", "title"]
                .into_iter()
                .map(selector)
                .collect(),
            blocks: selector("h1, h2, h3, h4, h5, h6, p, li, tr"),
            cells: selector("td, th"),
            anchors: selector("a[href]"),
        }
    }

    pub fn extract(&self, html: &str, page_url: &Url) -> ExtractedPage {
        let document = Html::parse_document(html);
        ExtractedPage {
            title: self.title(&document),
            content: self.content(&document),
            links: self.links(&document, page_url),
        }
    }

    fn title(&self, document: &Html) -> String {
        for sel in &self.title_selectors {
            if let Some(element) = document.select(sel).next() {
                let text = element_text(&element);
                if !text.is_empty() && text != self.placeholder_title {
                    return text;
                }
            }
        }
        UNTITLED_ARTICLE.to_string()
    }

    /// Concatena títulos, párrafos, elementos de lista y filas de tabla en orden de documento.
    fn content(&self, document: &Html) -> String {
        let root = self
            .main_selectors
            .iter()
            .find_map(|sel| document.select(sel).next())
            .unwrap_or_else(|| document.root_element());

        let mut parts: Vec<String> = Vec::new();
        for element in root.select(&self.blocks) {
            match element.value().name() {
                "p" => {
                    // El texto de párrafos dentro de listas/tablas ya lo recoge el contenedor.
                    if has_ancestor(&element, &["li", "td", "th"]) {
                        continue;
                    }
                    let text = element_text(&element);
                    if text.chars().count() > MIN_PARAGRAPH_CHARS {
                        parts.push(text);
                    }
                }
                "li" => {
                    // Una sublista ya forma parte del texto del elemento exterior.
                    if has_ancestor(&element, &["li"]) {
                        continue;
                    }
                    let text = element_text(&element);
                    if !text.is_empty() {
                        parts.push(format!("• {text}"));
                    }
                }
                "tr" => {
                    let cells: Vec<String> = element
                        .select(&self.cells)
                        .map(|cell| element_text(&cell))
                        .collect();
                    if cells.iter().any(|c| !c.is_empty()) {
                        parts.push(cells.join(" | "));
                    }
                }
                _ => {
                    let text = element_text(&element);
                    if !text.is_empty() {
                        parts.push(text);
                    }
                }
            }
        }

        parts.join("\n\n")
    }

    fn links(&self, document: &Html, page_url: &Url) -> Vec<Url> {
        document
            .select(&self.anchors)
            .filter_map(|a| a.value().attr("href"))
            .filter_map(|href| page_url.join(href.trim()).ok())
            .filter(|url| matches!(url.scheme(), "http" | "https"))
            .collect()
    }
}

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("selector CSS literal válido")
}

fn element_text(element: &ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn has_ancestor(element: &ElementRef<'_>, names: &[&str]) -> bool {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .any(|ancestor| names.contains(&ancestor.value().name()))
}

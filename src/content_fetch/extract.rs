//! Readability-style extraction: turn a fetched HTML (or plain text) body into
//! the text a human would actually want to read, dropping navigation, ads, and
//! other boilerplate chrome.

use scraper::{ElementRef, Html, Selector};

/// Any class/id token containing one of these (case-insensitive, matched as a
/// whole token so "nav" doesn't match "navigate") marks an element as chrome.
const BOILERPLATE_TOKENS: &[&str] = &[
    "nav", "navbar", "navigation", "header", "footer", "sidebar", "menu",
    "breadcrumb", "breadcrumbs", "advertisement", "ad", "ads", "social",
    "share", "sharing", "comment", "comments", "related", "recommended",
    "popular", "trending", "subscribe", "newsletter", "cookie", "cookies",
    "banner", "popup", "modal", "overlay",
];

/// Content shorter than this (after boilerplate removal) is treated as empty.
pub const MIN_EXTRACTED_CHARS: usize = 50;

pub struct Extracted {
    pub title: Option<String>,
    pub text: String,
}

/// Extract readable text from an HTML document. Tries `<article>`, then
/// `<main>`, falling back to `<body>` minus boilerplate elements.
pub fn extract_html(html: &str) -> Extracted {
    let doc = Html::parse_document(html);
    let title = select_first_text(&doc, "title").or_else(|| select_first_text(&doc, "h1"));

    let root = find_main_content(&doc);
    let text = match root {
        Some(el) => collect_text(el),
        None => String::new(),
    };

    Extracted { title, text: normalize_whitespace(&text) }
}

/// Fallback extraction for non-HTML text bodies: just normalize whitespace.
pub fn extract_plain(body: &str) -> Extracted {
    Extracted { title: None, text: normalize_whitespace(body) }
}

fn find_main_content(doc: &Html) -> Option<ElementRef<'_>> {
    for selector in ["article", "main", "body"] {
        if let Ok(sel) = Selector::parse(selector) {
            if let Some(el) = doc.select(&sel).next() {
                return Some(el);
            }
        }
    }
    None
}

fn collect_text(root: ElementRef<'_>) -> String {
    let mut out = String::new();
    for node in root.descendants() {
        if let Some(el) = ElementRef::wrap(node) {
            if is_boilerplate(&el) {
                continue;
            }
        }
        if let Some(text) = node.value().as_text() {
            out.push_str(text);
            out.push(' ');
        }
    }
    out
}

fn is_boilerplate(el: &ElementRef<'_>) -> bool {
    let tag = el.value().name();
    if matches!(tag, "nav" | "header" | "footer" | "aside" | "script" | "style" | "noscript") {
        return true;
    }
    let tokens: Vec<String> = el
        .value()
        .classes()
        .map(|c| c.to_ascii_lowercase())
        .chain(el.value().attr("id").map(|id| id.to_ascii_lowercase()))
        .collect();
    tokens.iter().any(|token| BOILERPLATE_TOKENS.contains(&token.as_str()))
}

fn select_first_text(doc: &Html, selector: &str) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    let el = doc.select(&sel).next()?;
    let text = el.text().collect::<String>().trim().to_string();
    (!text.is_empty()).then_some(text)
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

//! Best-effort recovery of citations and document names from answer text.
//!
//! Stored prompt records keep only the raw response text, so anything richer
//! than that has to be scraped back out. Nothing here returns an error: a
//! response that cannot be decoded simply has no citations.

use crate::models::Source;
use regex::Regex;
use std::sync::LazyLock;

const SOURCES_MARKER: &str = "\"sources\":";

static SOURCES_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)\{.*"sources":\s*(\[.*?\])"#).expect("sources pattern is valid")
});
static PDF_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z0-9_-]+\.pdf").expect("pdf name pattern is valid"));

/// Outcome of scanning a response for an embedded `sources` array.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceExtraction {
    Found(Vec<Source>),
    Empty,
}

impl SourceExtraction {
    pub fn into_sources(self) -> Vec<Source> {
        match self {
            SourceExtraction::Found(sources) => sources,
            SourceExtraction::Empty => Vec::new(),
        }
    }
}

/// Looks for a JSON object carrying a `"sources": [...]` array inside free
/// text and decodes the array. The array match is non-greedy, so it ends at
/// the first closing bracket after the marker.
pub fn extract_sources(text: &str) -> SourceExtraction {
    if !text.contains(SOURCES_MARKER) {
        return SourceExtraction::Empty;
    }

    let Some(array) = SOURCES_RE
        .captures(text)
        .and_then(|caps| caps.get(1))
    else {
        return SourceExtraction::Empty;
    };

    match serde_json::from_str::<Vec<Source>>(array.as_str()) {
        Ok(sources) if !sources.is_empty() => SourceExtraction::Found(sources),
        Ok(_) => SourceExtraction::Empty,
        Err(e) => {
            log::debug!("Failed to extract sources from response: {}", e);
            SourceExtraction::Empty
        }
    }
}

/// Collects `name.pdf` tokens from a response, first occurrence wins.
pub fn extract_document_names(text: &str) -> Vec<String> {
    let mut names = Vec::new();
    push_document_names(text, &mut names);
    names
}

/// Same as [`extract_document_names`] across many responses, deduplicated
/// over the whole set.
pub fn collect_document_names<'a, I>(texts: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut names = Vec::new();
    for text in texts {
        push_document_names(text, &mut names);
    }
    names
}

fn push_document_names(text: &str, names: &mut Vec<String>) {
    if !text.contains(".pdf") {
        return;
    }
    for found in PDF_NAME_RE.find_iter(text) {
        let name = found.as_str();
        if !names.iter().any(|existing| existing == name) {
            names.push(name.to_string());
        }
    }
}

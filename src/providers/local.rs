//! Local full-text index provider
//!
//! Serves search from a JSON index of pages split into sections. Every section
//! with a hit becomes a sub-result whose weighted locations feed the shared
//! normalizer, the same way a static-site index reports fragments.

use super::traits::*;
use crate::config::ProviderConfig;
use crate::ranking::{
    normalize_batch, IndexFragment, IndexMeta, NormalizeOptions, RawBatch, RawSubResult,
    WeightedLocation,
};
use crate::references::Reference;
use async_trait::async_trait;
use moka::future::Cache;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default index location, relative to the working directory
pub const DEFAULT_INDEX_PATH: &str = "pagefind/index.json";

/// Words shown on each side of the best hit in an excerpt
const EXCERPT_RADIUS: usize = 12;

/// Distinct terms kept in the posting cache
const POSTING_CACHE_CAPACITY: u64 = 10_000;

static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w+").expect("valid word pattern"));

fn tokenize(text: &str) -> Vec<String> {
    WORD.find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

/// Prefix similarity of a query term against an indexed word
fn similarity(term: &str, word: &str) -> Option<f64> {
    if word.starts_with(term) {
        Some(term.chars().count() as f64 / word.chars().count() as f64)
    } else {
        None
    }
}

fn escape_html(word: &str) -> String {
    word.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// On-disk index document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexDocument {
    pub pages: Vec<IndexDocumentPage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexDocumentPage {
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub sections: Vec<IndexDocumentSection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexDocumentSection {
    /// Fragment identifier; `None` for the page's leading section
    #[serde(default)]
    pub anchor: Option<String>,
    pub title: String,
    #[serde(default)]
    pub text: String,
}

/// Weighting table read from the provider's `ranking` option
#[derive(Debug, Clone, PartialEq)]
pub struct RankingWeights {
    /// Multiplier for hits in section titles
    pub title_weight: f64,
    /// Exponent applied to prefix similarity; higher favours exact words
    pub term_similarity: f64,
    /// Strength of the penalty for long pages
    pub page_length: f64,
}

impl Default for RankingWeights {
    fn default() -> Self {
        Self {
            title_weight: 2.0,
            term_similarity: 1.0,
            page_length: 0.0,
        }
    }
}

impl RankingWeights {
    pub fn from_table(table: &HashMap<String, f64>) -> Self {
        let mut weights = Self::default();
        for (key, value) in table {
            match key.as_str() {
                "title_weight" => weights.title_weight = *value,
                "term_similarity" => weights.term_similarity = *value,
                "page_length" => weights.page_length = *value,
                other => warn!("Ignoring unknown ranking option: {}", other),
            }
        }
        weights
    }
}

struct IndexedSection {
    url: String,
    title: String,
    title_terms: Vec<String>,
    words: Vec<String>,
    terms: Vec<String>,
    /// Word offset of the section within its page
    offset: u32,
}

struct IndexedPage {
    title: String,
    tags: Vec<String>,
    sections: Vec<IndexedSection>,
    word_count: usize,
}

impl IndexedPage {
    fn build(page: IndexDocumentPage) -> Self {
        let mut offset = 0u32;
        let sections = page
            .sections
            .into_iter()
            .map(|section| {
                let words: Vec<String> = WORD
                    .find_iter(&section.text)
                    .map(|m| m.as_str().to_string())
                    .collect();
                let terms = words.iter().map(|w| w.to_lowercase()).collect();
                let url = match section.anchor {
                    Some(ref anchor) => format!("{}#{}", page.url, anchor),
                    None => page.url.clone(),
                };

                let indexed = IndexedSection {
                    url,
                    title_terms: tokenize(&section.title),
                    title: section.title,
                    terms,
                    offset,
                    words,
                };
                offset += indexed.words.len() as u32;
                indexed
            })
            .collect();

        Self {
            title: page.title,
            tags: page.tags,
            sections,
            word_count: offset as usize,
        }
    }
}

/// One occurrence of a term in the index
#[derive(Debug, Clone, Copy, PartialEq)]
struct Posting {
    page: usize,
    section: usize,
    location: u32,
    in_title: bool,
    similarity: f64,
}

#[derive(Default)]
struct PageHits {
    sections: BTreeMap<usize, Vec<WeightedLocation>>,
    terms: BTreeSet<usize>,
}

impl PageHits {
    fn score(&self) -> f64 {
        self.sections
            .values()
            .flatten()
            .map(|loc| loc.balanced_score)
            .sum()
    }
}

/// Provider backed by a local index file
pub struct LocalIndex {
    name: String,
    pages: Vec<IndexedPage>,
    options: NormalizeOptions,
    weights: RankingWeights,
    postings: Cache<String, Arc<Vec<Posting>>>,
}

impl LocalIndex {
    /// Build an index from an in-memory document
    pub fn from_document(
        name: impl Into<String>,
        document: IndexDocument,
        options: NormalizeOptions,
        weights: RankingWeights,
    ) -> Self {
        let pages: Vec<IndexedPage> = document
            .pages
            .into_iter()
            .filter(|page| {
                if page.url.is_empty() {
                    warn!("Skipping index page without url: {}", page.title);
                }
                !page.url.is_empty()
            })
            .map(IndexedPage::build)
            .collect();

        Self {
            name: name.into(),
            pages,
            options,
            weights,
            postings: Cache::builder()
                .max_capacity(POSTING_CACHE_CAPACITY)
                .build(),
        }
    }

    /// Load the index file named by the provider config
    pub async fn open(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let path = config.path.as_deref().unwrap_or(DEFAULT_INDEX_PATH);

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ProviderError::init(&config.name, format!("failed to read {}: {}", path, e)))?;
        let document: IndexDocument = serde_json::from_str(&content).map_err(|e| {
            ProviderError::init(&config.name, format!("failed to parse {}: {}", path, e))
        })?;

        let index = Self::from_document(
            &config.name,
            document,
            config.normalize_options(),
            RankingWeights::from_table(&config.ranking),
        );
        info!("Loaded local index {} with {} pages", path, index.len());
        Ok(index)
    }

    /// Number of indexed pages
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    fn scan(&self, term: &str) -> Vec<Posting> {
        let mut postings = Vec::new();

        for (p, page) in self.pages.iter().enumerate() {
            for (s, section) in page.sections.iter().enumerate() {
                for word in &section.title_terms {
                    if let Some(similarity) = similarity(term, word) {
                        postings.push(Posting {
                            page: p,
                            section: s,
                            location: section.offset,
                            in_title: true,
                            similarity,
                        });
                    }
                }

                for (i, word) in section.terms.iter().enumerate() {
                    if let Some(similarity) = similarity(term, word) {
                        postings.push(Posting {
                            page: p,
                            section: s,
                            location: section.offset + i as u32,
                            in_title: false,
                            similarity,
                        });
                    }
                }
            }
        }

        postings
    }

    async fn postings(&self, term: &str) -> Arc<Vec<Posting>> {
        self.postings
            .get_with(term.to_string(), async { Arc::new(self.scan(term)) })
            .await
    }

    fn locate(&self, posting: &Posting) -> WeightedLocation {
        let weight = if posting.in_title {
            self.weights.title_weight
        } else {
            1.0
        };
        let length = self.pages[posting.page].word_count as f64;
        let balanced_score = weight * posting.similarity.powf(self.weights.term_similarity)
            / (1.0 + self.weights.page_length * length.ln_1p());

        WeightedLocation {
            weight,
            balanced_score,
            location: posting.location,
        }
    }

    /// Window of words around the best-scoring hit of a section
    fn excerpt(
        section: &IndexedSection,
        locations: &[WeightedLocation],
        terms: &[String],
    ) -> String {
        let is_hit = |word: &str| terms.iter().any(|t| word.starts_with(t.as_str()));

        // Title hits sit at the section offset, so they anchor at its first word
        let anchor = locations
            .iter()
            .max_by(|a, b| a.balanced_score.total_cmp(&b.balanced_score))
            .map(|loc| loc.location.saturating_sub(section.offset) as usize)
            .unwrap_or(0);
        let start = anchor
            .saturating_sub(EXCERPT_RADIUS)
            .min(section.words.len());
        let end = (start + 2 * EXCERPT_RADIUS).min(section.words.len());

        section.words[start..end]
            .iter()
            .zip(&section.terms[start..end])
            .map(|(word, term)| {
                if is_hit(term) {
                    format!("<mark>{}</mark>", escape_html(word))
                } else {
                    escape_html(word)
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn fragment(&self, page: usize, hits: &PageHits, terms: &[String]) -> IndexFragment {
        let indexed = &self.pages[page];

        let sub_results = hits
            .sections
            .iter()
            .map(|(s, locations)| {
                let section = &indexed.sections[*s];
                RawSubResult {
                    url: section.url.clone(),
                    title: section.title.clone(),
                    excerpt: Some(Self::excerpt(section, locations, terms)),
                    weighted_locations: Some(locations.clone()),
                }
            })
            .collect();

        IndexFragment {
            meta: IndexMeta {
                title: indexed.title.clone(),
                tags: indexed.tags.clone(),
            },
            sub_results,
        }
    }
}

#[async_trait]
impl Provider for LocalIndex {
    fn name(&self) -> &str {
        &self.name
    }

    async fn before_search(&self, query: &str) -> Result<(), ProviderError> {
        for term in tokenize(query) {
            self.postings(&term).await;
        }
        Ok(())
    }

    async fn search(
        &self,
        query: &str,
        cancel: CancellationToken,
    ) -> Result<Option<Vec<Reference>>, ProviderError> {
        let terms = tokenize(query);
        if terms.is_empty() {
            return Ok(None);
        }

        let mut pages: BTreeMap<usize, PageHits> = BTreeMap::new();
        for (t, term) in terms.iter().enumerate() {
            let postings = self.postings(term).await;
            if cancel.is_cancelled() {
                return Err(ProviderError::Cancelled);
            }

            for posting in postings.iter() {
                let hits = pages.entry(posting.page).or_default();
                hits.terms.insert(t);
                hits.sections
                    .entry(posting.section)
                    .or_default()
                    .push(self.locate(posting));
            }
        }

        // Every query term must occur somewhere on the page
        let mut ranked: Vec<(usize, &PageHits)> = pages
            .iter()
            .filter(|(_, hits)| hits.terms.len() == terms.len())
            .map(|(page, hits)| (*page, hits))
            .collect();
        ranked.sort_by(|a, b| b.1.score().total_cmp(&a.1.score()));

        debug!(
            "Local index {} matched {} pages for '{}'",
            self.name,
            ranked.len(),
            query
        );
        if cancel.is_cancelled() {
            return Err(ProviderError::Cancelled);
        }

        let fragments = ranked
            .iter()
            .take(self.options.max_pages)
            .map(|(page, hits)| self.fragment(*page, hits, &terms))
            .collect();

        Ok(Some(normalize_batch(
            RawBatch::Index(fragments),
            &self.options,
        )))
    }
}

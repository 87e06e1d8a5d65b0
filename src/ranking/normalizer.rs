//! Flatten, score, rank and trim raw results into references

use super::raw::{NormalizationError, ParentMeta, RawBatch, RawPage, RawSubResult, UNSCORED};
use crate::references::Reference;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

/// Default cap on distinct parent pages
pub const DEFAULT_MAX_PAGES: usize = 30;

/// Default cap on ranked sub-results
pub const DEFAULT_MAX_SUB_RESULTS: usize = 5;

/// Rewrite of backend URLs onto the consuming site's root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrlRewrite {
    /// Base prepended to every rewritten URL
    pub base: String,
    /// Prefix stripped from the backend URL first
    #[serde(default)]
    pub replace: Option<String>,
}

impl UrlRewrite {
    pub fn apply(&self, url: &str) -> String {
        let stripped = match self.replace.as_deref() {
            Some(prefix) if !prefix.is_empty() => url.strip_prefix(prefix).unwrap_or(url),
            _ => url,
        };

        let path = stripped.trim_start_matches('/');
        let base = self.base.trim_end_matches('/');
        if path.is_empty() {
            format!("{}/", base)
        } else {
            format!("{}/{}", base, path)
        }
    }
}

/// Limits and rewrites applied by [`normalize`]
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizeOptions {
    pub max_pages: usize,
    pub max_sub_results: usize,
    pub url_rewrite: Option<UrlRewrite>,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            max_pages: DEFAULT_MAX_PAGES,
            max_sub_results: DEFAULT_MAX_SUB_RESULTS,
            url_rewrite: None,
        }
    }
}

impl NormalizeOptions {
    pub fn with_limits(max_pages: usize, max_sub_results: usize) -> Self {
        Self {
            max_pages,
            max_sub_results,
            url_rewrite: None,
        }
    }

    pub fn with_rewrite(mut self, rewrite: UrlRewrite) -> Self {
        self.url_rewrite = Some(rewrite);
        self
    }
}

/// A flattened sub-result stamped with its parent and score
struct Scored<'a> {
    sub: &'a RawSubResult,
    parent: &'a ParentMeta,
    score: f64,
}

impl Scored<'_> {
    fn shape(&self, rewrite: Option<&UrlRewrite>) -> Reference {
        let titles = if self.sub.title == self.parent.title {
            vec![]
        } else {
            vec![self.parent.title.clone()]
        };

        Reference {
            url: match rewrite {
                Some(rewrite) => rewrite.apply(&self.sub.url),
                None => self.sub.url.clone(),
            },
            title: self.sub.title.clone(),
            titles,
            excerpt: self.sub.excerpt.clone(),
            tags: self.parent.tags.clone(),
        }
    }
}

/// Normalize pages, in backend order, into a ranked reference list.
///
/// Only the first `max_pages` pages are flattened. Sub-results are ranked by
/// their best location score (stable, descending), de-duplicated by URL,
/// trimmed to `max_sub_results`, shaped, then capped at `max_pages` again.
pub fn normalize(pages: &[RawPage], options: &NormalizeOptions) -> Vec<Reference> {
    let mut scored: Vec<Scored<'_>> = pages
        .iter()
        .take(options.max_pages)
        .flat_map(|page| page.sub_results.iter().map(move |sub| (page, sub)))
        .filter_map(|(page, sub)| {
            if sub.url.is_empty() {
                debug!(
                    "Dropping sub-result: {}",
                    NormalizationError::EmptyUrl {
                        title: sub.title.clone()
                    }
                );
                return None;
            }

            let score = sub.best_score().unwrap_or_else(|e| {
                debug!("Unscored sub-result: {}", e);
                UNSCORED
            });

            Some(Scored {
                sub,
                parent: &page.meta,
                score,
            })
        })
        .collect();

    // `sort_by` is stable: equal scores keep page-then-emission order
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut seen = HashSet::new();
    scored
        .iter()
        .filter(|s| seen.insert(s.sub.url.as_str()))
        .take(options.max_sub_results)
        .map(|s| s.shape(options.url_rewrite.as_ref()))
        .take(options.max_pages)
        .collect()
}

/// Convert a backend batch at the boundary and normalize it
pub fn normalize_batch(batch: RawBatch, options: &NormalizeOptions) -> Vec<Reference> {
    normalize(&batch.into_pages(), options)
}

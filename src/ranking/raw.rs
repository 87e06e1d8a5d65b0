//! Raw, pre-normalization result shapes

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Score assigned to sub-results without usable locations
pub const UNSCORED: f64 = -1.0;

/// Problems with a single raw sub-result. Never fatal to the batch.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NormalizationError {
    #[error("sub-result {url:?} has no weighted locations")]
    MissingLocations { url: String },

    #[error("sub-result {title:?} has an empty url")]
    EmptyUrl { title: String },
}

/// One scored occurrence of a query term
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedLocation {
    /// Weight of the field the term was found in
    #[serde(default = "default_weight")]
    pub weight: f64,
    /// Backend-computed relevance of this occurrence
    pub balanced_score: f64,
    /// Word offset within the page
    #[serde(default)]
    pub location: u32,
}

fn default_weight() -> f64 {
    1.0
}

impl WeightedLocation {
    pub fn new(balanced_score: f64) -> Self {
        Self {
            weight: 1.0,
            balanced_score,
            location: 0,
        }
    }
}

/// Metadata of the page a sub-result belongs to
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParentMeta {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeSet<String>>,
}

impl ParentMeta {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            tags: None,
        }
    }
}

/// A single matched excerpt within a page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSubResult {
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub excerpt: Option<String>,
    /// `None` when the backend omitted the location list entirely
    #[serde(default)]
    pub weighted_locations: Option<Vec<WeightedLocation>>,
}

impl RawSubResult {
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            excerpt: None,
            weighted_locations: Some(vec![]),
        }
    }

    pub fn with_excerpt(mut self, excerpt: impl Into<String>) -> Self {
        self.excerpt = Some(excerpt.into());
        self
    }

    pub fn with_scores(mut self, scores: &[f64]) -> Self {
        self.weighted_locations = Some(scores.iter().copied().map(WeightedLocation::new).collect());
        self
    }

    /// Best `balanced_score` over all locations, `UNSCORED` for an empty list
    pub fn best_score(&self) -> Result<f64, NormalizationError> {
        let locations =
            self.weighted_locations
                .as_ref()
                .ok_or_else(|| NormalizationError::MissingLocations {
                    url: self.url.clone(),
                })?;

        Ok(locations
            .iter()
            .fold(UNSCORED, |best, loc| best.max(loc.balanced_score)))
    }
}

/// One matched page with its sub-results, in backend order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPage {
    pub meta: ParentMeta,
    pub sub_results: Vec<RawSubResult>,
}

impl RawPage {
    pub fn new(meta: ParentMeta, sub_results: Vec<RawSubResult>) -> Self {
        Self { meta, sub_results }
    }
}

/// Page fragment produced by the local full-text index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexFragment {
    pub meta: IndexMeta,
    #[serde(default)]
    pub sub_results: Vec<RawSubResult>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexMeta {
    pub title: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Page match as reported by the hosted search API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostedMatch {
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub excerpt: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub sections: Vec<HostedSection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostedSection {
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub excerpt: Option<String>,
    #[serde(default)]
    pub score: Option<f64>,
}

/// Raw results tagged by backend family
#[derive(Debug, Clone, PartialEq)]
pub enum RawBatch {
    Index(Vec<IndexFragment>),
    Hosted(Vec<HostedMatch>),
}

impl RawBatch {
    /// Convert into the backend-agnostic page shape
    pub fn into_pages(self) -> Vec<RawPage> {
        match self {
            RawBatch::Index(fragments) => fragments.into_iter().map(RawPage::from).collect(),
            RawBatch::Hosted(matches) => matches.into_iter().map(RawPage::from).collect(),
        }
    }
}

fn tag_set(tags: Vec<String>) -> Option<BTreeSet<String>> {
    if tags.is_empty() {
        None
    } else {
        Some(tags.into_iter().collect())
    }
}

impl From<IndexFragment> for RawPage {
    fn from(fragment: IndexFragment) -> Self {
        RawPage {
            meta: ParentMeta {
                title: fragment.meta.title,
                tags: tag_set(fragment.meta.tags),
            },
            sub_results: fragment.sub_results,
        }
    }
}

fn hosted_locations(score: Option<f64>) -> Option<Vec<WeightedLocation>> {
    Some(score.map(WeightedLocation::new).into_iter().collect())
}

impl From<HostedMatch> for RawPage {
    fn from(hit: HostedMatch) -> Self {
        let sub_results = if hit.sections.is_empty() {
            // The page itself is the only match
            vec![RawSubResult {
                url: hit.url,
                title: hit.title.clone(),
                excerpt: hit.excerpt,
                weighted_locations: hosted_locations(hit.score),
            }]
        } else {
            hit.sections
                .into_iter()
                .map(|section| RawSubResult {
                    url: section.url,
                    title: section.title,
                    excerpt: section.excerpt,
                    weighted_locations: hosted_locations(section.score),
                })
                .collect()
        };

        RawPage {
            meta: ParentMeta {
                title: hit.title,
                tags: tag_set(hit.tags),
            },
            sub_results,
        }
    }
}

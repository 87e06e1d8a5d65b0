//! Result normalization and ranking
//!
//! Backends report results in their own shapes. Those shapes are converted at
//! the boundary into [`RawPage`]s, which [`normalize`] flattens, scores,
//! re-ranks and trims into the ordered [`Reference`](crate::references::Reference)
//! list the controllers publish.

mod normalizer;
mod raw;

pub use normalizer::{
    normalize, normalize_batch, NormalizeOptions, UrlRewrite, DEFAULT_MAX_PAGES,
    DEFAULT_MAX_SUB_RESULTS,
};
pub use raw::*;

//! Persistence for preprocessed corpus features
//!
//! Only the encoded vectors and their metadata are persisted. Indices are
//! rebuilt from the cached matrices whenever a pipeline starts.

pub mod feature_cache;

pub use feature_cache::{CacheMeta, CachedCorpus, FeatureCache};

//! Seed-Mix Optimizer + Reciprocal Rank Fusion.
//!
//! The optimizer turns `(intent, confidence, policy)` into a weighted
//! Retrieval Config; RRF then fuses per-source ranked lists under that
//! config. Grounded on the teacher's `search::hybrid::reciprocal_rank_fusion`,
//! generalized from two sources to four with per-source weights.

mod rrf;
mod seedmix;

pub use rrf::{early_stop, fuse, RankedItem, Source};
pub use seedmix::{RetrievalConfig, SeedMixOptimizer};

//! Lineage: fingerprints and an append-only record of what was generated
//! from what.
//!
//! Every successful generation appends one [`LineageRecord`] tying the input
//! schema fingerprint and plan hash to the artifact fingerprint. Looking a
//! record up again answers "was this exact request already rendered?".

pub mod hasher;
pub mod record;
pub mod store;

pub use record::LineageRecord;
pub use store::{JsonlLineageStore, LineageStore, MemoryLineageStore};

//! Extraction core for electrical estimating.
//!
//! Turns normalized construction documents (panel schedules, one-line
//! diagrams, motor lists, scope-of-work text) into a deduplicated,
//! code-checked bill of materials, every field carrying a provenance
//! label:
//!
//! document → chunker → orchestrator (cached, concurrent, retried)
//!          → validator → merge engine → derating engine
//!          → bill of materials + flags
//!
//! Document readers, extraction-instruction content, and rendering live
//! outside this crate; the core owns chunking, caching, concurrency,
//! validation, merging, and the compliance arithmetic.

pub mod config;
pub mod derating;
pub mod models;
pub mod pipeline;
pub mod session;

//! Pipeline stages for earnings-metric extraction.
//!
//! Each submodule implements exactly one transformation step.
//! Keeping stages separate makes each independently testable and lets us
//! swap implementations (e.g. a different sentence model or PDF backend)
//! without touching other stages.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ load ──▶ select ──▶ llm ──▶ normalize
//! (guards)  (pdfium)  (salience)  (JSON)   (display)
//! ```
//!
//! 1. [`input`]: resolve a path, URL or upload to checked PDF bytes
//! 2. [`load`]: parse text, tables ([`layout`]) and metadata; runs in
//!    `spawn_blocking` because pdfium is not async-safe
//! 3. [`select`]: keep header sentences, salient sentences ([`segment`])
//!    and mostly-filled tables
//! 4. [`llm`]: one schema-constrained call to the reasoning service;
//!    the only stage with network I/O
//! 5. [`normalize`]: deterministic rules turning raw numbers into display
//!    strings

pub mod input;
pub mod layout;
pub mod llm;
pub mod load;
pub mod normalize;
pub mod segment;
pub mod select;

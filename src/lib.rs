//! graygate: config-driven gray release and experiment decisions.
//!
//! # Architecture Overview
//!
//! ```text
//!   ConfigSource (memory / files)          request path
//!   ─────────────────────────────          ────────────
//!        │ fetch / subscribe               x-gray-* headers
//!        ▼                                      │
//!   config::loader                              ▼
//!   (decode → validate → format)          http::middleware
//!        │                                      │ RequestAttributes
//!        ▼                                      ▼
//!   config::store ── ConfigCell<GrayConfig> ──▶ gray::decision
//!   (env, env_a, env_b ...)   Arc snapshot      │
//!                                               ▼
//!                                   gray::assignment → gray::rule
//!                                   (first match)     (lists, rates,
//!                                                      targets, expression)
//! ```
//!
//! `registry::GrayRegistry` wires the pieces together once at startup and
//! hands out `ExperimentDecision` handles.

pub mod config;
pub mod gray;
pub mod http;
pub mod observability;
pub mod registry;

pub use config::{ConfigGroupStore, EngineSettings, FileSource, MemorySource};
pub use gray::{Cohort, ExperimentDecision, RequestAttributes};
pub use registry::GrayRegistry;

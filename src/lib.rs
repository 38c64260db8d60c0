//! AIR Trust - runtime trust layer for AI agent tool and model calls
//!
//! AIR Trust sits between an agent framework and the tools and models it
//! calls. Every call passes through the trust engine, which decides whether
//! it may proceed, rewrites secrets out of the payload, and records what
//! happened in a tamper-evident ledger.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        Agent framework                            │
//! │        run start / tool call / model call / result / run end      │
//! └───────────────────────────────┬──────────────────────────────────┘
//!                                 │
//! ┌───────────────────────────────▼──────────────────────────────────┐
//! │                          TrustEngine                              │
//! │  ┌──────────────┐  ┌───────────────────┐  ┌──────────────────┐   │
//! │  │ ConsentGate  │  │ InjectionDetector │  │    DataVault     │   │
//! │  │ risk tiers,  │  │ weighted scoring, │  │ reversible       │   │
//! │  │ approvals    │  │ pass/flag/block   │  │ tokenization     │   │
//! │  └──────┬───────┘  └─────────┬─────────┘  └────────┬─────────┘   │
//! │         └────────────────────┼─────────────────────┘             │
//! │                              ▼                                    │
//! │  ┌────────────────────────────────────────────────────────────┐  │
//! │  │                       AuditLedger                           │  │
//! │  │  HMAC-SHA256 signed entries, each linked to the previous    │  │
//! │  └────────────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`engine`]: Lifecycle orchestration
//! - [`ledger`]: Hash-chained audit ledger
//! - [`vault`]: Reversible tokenization of secrets and PII
//! - [`injection`]: Prompt injection detection
//! - [`consent`]: Risk tiers, policies and approvals
//! - [`patterns`]: Detection rule library
//! - [`replay`]: Driving the engine from a recorded event log
//! - [`crypto`]: Signing keys and hashing helpers
//! - [`config`]: Configuration management

pub mod config;
pub mod consent;
pub mod crypto;
pub mod engine;
pub mod error;
pub mod injection;
pub mod ledger;
pub mod patterns;
pub mod replay;
pub mod vault;

pub use config::AirTrustConfig;
pub use engine::{ActionDecision, ActionKind, ActionStart, BlockReason, TrustEngine};
pub use error::{Error, Result};

//! Healing: static-run failure detection and the tiered recovery pipeline.

pub mod orchestrator;
pub mod rewriter;
pub mod static_runner;

pub use orchestrator::{
    detect_drift, AgenticBackend, Drift, HealOutcome, HealTier, HealingOrchestrator,
};
pub use rewriter::{find_test_body, splice_test_body, RewriteDecision, Rewriter};
pub use static_runner::{StaticFailure, StaticRunOutcome, StaticRunner};

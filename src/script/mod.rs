//! Script generation and deterministic replay.

pub mod builder;
pub mod locator;
pub mod replayer;
pub mod sidecar;

pub use builder::{BuiltScript, ScriptBuilder};
pub use locator::build_locator;
pub use replayer::{ReplayError, ScriptReplayer};
pub use sidecar::{RecordedStep, SidecarTest, StepMode, SuiteSidecar};

//! Agentic execution: prompt building, model-output parsing, and the
//! driver state machine.

pub mod driver;
pub mod parse;
pub mod prompt;

pub use driver::{AgenticDriver, DriverOptions, TestRun};
pub use parse::{parse_model_batch, trim_batch, ModelBatch};

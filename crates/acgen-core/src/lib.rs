pub mod config;
pub mod criteria;
pub mod error;
pub mod fetcher;
pub mod history;
pub mod io;
pub mod jira;
mod parse;
pub mod pipeline;
pub mod prompts;
pub mod provider;
pub mod publisher;
pub mod render;
pub mod suite;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{AcgenError, ErrorKind, Result};
pub use pipeline::{CancelHandle, Pipeline, PipelineRun, RunStatus};

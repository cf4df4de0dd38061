//! `acgen-llm`: HTTP drivers for the supported text generation providers.
//!
//! Each provider speaks its own request/response envelope. This crate hides
//! those differences behind one call: a [`GenerateRequest`] goes in, a
//! [`Completion`] carrying plain text comes out.
//!
//! ```text
//! GenerateRequest
//!     │
//!     ▼
//! LlmClient        ← one per ProviderKind, shares a reqwest connection pool
//!     │
//!     ├── gemini   ← candidates[0].content.parts[*].text
//!     ├── claude   ← content[*] where type == "text"
//!     └── openai   ← choices[0].message.content
//!     │
//!     ▼
//! Completion       ← text + model + usage
//! ```
//!
//! Failures are split into [`LlmError::Unavailable`] (transport, timeout,
//! 5xx) and [`LlmError::Rejected`] (auth, quota, unknown model) so callers can
//! tell a flaky network from a misconfigured account.

mod claude;
pub mod client;
pub mod error;
mod gemini;
mod openai;
pub mod types;

pub use client::{LlmClient, ProviderSettings};
pub use error::LlmError;
pub use types::{Completion, GenerateRequest, ProviderKind, TokenUsage};

/// Convenience `Result` alias for this crate.
pub type Result<T> = std::result::Result<T, LlmError>;

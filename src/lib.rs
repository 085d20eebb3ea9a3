//! Upload a short video, ask a question about it, get a model-written analysis.
//!
//! The video is never decoded locally. It is handed to a hosted multimodal
//! model, polled until the service reports it ready, and then analyzed by an
//! agent that can also search the web.

pub mod agent;
pub mod analysis;
pub mod config;
pub mod error;
pub mod gemini;
pub mod handlers;
pub mod models;
pub mod poll;
pub mod prompt;
pub mod remote;
pub mod scratch;
pub mod search;
pub mod system_info;

#[cfg(test)]
pub(crate) mod test_support;

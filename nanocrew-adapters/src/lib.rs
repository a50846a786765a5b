//! The LLM provider collaborator contract.
//!
//! The gateway's lifecycle subsystem never speaks to a concrete provider
//! wire protocol; it only needs a [`traits::ModelAdapter`] to hand to each
//! `AgentInstance` it constructs. Concrete providers (Anthropic, OpenAI,
//! Gemini, Ollama, ...) are external collaborators outside this crate.

#![warn(missing_docs, clippy::pedantic)]

pub mod traits;

//! BES task generation for besengine.
//!
//! This crate turns a recipe into a BES task document: it hashes the
//! installer, resolves every default, builds the XML tree and writes it
//! (e.g., `build_task`).

pub mod action;
pub mod document;
pub mod metadata;
pub mod node;
pub mod pipeline;
pub mod probe;
pub mod relevance;

#[cfg(test)]
mod testutil;

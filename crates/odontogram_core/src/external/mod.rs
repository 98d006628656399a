//! Read-only collaborators owned outside the chart engine.
//!
//! # Responsibility
//! - Define the catalog and identity-directory seams the engine consults.
//! - Provide in-memory implementations for embedding hosts and tests.
//!
//! # Invariants
//! - The engine never writes through these traits.

pub mod catalog;
pub mod directory;

//! Shared foundational types used across the Kiln compiler.
//!
//! This crate provides content hashing for change detection and the
//! tri-state boolean used by compiler options and persisted build state.

#![warn(missing_docs)]

pub mod hash;
pub mod tristate;

pub use hash::ContentHash;
pub use tristate::Tristate;

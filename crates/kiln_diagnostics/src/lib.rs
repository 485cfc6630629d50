//! Diagnostic values produced by the checker and consumed by the incremental engine.
//!
//! This crate provides the structured [`Diagnostic`] with its recursive message
//! chain and related information, the [`Category`] of a diagnostic, the
//! well-known [`DiagnosticMessage`] templates the engine reports itself, and the
//! [`DiagnosticSink`] that gathers diagnostics in stages.

#![warn(missing_docs)]

pub mod category;
pub mod diagnostic;
pub mod message;
pub mod sink;

pub use category::Category;
pub use diagnostic::Diagnostic;
pub use message::DiagnosticMessage;
pub use sink::DiagnosticSink;

//! Shared data model for the sqlmon workspace.
//!
//! Everything that crosses a crate boundary lives here: the typed [`types::Sample`]
//! produced by a stats source, the [`types::MetricValue`] emitted by the rate
//! engine, and the [`classify`] helpers that turn raw driver values into samples.

pub mod classify;
pub mod types;

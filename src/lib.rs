//! Monte Carlo SPICE run orchestration.
//!
//! Builds simulator scripts from a [`request::SimulationRequest`], runs the
//! simulator either streaming ([`runner`]) or in batch mode ([`batch`]), and
//! turns its output into [`record::ResultRecord`]s that [`aggregate`] groups
//! per sweep and seed.

pub mod aggregate;
pub mod batch;
pub mod cancel;
pub mod config;
pub mod error;
pub mod exec;
pub mod output;
pub mod progress;
pub mod record;
pub mod request;
pub mod runner;
pub mod script;
pub mod si;
pub mod stats;

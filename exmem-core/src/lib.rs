//! # exmem Core Library
//!
//! An online decaying-exemplar memory engine for studying word-frequency
//! effects. Every word owns a population of remembered numeric exemplars;
//! each step one word is drawn by frequency, one of its exemplars is drawn
//! by strength and re-stored (optionally drifted), and every strength in
//! the population decays geometrically. An overwrite model, where a word
//! keeps a fixed number of unit-strength exemplars and each step replaces
//! one of them, is available for comparison.
//!
//! - [`store`] — per-word strength traces with decay, pruning, sampling
//! - [`sampler`] — frequency-weighted word choice and the step kernel
//! - [`stats`] — per-group weighted mean/variance, full and incremental
//! - [`simulation`] — burn-in, recording loop, checkpoints
//! - [`batch`] — independent runs fanned out across threads
//!
//! ## Performance Contract
//!
//! - Global decay: O(live strength entries) per step
//! - Pruning: one binary search per value of the chosen word
//! - Statistics update: O(number of groups) per step, independent of
//!   population size

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_precision_loss)]

pub mod batch;
pub mod bins;
pub mod config;
pub mod corpus;
pub mod decay;
pub mod error;
pub mod metrics;
pub mod output;
pub mod population;
pub mod sampler;
pub mod simulation;
pub mod stats;
pub mod store;
pub mod types;

pub use bins::BinScheme;
pub use config::{BatchConfig, ExmemConfig, SimulationConfig};
pub use corpus::Corpus;
pub use decay::DecaySchedule;
pub use error::{ExmemError, Result};
pub use population::Population;
pub use sampler::ModelKind;
pub use simulation::{Phase, RunOutput, Simulation};
pub use stats::{GroupTracker, VarianceBaseline, VarianceForm};
pub use types::*;

//! `dilepton-select` selects same-flavour lepton pairs in collider
//! events and fills weighted histograms for resonance searches.
//!
//! Each event passes through an ordered chain of selection stages.
//! The number of events surviving each stage is recorded in a
//! [cutflow::CutFlow]. Events with a lepton pair candidate are sorted
//! into mutually exclusive [category::Category] classes, weighted with
//! generator weights and correction factors, and histogrammed.
//!
//! # How to use
//!
//! Build an [analysis::Analysis] with [analysis::AnalysisBuilder] from a
//! [config::CutConfig] and a source of [weight::ScaleFactors], then
//! run it over events, e.g. from an [reader::EventReader].
//!
//! ## Most relevant modules
//!
//! - [prelude] exports the most relevant types
//! - [analysis] runs the full selection chain
//! - [selection], [pairs], and [category] for the selection stages
//! - [weight] and [corrections] for event weights
//! - [histogram] for the output histograms
//!

/// Event loop and selection chain
pub mod analysis;
/// Event categories
pub mod category;
/// Cut configuration
pub mod config;
/// Scale factor and pileup tables
pub mod corrections;
/// Selection bookkeeping
pub mod cutflow;
/// Collision event class
pub mod event;
/// Four-vector class
pub mod four_vector;
/// Weighted histograms
pub mod histogram;
/// Certified luminosity blocks
pub mod lumi_mask;
/// Reconstructed physics objects
pub mod object;
/// Lepton pair reconstruction
pub mod pairs;
/// Most important exports
pub mod prelude;
/// Progress bar
pub mod progress_bar;
/// Event readers
pub mod reader;
/// Object selection
pub mod selection;
/// Common traits
pub mod traits;
/// Event weights
pub mod weight;

#[cfg(test)]
mod test_util;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const GIT_REV: Option<&str> = option_env!("VERGEN_GIT_SHA");
pub const GIT_BRANCH: Option<&str> = option_env!("VERGEN_GIT_BRANCH");

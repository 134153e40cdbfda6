//! Access-risk - scores French municipalities on access to care
//!
//! Merges municipal demographics onto boundaries, flags municipalities that no
//! pharmacy or hospital reaches within a radius, and sums the flags into a
//! risk score. The `score` binary drives the pipeline from a TOML file.

pub mod crs;
pub mod enrich;
pub mod io;
pub mod models;
pub mod pipeline;
pub mod progress;

pub use crs::{Crs, CrsError};
pub use models::{DemographicRecord, Municipality, MunicipalitySet, PointCollection, PointFeature};
pub use pipeline::{run_pipeline, CheckpointSink, PipelineInput, PipelineOutput, Projection};

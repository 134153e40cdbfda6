//! The enrichment pipeline as one chain of in-memory stages.
//!
//! Each stage consumes the evolving municipality set and hands the next one
//! its result. Persistence only happens at named checkpoints, through a
//! [`CheckpointSink`], so the whole chain also runs without touching disk.

use std::fmt;
use std::path::PathBuf;

use anyhow::{anyhow, Result};
use hashbrown::HashMap;
use tracing::info;

use crate::crs::Crs;
use crate::enrich::{
    apply_territory_overrides, join_points_to_municipalities, mark_out_of_range,
    merge_demographics, normalize_demographics, score_municipalities, ReachabilityPass,
    ScoreDistribution,
};
use crate::io::{write_municipalities, write_points, Table};
use crate::models::{MunicipalitySet, PointCollection, SCORE_FLAGS};

/// Coordinate systems threaded through every stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Projection {
    /// Metric system used for buffering
    pub metric: Crs,
    /// Geographic system of persisted artifacts
    pub geographic: Crs,
}

impl Default for Projection {
    fn default() -> Self {
        Self {
            metric: Crs::WebMercator,
            geographic: Crs::Wgs84,
        }
    }
}

/// A point where the municipality set is handed to the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage<'a> {
    /// Boundaries with demographics merged on
    Merged,
    /// After the reachability pass writing the named flag
    Flagged(&'a str),
    /// After scoring
    Scored,
    /// After territory geometries were substituted
    Combined,
}

impl fmt::Display for Stage<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Merged => write!(f, "merged"),
            Stage::Flagged(flag) => write!(f, "flagged:{}", flag),
            Stage::Scored => write!(f, "scored"),
            Stage::Combined => write!(f, "combined"),
        }
    }
}

/// Receives the pipeline's intermediate and final artifacts.
pub trait CheckpointSink {
    fn municipalities(&mut self, stage: Stage<'_>, set: &MunicipalitySet) -> Result<()>;

    fn association(&mut self, service: &str, points: &PointCollection) -> Result<()>;
}

/// Discards every checkpoint.
pub struct NoCheckpoints;

impl CheckpointSink for NoCheckpoints {
    fn municipalities(&mut self, _stage: Stage<'_>, _set: &MunicipalitySet) -> Result<()> {
        Ok(())
    }

    fn association(&mut self, _service: &str, _points: &PointCollection) -> Result<()> {
        Ok(())
    }
}

/// Persists checkpoints as GeoJSON in a geographic CRS.
///
/// Every stage before `Combined` overwrites the same scored file; the
/// combined output goes to its own file.
pub struct GeoJsonCheckpoints {
    pub scored: PathBuf,
    pub combined: PathBuf,
    pub associations: HashMap<String, PathBuf>,
    pub output_crs: Crs,
}

impl CheckpointSink for GeoJsonCheckpoints {
    fn municipalities(&mut self, stage: Stage<'_>, set: &MunicipalitySet) -> Result<()> {
        let path = match stage {
            Stage::Combined => &self.combined,
            _ => &self.scored,
        };
        info!("Checkpoint '{}' -> {}", stage, path.display());
        write_municipalities(path, set, self.output_crs)
    }

    fn association(&mut self, service: &str, points: &PointCollection) -> Result<()> {
        match self.associations.get(service) {
            Some(path) => write_points(path, points, self.output_crs),
            None => Ok(()),
        }
    }
}

/// One service category: its points and how far it reaches.
#[derive(Debug, Clone)]
pub struct ServiceInput {
    pub name: String,
    /// `None` when the point source had no geometry column
    pub points: Option<PointCollection>,
    pub pass: ReachabilityPass,
}

/// Everything the pipeline reads, already loaded.
#[derive(Debug, Clone)]
pub struct PipelineInput {
    pub demographics: Table,
    pub boundaries: MunicipalitySet,
    pub services: Vec<ServiceInput>,
    pub territories: Vec<MunicipalitySet>,
}

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// Scored municipalities before territory substitution
    pub scored: MunicipalitySet,
    /// Final municipalities with territory geometries
    pub combined: MunicipalitySet,
    pub distribution: ScoreDistribution,
}

/// Run every stage, in order, handing checkpoints to `sink`.
pub fn run_pipeline(
    input: PipelineInput,
    projection: Projection,
    sink: &mut dyn CheckpointSink,
) -> Result<PipelineOutput> {
    let PipelineInput {
        demographics,
        boundaries,
        services,
        territories,
    } = input;

    let records = normalize_demographics(&demographics);
    let merged = merge_demographics(boundaries, records).to_crs(projection.geographic);
    sink.municipalities(Stage::Merged, &merged)?;

    // Every join runs against the merged set, before any pass can drop rows.
    let mut passes = Vec::with_capacity(services.len());
    for service in services {
        let points = service.points.ok_or_else(|| {
            anyhow!(
                "Service '{}' has no point features; cannot compute '{}'",
                service.name,
                service.pass.flag
            )
        })?;
        info!("Joining {} '{}' points to municipalities", points.len(), service.name);
        let joined = join_points_to_municipalities(&points, &merged);
        sink.association(&service.name, &joined)?;
        passes.push((joined, service.pass));
    }

    let mut set = merged;
    for (joined, pass) in &passes {
        set = mark_out_of_range(set, joined, pass, projection.metric, projection.geographic)?;
        sink.municipalities(Stage::Flagged(&pass.flag), &set)?;
    }

    finish(set, territories, sink)
}

/// Recompute the score of an already flagged set and redo the territory step.
pub fn rescore(
    flagged: MunicipalitySet,
    territories: Vec<MunicipalitySet>,
    projection: Projection,
    sink: &mut dyn CheckpointSink,
) -> Result<PipelineOutput> {
    finish(flagged.to_crs(projection.geographic), territories, sink)
}

fn finish(
    set: MunicipalitySet,
    territories: Vec<MunicipalitySet>,
    sink: &mut dyn CheckpointSink,
) -> Result<PipelineOutput> {
    let (scored, distribution) = score_municipalities(set, &SCORE_FLAGS);
    sink.municipalities(Stage::Scored, &scored)?;

    let combined = apply_territory_overrides(scored.clone(), territories);
    sink.municipalities(Stage::Combined, &combined)?;

    Ok(PipelineOutput {
        scored,
        combined,
        distribution,
    })
}

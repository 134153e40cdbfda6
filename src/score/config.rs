use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use access_risk::crs::Crs;
use access_risk::enrich::{ReachabilityPass, DEFAULT_GEOMETRY_COLUMN};
use access_risk::pipeline::Projection;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub inputs: InputConfig,
    pub outputs: OutputConfig,
    #[serde(default)]
    pub projection: ProjectionConfig,
    pub services: Vec<ServiceConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InputConfig {
    pub demographics: PathBuf,
    pub boundaries: PathBuf,
    #[serde(default)]
    pub territories: Vec<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    pub scored: PathBuf,
    pub combined: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProjectionConfig {
    /// CRS of the WKT coordinates in point files
    #[serde(default = "default_metric")]
    pub points: Crs,
    #[serde(default = "default_metric")]
    pub metric: Crs,
    #[serde(default)]
    pub output: Crs,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            points: default_metric(),
            metric: default_metric(),
            output: Crs::Wgs84,
        }
    }
}

impl ProjectionConfig {
    pub fn projection(&self) -> Projection {
        Projection {
            metric: self.metric,
            geographic: self.output,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub name: String,
    pub points: PathBuf,
    #[serde(default = "default_geometry_column")]
    pub geometry_column: String,
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    pub radius_m: f64,
    pub flag: String,
    /// Where the point/municipality association is written, if anywhere
    pub association: Option<PathBuf>,
}

impl ServiceConfig {
    pub fn pass(&self) -> ReachabilityPass {
        ReachabilityPass::new(self.flag.clone(), self.radius_m)
    }

    pub fn delimiter_byte(&self) -> Result<u8> {
        u8::try_from(self.delimiter)
            .ok()
            .filter(u8::is_ascii)
            .with_context(|| {
                format!(
                    "Service '{}': delimiter {:?} is not a single ASCII character",
                    self.name, self.delimiter
                )
            })
    }
}

fn default_metric() -> Crs {
    Crs::WebMercator
}

fn default_geometry_column() -> String {
    DEFAULT_GEOMETRY_COLUMN.to_string()
}

fn default_delimiter() -> char {
    ','
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path).context("Failed to read config file")?;
        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.outputs.scored == self.outputs.combined {
            bail!(
                "outputs.scored and outputs.combined must differ ({})",
                self.outputs.scored.display()
            );
        }
        if !self.projection.metric.is_metric() {
            bail!("projection.metric {} is not a metric CRS", self.projection.metric);
        }
        for (i, service) in self.services.iter().enumerate() {
            if self.services[..i].iter().any(|s| s.name == service.name) {
                bail!("Duplicate service name '{}'", service.name);
            }
            service.delimiter_byte()?;
        }
        Ok(())
    }
}

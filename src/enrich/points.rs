//! WKT point tables to point collections.

use geo::{Geometry, Point};
use thiserror::Error;
use tracing::{debug, info, warn};
use wkt::TryFromWkt;

use crate::crs::Crs;
use crate::io::Table;
use crate::models::PointCollection;

/// Geometry column of the service point exports.
pub const DEFAULT_GEOMETRY_COLUMN: &str = "the_geom";

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PointParseError {
    #[error("empty geometry")]
    Empty,

    #[error("invalid WKT '{text}': {reason}")]
    InvalidWkt { text: String, reason: String },

    #[error("not a point: '{0}'")]
    NotAPoint(String),
}

/// Parse the WKT column of `table` into points declared in `crs`.
///
/// All other columns are discarded and no reprojection happens here: the
/// declared system is assumed to match the data. Returns `None` when the
/// geometry column is absent, which is a no-op rather than an error.
/// Rows whose WKT cannot be parsed into a point are skipped.
pub fn points_from_table(table: &Table, geometry_column: &str, crs: Crs) -> Option<PointCollection> {
    let Some(idx) = table.column(geometry_column) else {
        warn!(
            "No '{}' column in point table; no conversion performed",
            geometry_column
        );
        return None;
    };

    let mut skipped = 0usize;
    let points: Vec<Point<f64>> = table
        .rows
        .iter()
        .enumerate()
        .filter_map(|(row, cells)| {
            let raw = cells.get(idx).map(String::as_str).unwrap_or("");
            match parse_point(raw) {
                Ok(point) => Some(point),
                Err(reason) => {
                    debug!("Row {}: {}", row + 1, reason);
                    skipped += 1;
                    None
                }
            }
        })
        .collect();

    if skipped > 0 {
        warn!("Skipped {} rows with unusable '{}' values", skipped, geometry_column);
    }
    info!("Converted {} point features ({})", points.len(), crs);

    Some(PointCollection::from_points(crs, points))
}

/// Parse one WKT (or PostGIS EWKT) value into a point.
pub fn parse_point(raw: &str) -> Result<Point<f64>, PointParseError> {
    let text = raw.trim();
    let text = match text.split_once(';') {
        Some((srid, rest)) if srid.to_ascii_uppercase().starts_with("SRID=") => rest,
        _ => text,
    };

    if text.is_empty() {
        return Err(PointParseError::Empty);
    }

    let geometry =
        Geometry::<f64>::try_from_wkt_str(text).map_err(|e| PointParseError::InvalidWkt {
            text: text.to_string(),
            reason: e.to_string(),
        })?;

    match geometry {
        Geometry::Point(p) => Ok(p),
        Geometry::MultiPoint(mp) if mp.0.len() == 1 => Ok(mp.0[0]),
        _ => Err(PointParseError::NotAPoint(text.to_string())),
    }
}

//! Spatial join of service points to the municipalities they fall in.

use geo::{Intersects, MultiPolygon};
use tracing::{debug, info};

use super::index::EnvelopeIndex;
use crate::crs::reproject;
use crate::models::{MunicipalitySet, PointCollection, PointFeature};
use crate::progress::progress_bar;

/// Left-join every point to the municipalities it intersects.
///
/// The point collection's CRS is authoritative; municipalities are
/// reprojected into it when the systems differ. A point on a shared border
/// yields one row per municipality, and a point outside every municipality
/// yields one row with null codes. Only the point geometry and the
/// `codgeo`/`dep`/`reg` codes are kept.
pub fn join_points_to_municipalities(
    points: &PointCollection,
    municipalities: &MunicipalitySet,
) -> PointCollection {
    if municipalities.crs != points.crs {
        debug!(
            "Reprojecting municipalities from {} to {} for the join",
            municipalities.crs, points.crs
        );
    }

    let geometries: Vec<MultiPolygon<f64>> = municipalities
        .iter()
        .map(|m| reproject(&m.geometry, municipalities.crs, points.crs))
        .collect();
    let index = EnvelopeIndex::build(&geometries);

    let pb = progress_bar(points.len(), "spatial join");
    let mut joined = Vec::with_capacity(points.len());
    let mut orphans = 0usize;

    for feature in &points.features {
        pb.inc(1);
        let point = feature.geometry;

        let before = joined.len();
        for i in index.candidates_at(point.x(), point.y()) {
            if geometries[i].intersects(&point) {
                let m = &municipalities.municipalities[i];
                joined.push(PointFeature {
                    geometry: point,
                    codgeo: Some(m.codgeo.clone()),
                    dep: m.attribute_code("dep"),
                    reg: m.attribute_code("reg"),
                });
            }
        }

        if joined.len() == before {
            orphans += 1;
            joined.push(PointFeature::new(point));
        }
    }
    pb.finish_and_clear();

    info!(
        "Joined {} points into {} rows ({} outside every municipality)",
        points.len(),
        joined.len(),
        orphans
    );

    PointCollection::new(points.crs, joined)
}

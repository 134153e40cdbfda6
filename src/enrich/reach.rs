//! Service reachability: buffer service points, union the buffers into a
//! coverage region, flag municipalities the region does not touch.
//!
//! Distances are only meaningful in a metric system, so both collections are
//! reprojected into one before buffering and the municipalities are returned
//! in the caller's geographic system.

use anyhow::{bail, Result};
use geo::{unary_union, Buffer, BoundingRect, Intersects, MultiPolygon, Point, Validation};
use tracing::{debug, info, warn};

use super::index::EnvelopeIndex;
use crate::crs::{reproject, Crs};
use crate::models::{MunicipalitySet, PointCollection};
use crate::progress::progress_bar;

/// One reachability pass: which flag column to write and how far service reaches.
#[derive(Debug, Clone, PartialEq)]
pub struct ReachabilityPass {
    /// Output boolean column (true = out of range)
    pub flag: String,

    /// Service radius in units of the metric CRS (meters)
    pub radius_m: f64,
}

impl ReachabilityPass {
    pub fn new(flag: impl Into<String>, radius_m: f64) -> Self {
        Self {
            flag: flag.into(),
            radius_m,
        }
    }
}

/// Union of the buffered service points, in the metric CRS it was built in.
pub struct CoverageRegion {
    region: MultiPolygon<f64>,
    index: EnvelopeIndex,
}

impl CoverageRegion {
    /// Buffer every point by `radius` and union the buffers.
    ///
    /// No points, or a zero radius, gives an empty region that intersects nothing.
    pub fn build(points: &[Point<f64>], radius: f64) -> Self {
        // A zero-distance buffer around a point has no area.
        let to_buffer = if radius > 0.0 { points } else { &[] };

        let pb = progress_bar(to_buffer.len(), "buffering");
        let buffers: Vec<MultiPolygon<f64>> = to_buffer
            .iter()
            .map(|p| {
                pb.inc(1);
                p.buffer(radius)
            })
            .collect();
        pb.finish_and_clear();

        let region = if buffers.is_empty() {
            MultiPolygon::new(vec![])
        } else {
            unary_union(&buffers)
        };
        let index = EnvelopeIndex::build(&region.0);
        debug!("Coverage region has {} parts", region.0.len());

        Self { region, index }
    }

    pub fn is_empty(&self) -> bool {
        self.region.0.is_empty()
    }

    pub fn intersects(&self, geometry: &MultiPolygon<f64>) -> bool {
        let Some(rect) = geometry.bounding_rect() else {
            return false;
        };
        self.index
            .candidates_in(rect)
            .into_iter()
            .any(|i| geometry.intersects(&self.region.0[i]))
    }
}

/// Flag every municipality that no service point reaches within the radius.
///
/// Municipalities and points failing the validity check are excluded, and
/// such municipalities are absent from the returned set; so are
/// municipalities without geometry. An empty point set or a zero radius
/// flags every remaining municipality.
pub fn mark_out_of_range(
    municipalities: MunicipalitySet,
    points: &PointCollection,
    pass: &ReachabilityPass,
    metric_crs: Crs,
    geographic_crs: Crs,
) -> Result<MunicipalitySet> {
    if !metric_crs.is_metric() {
        bail!("{} is not a metric CRS; cannot buffer in meters", metric_crs);
    }
    if !pass.radius_m.is_finite() || pass.radius_m < 0.0 {
        bail!(
            "Invalid radius {} for '{}': must be a finite, non-negative distance",
            pass.radius_m,
            pass.flag
        );
    }

    let mut set = municipalities.to_crs(metric_crs);

    let before = set.len();
    set.municipalities.retain(|m| {
        if m.geometry.0.is_empty() {
            warn!("Excluding {}: no geometry", m.codgeo);
            return false;
        }
        let valid = m.geometry.is_valid();
        if !valid {
            warn!("Excluding {}: invalid geometry", m.codgeo);
        }
        valid
    });
    if set.len() < before {
        warn!("Excluded {} municipalities with invalid or missing geometry", before - set.len());
    }

    let service_points: Vec<Point<f64>> = points
        .features
        .iter()
        .map(|f| reproject(&f.geometry, points.crs, metric_crs))
        .filter(|p| p.is_valid())
        .collect();
    if service_points.len() < points.len() {
        warn!(
            "Excluded {} invalid service points",
            points.len() - service_points.len()
        );
    }

    let coverage = CoverageRegion::build(&service_points, pass.radius_m);
    if coverage.is_empty() {
        warn!("Empty coverage region for '{}': every municipality is out of range", pass.flag);
    }

    let mut out_of_range = 0usize;
    for m in &mut set.municipalities {
        let flagged = !coverage.intersects(&m.geometry);
        if flagged {
            out_of_range += 1;
        }
        m.set_flag(&pass.flag, flagged);
    }

    info!(
        "'{}': {} of {} municipalities beyond {} m of {} service points",
        pass.flag,
        out_of_range,
        set.len(),
        pass.radius_m,
        service_points.len()
    );

    Ok(set.to_crs(geographic_crs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Municipality, OUT_OF_RANGE_HOSPITAL, OUT_OF_RANGE_PHARMACY};
    use geo::{polygon, LineString, Polygon};
    use serde_json::Map;

    /// A square of `size` meters centred on (cx, cy) in Web Mercator.
    fn square(code: &str, cx: f64, cy: f64, size: f64) -> Municipality {
        let h = size / 2.0;
        let p = polygon![
            (x: cx - h, y: cy - h),
            (x: cx + h, y: cy - h),
            (x: cx + h, y: cy + h),
            (x: cx - h, y: cy + h),
        ];
        Municipality::new(code.to_string(), MultiPolygon::new(vec![p]), Map::new())
    }

    fn bowtie(code: &str) -> Municipality {
        let ring = LineString::from(vec![(0.0, 0.0), (100.0, 100.0), (100.0, 0.0), (0.0, 100.0), (0.0, 0.0)]);
        Municipality::new(code.to_string(), MultiPolygon::new(vec![Polygon::new(ring, vec![])]), Map::new())
    }

    fn municipalities() -> MunicipalitySet {
        MunicipalitySet::new(
            Crs::WebMercator,
            vec![
                square("near", 0.0, 0.0, 2000.0),
                square("mid", 8000.0, 0.0, 2000.0),
                square("far", 30000.0, 0.0, 2000.0),
            ],
        )
    }

    fn pharmacies(points: &[(f64, f64)]) -> PointCollection {
        PointCollection::from_points(
            Crs::WebMercator,
            points.iter().map(|&(x, y)| Point::new(x, y)),
        )
    }

    fn run(set: MunicipalitySet, points: &PointCollection, radius: f64) -> MunicipalitySet {
        let pass = ReachabilityPass::new(OUT_OF_RANGE_PHARMACY, radius);
        mark_out_of_range(set, points, &pass, Crs::WebMercator, Crs::Wgs84).unwrap()
    }

    fn flagged(set: &MunicipalitySet) -> Vec<&str> {
        set.iter()
            .filter(|m| m.flag(OUT_OF_RANGE_PHARMACY))
            .map(|m| m.codgeo.as_str())
            .collect()
    }

    #[test]
    fn test_point_at_centroid_is_in_range() {
        let set = MunicipalitySet::new(Crs::WebMercator, vec![square("01001", 0.0, 0.0, 2000.0)]);
        let points = pharmacies(&[(0.0, 0.0)]);

        let wide = run(set.clone(), &points, 5000.0);
        assert!(!wide.municipalities[0].flag(OUT_OF_RANGE_PHARMACY));

        // The point itself lies inside the polygon, so even 1 m reaches it.
        let narrow = run(set, &points, 1.0);
        assert!(!narrow.municipalities[0].flag(OUT_OF_RANGE_PHARMACY));
    }

    #[test]
    fn test_outside_point_needs_radius() {
        let set = MunicipalitySet::new(Crs::WebMercator, vec![square("01001", 0.0, 0.0, 2000.0)]);
        let points = pharmacies(&[(4000.0, 0.0)]);

        assert!(run(set.clone(), &points, 1.0).municipalities[0].flag(OUT_OF_RANGE_PHARMACY));
        assert!(!run(set, &points, 5000.0).municipalities[0].flag(OUT_OF_RANGE_PHARMACY));
    }

    #[test]
    fn test_empty_points_flag_everything() {
        let result = run(municipalities(), &pharmacies(&[]), 5000.0);
        assert_eq!(flagged(&result), vec!["near", "mid", "far"]);
    }

    #[test]
    fn test_covering_buffer_flags_nothing() {
        let result = run(municipalities(), &pharmacies(&[(10000.0, 0.0)]), 50000.0);
        assert!(flagged(&result).is_empty());
    }

    #[test]
    fn test_radius_is_monotonic() {
        let points = pharmacies(&[(0.0, 0.0)]);
        let mut previous = usize::MAX;
        for radius in [1.0, 1000.0, 7500.0, 20000.0, 40000.0] {
            let count = flagged(&run(municipalities(), &points, radius)).len();
            assert!(count <= previous, "radius {} flagged {} > {}", radius, count, previous);
            previous = count;
        }
        assert_eq!(previous, 0);
    }

    #[test]
    fn test_partial_coverage() {
        let result = run(municipalities(), &pharmacies(&[(0.0, 0.0)]), 5000.0);
        assert_eq!(flagged(&result), vec!["mid", "far"]);
    }

    #[test]
    fn test_invalid_geometries_are_excluded() {
        let mut set = municipalities();
        set.municipalities.push(bowtie("bowtie"));
        let points = PointCollection::from_points(
            Crs::WebMercator,
            vec![Point::new(f64::NAN, 0.0), Point::new(0.0, 0.0)],
        );

        let result = run(set, &points, 5000.0);
        let codes: Vec<&str> = result.iter().map(|m| m.codgeo.as_str()).collect();
        assert_eq!(codes, vec!["near", "mid", "far"]);
        assert_eq!(flagged(&result), vec!["mid", "far"]);
    }

    #[test]
    fn test_missing_geometry_is_excluded() {
        let mut set = municipalities();
        set.municipalities
            .push(Municipality::new("empty".to_string(), MultiPolygon::new(vec![]), Map::new()));

        let result = run(set, &pharmacies(&[(0.0, 0.0)]), 5000.0);
        assert!(result.find("empty").is_none());
        assert_eq!(result.len(), 3);
    }

    #[test]
    fn test_zero_radius_flags_everything() {
        let set = MunicipalitySet::new(Crs::WebMercator, vec![square("01001", 0.0, 0.0, 2000.0)]);
        let result = run(set, &pharmacies(&[(0.0, 0.0)]), 0.0);
        assert!(result.municipalities[0].flag(OUT_OF_RANGE_PHARMACY));
    }

    #[test]
    fn test_result_is_geographic_and_keeps_prior_flags() {
        let first = run(municipalities(), &pharmacies(&[(0.0, 0.0)]), 5000.0);
        assert_eq!(first.crs, Crs::Wgs84);

        let hospitals = pharmacies(&[(30000.0, 0.0)]);
        let pass = ReachabilityPass::new(OUT_OF_RANGE_HOSPITAL, 15000.0);
        let second = mark_out_of_range(first, &hospitals, &pass, Crs::WebMercator, Crs::Wgs84).unwrap();

        let near = second.find("near").unwrap();
        assert!(!near.flag(OUT_OF_RANGE_PHARMACY));
        assert!(near.flag(OUT_OF_RANGE_HOSPITAL));
        let mid = second.find("mid").unwrap();
        assert!(mid.flag(OUT_OF_RANGE_PHARMACY));
        assert!(mid.flag(OUT_OF_RANGE_HOSPITAL));
        let far = second.find("far").unwrap();
        assert!(far.flag(OUT_OF_RANGE_PHARMACY));
        assert!(!far.flag(OUT_OF_RANGE_HOSPITAL));
    }

    #[test]
    fn test_rejects_non_metric_crs_and_bad_radius() {
        let points = pharmacies(&[]);
        let pass = ReachabilityPass::new(OUT_OF_RANGE_PHARMACY, 5000.0);
        assert!(mark_out_of_range(municipalities(), &points, &pass, Crs::Wgs84, Crs::Wgs84).is_err());

        let pass = ReachabilityPass::new(OUT_OF_RANGE_PHARMACY, -1.0);
        assert!(mark_out_of_range(municipalities(), &points, &pass, Crs::WebMercator, Crs::Wgs84).is_err());

        let pass = ReachabilityPass::new(OUT_OF_RANGE_PHARMACY, f64::NAN);
        assert!(mark_out_of_range(municipalities(), &points, &pass, Crs::WebMercator, Crs::Wgs84).is_err());
    }
}

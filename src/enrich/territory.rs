//! Geometry overrides for outlying territories.
//!
//! Some territories are drawn relocated or simplified in the national
//! boundary file. Authoritative geometries replace them by administrative
//! code; every other attribute and every row stays as it was.

use geo::MultiPolygon;
use hashbrown::{HashMap, HashSet};
use tracing::{debug, info};

use crate::crs::reproject;
use crate::models::MunicipalitySet;

/// Replace base geometries with territory geometries sharing their code.
///
/// Territory collections are concatenated in order; when a code appears more
/// than once the first geometry wins. Codes absent from `base` are ignored.
pub fn apply_territory_overrides(
    mut base: MunicipalitySet,
    territories: Vec<MunicipalitySet>,
) -> MunicipalitySet {
    let mut overrides: HashMap<String, MultiPolygon<f64>> = HashMap::new();
    for territory in territories {
        let crs = territory.crs;
        // A territory row without geometry never overrides anything.
        for t in territory.municipalities.into_iter().filter(|t| !t.geometry.0.is_empty()) {
            overrides
                .entry(t.codgeo)
                .or_insert_with(|| reproject(&t.geometry, crs, base.crs));
        }
    }

    let mut replaced = 0usize;
    for m in &mut base.municipalities {
        if let Some(geometry) = overrides.get(&m.codgeo) {
            m.geometry = geometry.clone();
            replaced += 1;
        }
    }

    let unused = {
        let base_codes: HashSet<&str> = base.iter().map(|m| m.codgeo.as_str()).collect();
        overrides
            .keys()
            .filter(|code| !base_codes.contains(code.as_str()))
            .count()
    };
    if unused > 0 {
        debug!("{} territory codes have no base municipality", unused);
    }
    info!(
        "Replaced {} of {} geometries from {} territory features",
        replaced,
        base.len(),
        overrides.len()
    );

    base
}

//! Service point features (pharmacies, hospitals...).

use geo::Point;

use crate::crs::{reproject, Crs};

/// A service point, optionally associated with its enclosing municipality.
#[derive(Debug, Clone, PartialEq)]
pub struct PointFeature {
    pub geometry: Point<f64>,

    /// Administrative code of the enclosing municipality
    pub codgeo: Option<String>,

    /// Department code of the enclosing municipality
    pub dep: Option<String>,

    /// Region code of the enclosing municipality
    pub reg: Option<String>,
}

impl PointFeature {
    pub fn new(geometry: Point<f64>) -> Self {
        Self {
            geometry,
            codgeo: None,
            dep: None,
            reg: None,
        }
    }
}

/// A point collection with its declared coordinate reference system.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCollection {
    pub crs: Crs,
    pub features: Vec<PointFeature>,
}

impl PointCollection {
    pub fn new(crs: Crs, features: Vec<PointFeature>) -> Self {
        Self { crs, features }
    }

    pub fn from_points(crs: Crs, points: impl IntoIterator<Item = Point<f64>>) -> Self {
        Self::new(crs, points.into_iter().map(PointFeature::new).collect())
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn to_crs(mut self, target: Crs) -> Self {
        if self.crs != target {
            for f in &mut self.features {
                f.geometry = reproject(&f.geometry, self.crs, target);
            }
            self.crs = target;
        }
        self
    }
}

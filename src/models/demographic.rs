//! Demographic and health-professional attributes of a municipality.

use serde::{Deserialize, Serialize};

/// Doctors per this many inhabitants below which a municipality is at risk.
pub const DOCTORS_PER_INHABITANTS: f64 = 2000.0;

/// One row of the demographic source, keyed by administrative code.
///
/// Numeric fields are stored as `f64` because the source may carry decimals
/// or placeholders; anything non-numeric has already been coerced to zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DemographicRecord {
    pub codgeo: String,
    pub name: String,
    pub elder_care_facilities: f64,
    pub population: f64,
    pub emergency_visits: f64,
    pub generalists: f64,
    pub dentists: f64,
    pub physiotherapists: f64,
    pub nurses: f64,
    pub pharmacies: f64,
    pub doctors_per_2000: f64,
    pub at_risk: bool,
}

impl DemographicRecord {
    /// Recompute `doctors_per_2000` and `at_risk` from population and generalists.
    ///
    /// Scarcity is undefined without inhabitants, so an empty municipality is
    /// reported with zero density and is never at risk.
    pub fn derive_scarcity(&mut self) {
        if self.population > 0.0 {
            self.doctors_per_2000 = self.generalists * DOCTORS_PER_INHABITANTS / self.population;
            self.at_risk = self.doctors_per_2000 < 1.0;
        } else {
            self.doctors_per_2000 = 0.0;
            self.at_risk = false;
        }
    }

    /// The zero/false record attached to a boundary with no demographic match.
    pub fn unmatched(codgeo: &str) -> Self {
        Self {
            codgeo: codgeo.to_string(),
            ..Self::default()
        }
    }
}

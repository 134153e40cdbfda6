//! Municipality records: boundary geometry enriched with demographics and
//! the risk flags computed by the enrichment stages.

use std::collections::BTreeMap;

use geo::MultiPolygon;
use serde_json::{Map, Value};

use super::DemographicRecord;
use crate::crs::{reproject, Crs};

/// Scarcity flag column.
pub const AT_RISK: &str = "at_risk";
/// Flag column written by the pharmacy reachability pass.
pub const OUT_OF_RANGE_PHARMACY: &str = "out_of_range_pharmacy";
/// Flag column written by the hospital reachability pass.
pub const OUT_OF_RANGE_HOSPITAL: &str = "out_of_range_hospital";

/// The flags counted by the composite score.
pub const SCORE_FLAGS: [&str; 3] = [AT_RISK, OUT_OF_RANGE_PHARMACY, OUT_OF_RANGE_HOSPITAL];

/// A municipality boundary and everything the pipeline attaches to it.
#[derive(Debug, Clone, PartialEq)]
pub struct Municipality {
    /// Administrative code (primary key)
    pub codgeo: String,

    pub geometry: MultiPolygon<f64>,

    /// Non-key properties carried by the boundary feature (`dep`, `reg`, labels...)
    pub attributes: Map<String, Value>,

    /// Left-joined demographics; zeroed when the join found no match
    pub demographics: DemographicRecord,

    /// Whether `demographics` came from the source or is the zero default
    pub demographics_matched: bool,

    /// Reachability flags keyed by column name (true = out of range)
    pub out_of_range: BTreeMap<String, bool>,

    /// Composite score, set once by the score stage
    pub score: Option<u8>,
}

impl Municipality {
    pub fn new(codgeo: String, geometry: MultiPolygon<f64>, attributes: Map<String, Value>) -> Self {
        Self {
            demographics: DemographicRecord::unmatched(&codgeo),
            codgeo,
            geometry,
            attributes,
            demographics_matched: false,
            out_of_range: BTreeMap::new(),
            score: None,
        }
    }

    pub fn at_risk(&self) -> bool {
        self.demographics.at_risk
    }

    /// Read a boolean flag by column name; absent flags read as false.
    pub fn flag(&self, name: &str) -> bool {
        if name == AT_RISK {
            return self.at_risk();
        }
        self.out_of_range.get(name).copied().unwrap_or(false)
    }

    pub fn set_flag(&mut self, name: &str, value: bool) {
        if name == AT_RISK {
            self.demographics.at_risk = value;
        } else {
            self.out_of_range.insert(name.to_string(), value);
        }
    }

    /// A boundary attribute as a code string (`dep`, `reg`...).
    pub fn attribute_code(&self, key: &str) -> Option<String> {
        self.attributes.get(key).and_then(code_from_value)
    }
}

/// The evolving municipality collection passed between stages.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MunicipalitySet {
    pub crs: Crs,
    pub municipalities: Vec<Municipality>,
}

impl MunicipalitySet {
    pub fn new(crs: Crs, municipalities: Vec<Municipality>) -> Self {
        Self { crs, municipalities }
    }

    pub fn len(&self) -> usize {
        self.municipalities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.municipalities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Municipality> {
        self.municipalities.iter()
    }

    /// Reproject every geometry into `target`.
    pub fn to_crs(mut self, target: Crs) -> Self {
        if self.crs != target {
            for m in &mut self.municipalities {
                m.geometry = reproject(&m.geometry, self.crs, target);
            }
            self.crs = target;
        }
        self
    }

    pub fn find(&self, codgeo: &str) -> Option<&Municipality> {
        self.municipalities.iter().find(|m| m.codgeo == codgeo)
    }
}

/// Normalize a JSON key value into a code string.
///
/// Codes may arrive as strings or numbers depending on the producer; both
/// compare as trimmed strings.
pub fn code_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

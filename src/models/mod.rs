//! Core data models for the access-risk pipeline.

pub mod demographic;
pub mod municipality;
pub mod point;

pub use demographic::DemographicRecord;
pub use municipality::{
    code_from_value, Municipality, MunicipalitySet, AT_RISK, OUT_OF_RANGE_HOSPITAL,
    OUT_OF_RANGE_PHARMACY, SCORE_FLAGS,
};
pub use point::{PointCollection, PointFeature};

//! Enrichment stages, in pipeline order.

pub mod index;
pub mod join;
pub mod merge;
pub mod normalize;
pub mod points;
pub mod reach;
pub mod score;
pub mod territory;

pub use join::join_points_to_municipalities;
pub use merge::merge_demographics;
pub use normalize::normalize_demographics;
pub use points::{parse_point, points_from_table, PointParseError, DEFAULT_GEOMETRY_COLUMN};
pub use reach::{mark_out_of_range, CoverageRegion, ReachabilityPass};
pub use score::{score_municipalities, ScoreDistribution};
pub use territory::apply_territory_overrides;

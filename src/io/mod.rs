//! File-format collaborators: delimited tables in, GeoJSON in and out.

pub mod collection;
pub mod tabular;

pub use collection::{
    read_boundaries, read_municipalities, write_municipalities, write_points, BOUNDARY_KEY,
    TERRITORY_KEY,
};
pub use tabular::{load_table, read_table, Table};

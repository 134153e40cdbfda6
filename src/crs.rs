//! Coordinate reference systems and reprojection.
//!
//! Every supported system converts to and from geographic lon/lat, so any
//! pair can be reprojected through that pivot without an external PROJ
//! installation.

use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};
use std::fmt;
use std::str::FromStr;

use geo::{Coord, MapCoords};
use serde::Deserialize;
use thiserror::Error;

/// WGS84 semi-major axis, also the sphere radius used by Web Mercator.
const EARTH_RADIUS_M: f64 = 6_378_137.0;

/// Latitude at which Web Mercator becomes a square world.
const MERCATOR_MAX_LAT: f64 = 85.051_128_779_806_6;

// IGN constants for Lambert-93 (RGF93 / GRS80, standard parallels 44°N and 49°N).
const LAMBERT93_E: f64 = 0.081_819_191_042_815_8;
const LAMBERT93_N: f64 = 0.725_607_765_053_267;
const LAMBERT93_C: f64 = 11_754_255.426_096;
const LAMBERT93_XS: f64 = 700_000.0;
const LAMBERT93_YS: f64 = 12_655_612.049_876;
const LAMBERT93_LON0_DEG: f64 = 3.0;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CrsError {
    #[error("unrecognized coordinate reference system '{0}'")]
    Unrecognized(String),

    #[error("EPSG:{0} is not a supported coordinate reference system")]
    Unsupported(u32),
}

/// A coordinate reference system the pipeline knows how to reproject.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub enum Crs {
    /// Geographic lon/lat degrees (EPSG:4326)
    #[default]
    Wgs84,
    /// Spherical "pseudo" Mercator in projected meters (EPSG:3857)
    WebMercator,
    /// French conformal conic projection in meters (EPSG:2154)
    Lambert93,
}

impl Crs {
    pub fn from_epsg(code: u32) -> Result<Self, CrsError> {
        match code {
            4326 => Ok(Crs::Wgs84),
            3857 | 900913 | 102100 => Ok(Crs::WebMercator),
            2154 => Ok(Crs::Lambert93),
            other => Err(CrsError::Unsupported(other)),
        }
    }

    pub fn epsg(&self) -> u32 {
        match self {
            Crs::Wgs84 => 4326,
            Crs::WebMercator => 3857,
            Crs::Lambert93 => 2154,
        }
    }

    /// Whether distances in this system are expressed in meters.
    pub fn is_metric(&self) -> bool {
        !matches!(self, Crs::Wgs84)
    }

    /// The OGC URN written in a GeoJSON legacy `crs` member.
    pub fn urn(&self) -> String {
        format!("urn:ogc:def:crs:EPSG::{}", self.epsg())
    }

    /// Convert a coordinate in this system to geographic lon/lat degrees.
    pub fn to_lon_lat(&self, c: Coord<f64>) -> Coord<f64> {
        match self {
            Crs::Wgs84 => c,
            Crs::WebMercator => Coord {
                x: (c.x / EARTH_RADIUS_M).to_degrees(),
                y: (2.0 * (c.y / EARTH_RADIUS_M).exp().atan() - FRAC_PI_2).to_degrees(),
            },
            Crs::Lambert93 => lambert93_inverse(c),
        }
    }

    /// Convert a geographic lon/lat coordinate into this system.
    pub fn from_lon_lat(&self, c: Coord<f64>) -> Coord<f64> {
        match self {
            Crs::Wgs84 => c,
            Crs::WebMercator => {
                let lat = c.y.clamp(-MERCATOR_MAX_LAT, MERCATOR_MAX_LAT).to_radians();
                Coord {
                    x: EARTH_RADIUS_M * c.x.to_radians(),
                    y: EARTH_RADIUS_M * (FRAC_PI_4 + lat / 2.0).tan().ln(),
                }
            }
            Crs::Lambert93 => lambert93_forward(c),
        }
    }

    /// Reproject a single coordinate from `self` into `target`.
    pub fn transform(&self, target: Crs, c: Coord<f64>) -> Coord<f64> {
        if *self == target {
            return c;
        }
        target.from_lon_lat(self.to_lon_lat(c))
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg())
    }
}

impl FromStr for Crs {
    type Err = CrsError;

    /// Accepts `EPSG:3857`, bare codes, and the OGC URN forms GeoJSON files carry.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let upper = trimmed.to_ascii_uppercase();

        if upper.ends_with("CRS84") {
            return Ok(Crs::Wgs84);
        }

        let code = upper
            .rsplit(|ch| ch == ':' || ch == '/')
            .next()
            .unwrap_or_default();

        let known_prefix = upper.starts_with("EPSG:")
            || upper.starts_with("URN:OGC:DEF:CRS:EPSG:")
            || upper.chars().all(|ch| ch.is_ascii_digit());

        match (known_prefix, code.parse::<u32>()) {
            (true, Ok(code)) => Crs::from_epsg(code),
            _ => Err(CrsError::Unrecognized(trimmed.to_string())),
        }
    }
}

impl TryFrom<String> for Crs {
    type Error = CrsError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Reproject any geometry between two supported systems.
pub fn reproject<G>(geometry: &G, from: Crs, to: Crs) -> G
where
    G: MapCoords<f64, f64, Output = G> + Clone,
{
    if from == to {
        return geometry.clone();
    }
    geometry.map_coords(move |c| from.transform(to, c))
}

fn lambert93_isometric_latitude(lat: f64) -> f64 {
    let e_sin = LAMBERT93_E * lat.sin();
    ((FRAC_PI_4 + lat / 2.0).tan() * ((1.0 - e_sin) / (1.0 + e_sin)).powf(LAMBERT93_E / 2.0)).ln()
}

fn lambert93_forward(c: Coord<f64>) -> Coord<f64> {
    let lat = c.y.to_radians();
    let r = LAMBERT93_C * (-LAMBERT93_N * lambert93_isometric_latitude(lat)).exp();
    let gamma = LAMBERT93_N * (c.x - LAMBERT93_LON0_DEG).to_radians();

    Coord {
        x: LAMBERT93_XS + r * gamma.sin(),
        y: LAMBERT93_YS - r * gamma.cos(),
    }
}

fn lambert93_inverse(c: Coord<f64>) -> Coord<f64> {
    let dx = c.x - LAMBERT93_XS;
    let dy = LAMBERT93_YS - c.y;
    let r = dx.hypot(dy);
    let gamma = dx.atan2(dy);

    let lon = LAMBERT93_LON0_DEG + (gamma / LAMBERT93_N).to_degrees();
    let iso = -(r / LAMBERT93_C).ln() / LAMBERT93_N;

    // Fixed-point iteration on the isometric latitude; converges in a handful of steps.
    let mut lat = 2.0 * iso.exp().atan() - FRAC_PI_2;
    for _ in 0..20 {
        let e_sin = LAMBERT93_E * lat.sin();
        let next = 2.0
            * (((1.0 + e_sin) / (1.0 - e_sin)).powf(LAMBERT93_E / 2.0) * iso.exp()).atan()
            - FRAC_PI_2;
        if (next - lat).abs() < 1e-12 {
            lat = next;
            break;
        }
        lat = next;
    }

    Coord {
        x: lon,
        y: lat.to_degrees(),
    }
}

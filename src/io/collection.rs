//! GeoJSON feature collections: loading boundaries, persisting checkpoints.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use geo::{Geometry as GeoGeometry, MultiPolygon};
use geojson::{Feature, FeatureCollection, GeoJson, JsonObject, JsonValue};
use serde_json::json;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::crs::{reproject, Crs};
use crate::enrich::score::coerce_flag;
use crate::models::{
    code_from_value, DemographicRecord, Municipality, MunicipalitySet, PointCollection, AT_RISK,
};

/// Key property of municipal boundary files.
pub const BOUNDARY_KEY: &str = "codgeo";
/// Key property of outlying-territory files, renamed to `codgeo` on load.
pub const TERRITORY_KEY: &str = "code";

const DEMOGRAPHICS_MATCHED: &str = "demographics_matched";
const SCORE: &str = "score";

/// Demographic properties persisted on every municipality, in write order.
const DEMOGRAPHIC_FIELDS: [&str; 10] = [
    "name",
    "elder_care_facilities",
    "population",
    "emergency_visits",
    "generalists",
    "dentists",
    "physiotherapists",
    "nurses",
    "pharmacies",
    "doctors_per_2000",
];

/// Load a polygon collection keyed by `key`, exposing the key as `codgeo`.
///
/// Features without a key cannot be enumerated and are skipped with a
/// warning. A keyed feature whose geometry is null or not polygonal is kept
/// with an empty geometry, so it still takes part in attribute joins.
pub fn read_boundaries(path: &Path, key: &str) -> Result<MunicipalitySet> {
    info!("Loading boundaries from {}", path.display());

    let (crs, features) = read_feature_collection(path)?;
    let mut municipalities = Vec::with_capacity(features.len());

    for feature in features {
        let mut properties = feature.properties.unwrap_or_default();

        let codgeo = match properties.remove(key).as_ref().and_then(code_from_value) {
            Some(code) => code,
            None => {
                warn!("Skipping feature without '{}' in {}", key, path.display());
                continue;
            }
        };

        let geometry = match feature.geometry.map(polygonal).transpose()? {
            Some(Some(mp)) => mp,
            _ => {
                warn!("{}: geometry is missing or not polygonal", codgeo);
                MultiPolygon::new(vec![])
            }
        };

        // Both key spellings collapse onto the struct field.
        properties.remove(BOUNDARY_KEY);
        municipalities.push(Municipality::new(codgeo, geometry, properties));
    }

    info!(
        "Loaded {} boundaries ({}) from {}",
        municipalities.len(),
        crs,
        path.display()
    );
    Ok(MunicipalitySet::new(crs, municipalities))
}

/// Reload a persisted municipality checkpoint.
///
/// Flag columns are coerced to booleans whatever their stored encoding.
pub fn read_municipalities(path: &Path, flag_columns: &[String]) -> Result<MunicipalitySet> {
    let mut set = read_boundaries(path, BOUNDARY_KEY)?;

    for m in &mut set.municipalities {
        let props = &mut m.attributes;
        let mut record = DemographicRecord {
            codgeo: m.codgeo.clone(),
            name: props
                .remove("name")
                .as_ref()
                .and_then(code_from_value)
                .unwrap_or_default(),
            elder_care_facilities: take_number(props, "elder_care_facilities"),
            population: take_number(props, "population"),
            emergency_visits: take_number(props, "emergency_visits"),
            generalists: take_number(props, "generalists"),
            dentists: take_number(props, "dentists"),
            physiotherapists: take_number(props, "physiotherapists"),
            nurses: take_number(props, "nurses"),
            pharmacies: take_number(props, "pharmacies"),
            doctors_per_2000: take_number(props, "doctors_per_2000"),
            at_risk: false,
        };
        record.at_risk = props.remove(AT_RISK).as_ref().map(coerce_flag).unwrap_or(false);
        m.demographics = record;
        m.demographics_matched = props
            .remove(DEMOGRAPHICS_MATCHED)
            .as_ref()
            .map(coerce_flag)
            .unwrap_or(false);

        for column in flag_columns.iter().filter(|c| c.as_str() != AT_RISK) {
            if let Some(value) = props.remove(column.as_str()) {
                m.out_of_range.insert(column.clone(), coerce_flag(&value));
            }
        }

        m.score = props
            .remove(SCORE)
            .and_then(|v| v.as_u64())
            .and_then(|s| u8::try_from(s).ok());
    }

    Ok(set)
}

/// Persist municipalities, reprojected into `output_crs`.
pub fn write_municipalities(path: &Path, set: &MunicipalitySet, output_crs: Crs) -> Result<()> {
    let features = set
        .iter()
        .map(|m| {
            let geometry = (!m.geometry.0.is_empty())
                .then(|| geojson::Value::from(&reproject(&m.geometry, set.crs, output_crs)));
            feature(geometry, municipality_properties(m))
        })
        .collect();

    write_feature_collection(path, features, output_crs)?;
    info!("Wrote {} municipalities to {}", set.len(), path.display());
    Ok(())
}

/// Persist a point-to-municipality association, reprojected into `output_crs`.
pub fn write_points(path: &Path, points: &PointCollection, output_crs: Crs) -> Result<()> {
    let features = points
        .features
        .iter()
        .map(|p| {
            let geometry = reproject(&p.geometry, points.crs, output_crs);
            let mut props = JsonObject::new();
            props.insert(BOUNDARY_KEY.to_string(), optional_string(&p.codgeo));
            props.insert("dep".to_string(), optional_string(&p.dep));
            props.insert("reg".to_string(), optional_string(&p.reg));
            feature(Some(geojson::Value::from(&geometry)), props)
        })
        .collect();

    write_feature_collection(path, features, output_crs)?;
    info!("Wrote {} points to {}", points.len(), path.display());
    Ok(())
}

/// The persisted property set of one municipality.
pub fn municipality_properties(m: &Municipality) -> JsonObject {
    let d = &m.demographics;
    let mut props = m.attributes.clone();

    props.insert(BOUNDARY_KEY.to_string(), json!(m.codgeo));
    let numbers = [
        d.elder_care_facilities,
        d.population,
        d.emergency_visits,
        d.generalists,
        d.dentists,
        d.physiotherapists,
        d.nurses,
        d.pharmacies,
        d.doctors_per_2000,
    ];
    props.insert(DEMOGRAPHIC_FIELDS[0].to_string(), json!(d.name));
    for (field, value) in DEMOGRAPHIC_FIELDS[1..].iter().zip(numbers) {
        props.insert(field.to_string(), json!(value));
    }
    props.insert(AT_RISK.to_string(), json!(d.at_risk));
    props.insert(DEMOGRAPHICS_MATCHED.to_string(), json!(m.demographics_matched));

    for (column, value) in &m.out_of_range {
        props.insert(column.clone(), json!(value));
    }
    if let Some(score) = m.score {
        props.insert(SCORE.to_string(), json!(score));
    }

    props
}

fn read_feature_collection(path: &Path) -> Result<(Crs, Vec<Feature>)> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open GeoJSON file: {}", path.display()))?;
    let geojson = GeoJson::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse GeoJSON: {}", path.display()))?;

    let collection = match geojson {
        GeoJson::FeatureCollection(fc) => fc,
        _ => return Err(anyhow!("{} must be a FeatureCollection", path.display())),
    };

    let crs = declared_crs(collection.foreign_members.as_ref())
        .with_context(|| format!("Unusable 'crs' member in {}", path.display()))?;
    Ok((crs, collection.features))
}

/// The legacy `crs` member written by GDAL-style producers; RFC 7946 implies WGS84.
fn declared_crs(foreign_members: Option<&JsonObject>) -> Result<Crs> {
    let name = foreign_members
        .and_then(|members| members.get("crs"))
        .and_then(|crs| crs.get("properties"))
        .and_then(|props| props.get("name"))
        .and_then(JsonValue::as_str);

    match name {
        Some(name) => {
            debug!("Declared CRS: {}", name);
            Ok(name.parse()?)
        }
        None => Ok(Crs::Wgs84),
    }
}

fn polygonal(geometry: geojson::Geometry) -> Result<Option<MultiPolygon<f64>>> {
    let geometry: GeoGeometry<f64> = geometry
        .value
        .try_into()
        .map_err(|e| anyhow!("Failed to convert GeoJSON geometry: {:?}", e))?;

    Ok(match geometry {
        GeoGeometry::MultiPolygon(mp) => Some(mp),
        GeoGeometry::Polygon(p) => Some(MultiPolygon::new(vec![p])),
        _ => None,
    })
}

fn feature(value: Option<geojson::Value>, properties: JsonObject) -> Feature {
    Feature {
        bbox: None,
        geometry: value.map(geojson::Geometry::new),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

fn write_feature_collection(path: &Path, features: Vec<Feature>, crs: Crs) -> Result<()> {
    let foreign_members = (crs != Crs::Wgs84).then(|| {
        let mut members = JsonObject::new();
        members.insert(
            "crs".to_string(),
            json!({ "type": "name", "properties": { "name": crs.urn() } }),
        );
        members
    });

    let collection = FeatureCollection {
        bbox: None,
        features,
        foreign_members,
    };

    write_atomic(path, |writer| {
        serde_json::to_writer(writer, &collection)
            .with_context(|| format!("Failed to write GeoJSON: {}", path.display()))
    })
}

/// Write through a temporary file in the target directory, then rename it
/// over `path`. The previous file at `path` survives any failure.
fn write_atomic<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut dyn Write) -> Result<()>,
{
    let parent = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => parent,
        None => Path::new("."),
    };
    fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create directory: {}", parent.display()))?;

    let mut tmp = NamedTempFile::new_in(parent)
        .with_context(|| format!("Failed to create temporary file in {}", parent.display()))?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        write(&mut writer)?;
        writer.flush()?;
    }
    tmp.as_file()
        .sync_all()
        .with_context(|| format!("Failed to sync {}", path.display()))?;

    tmp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

fn take_number(props: &mut JsonObject, key: &str) -> f64 {
    match props.remove(key) {
        Some(JsonValue::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(JsonValue::String(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .unwrap_or(0.0),
        _ => 0.0,
    }
}

fn optional_string(value: &Option<String>) -> JsonValue {
    value.as_ref().map_or(JsonValue::Null, |s| json!(s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, Point};
    use tempfile::tempdir;

    use crate::models::{PointFeature, OUT_OF_RANGE_PHARMACY};

    fn write_file(dir: &Path, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut file = File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_read_boundaries_renames_key_and_skips_unkeyed() {
        let dir = tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "territories.geojson",
            r#"{"type":"FeatureCollection","features":[
                {"type":"Feature","properties":{"code":97101,"nom":"Les Abymes"},
                 "geometry":{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,0]]]}},
                {"type":"Feature","properties":{"nom":"no key"},
                 "geometry":{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,0]]]}},
                {"type":"Feature","properties":{"code":"97102"},
                 "geometry":{"type":"Point","coordinates":[0,0]}}
            ]}"#,
        );

        let set = read_boundaries(&path, TERRITORY_KEY).unwrap();
        assert_eq!(set.crs, Crs::Wgs84);
        assert_eq!(set.len(), 2);
        assert_eq!(set.municipalities[0].codgeo, "97101");
        assert_eq!(set.municipalities[0].attributes.get("nom"), Some(&json!("Les Abymes")));
        assert!(!set.municipalities[0].attributes.contains_key("code"));

        // Non-polygonal geometry: kept by code, geometry emptied.
        assert_eq!(set.municipalities[1].codgeo, "97102");
        assert!(set.municipalities[1].geometry.0.is_empty());
    }

    #[test]
    fn test_null_geometry_survives_merge_and_checkpoint() {
        let dir = tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "communes.json",
            r#"{"type":"FeatureCollection","features":[
                {"type":"Feature","properties":{"codgeo":"01001"},
                 "geometry":{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,0]]]}},
                {"type":"Feature","properties":{"codgeo":"01002"},"geometry":null}
            ]}"#,
        );

        let boundaries = read_boundaries(&path, BOUNDARY_KEY).unwrap();
        let codes: Vec<&str> = boundaries.iter().map(|m| m.codgeo.as_str()).collect();
        assert_eq!(codes, vec!["01001", "01002"]);

        let mut record = DemographicRecord::unmatched("01002");
        record.population = 500.0;
        let merged = crate::enrich::merge_demographics(boundaries, vec![record]);
        let codes: Vec<&str> = merged.iter().map(|m| m.codgeo.as_str()).collect();
        assert_eq!(codes, vec!["01001", "01002"]);
        assert!(merged.find("01002").unwrap().demographics_matched);

        let checkpoint = dir.path().join("merged.geojson");
        write_municipalities(&checkpoint, &merged, Crs::Wgs84).unwrap();
        let text = fs::read_to_string(&checkpoint).unwrap();
        let GeoJson::FeatureCollection(fc) = text.parse::<GeoJson>().unwrap() else {
            panic!("expected a feature collection");
        };
        assert!(fc.features[1].geometry.is_none());

        let back = read_municipalities(&checkpoint, &[]).unwrap();
        assert_eq!(back.len(), 2);
        assert!(back.find("01002").unwrap().geometry.0.is_empty());
    }

    #[test]
    fn test_failed_write_keeps_previous_checkpoint() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scored.geojson");

        let square = polygon![(x: 2.0, y: 46.0), (x: 2.1, y: 46.0), (x: 2.1, y: 46.1), (x: 2.0, y: 46.0)];
        let m = Municipality::new("01001".to_string(), MultiPolygon::new(vec![square]), JsonObject::new());
        write_municipalities(&path, &MunicipalitySet::new(Crs::Wgs84, vec![m]), Crs::Wgs84).unwrap();
        let before = fs::read_to_string(&path).unwrap();

        let result = write_atomic(&path, |writer| {
            writer.write_all(b"{\"type\":\"FeatureCo")?;
            Err(anyhow!("disk full"))
        });
        assert!(result.is_err());

        assert_eq!(fs::read_to_string(&path).unwrap(), before);
        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1, "temporary file left behind");
        assert_eq!(read_boundaries(&path, BOUNDARY_KEY).unwrap().len(), 1);
    }

    #[test]
    fn test_write_replaces_existing_file() {
        let dir = tempdir().unwrap();
        let path = write_file(dir.path(), "old.geojson", "stale");

        write_municipalities(&path, &MunicipalitySet::new(Crs::WebMercator, vec![]), Crs::WebMercator).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("urn:ogc:def:crs:EPSG::3857"));
        assert!(read_boundaries(&path, BOUNDARY_KEY).unwrap().is_empty());
    }

    #[test]
    fn test_declared_crs_is_honoured() {
        let dir = tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "mercator.geojson",
            r#"{"type":"FeatureCollection",
                "crs":{"type":"name","properties":{"name":"urn:ogc:def:crs:EPSG::3857"}},
                "features":[]}"#,
        );
        let set = read_boundaries(&path, BOUNDARY_KEY).unwrap();
        assert_eq!(set.crs, Crs::WebMercator);
        assert!(set.is_empty());
    }

    #[test]
    fn test_municipality_checkpoint_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out/scored.geojson");

        let square = polygon![(x: 2.0, y: 46.0), (x: 2.1, y: 46.0), (x: 2.1, y: 46.1), (x: 2.0, y: 46.0)];
        let mut m = Municipality::new("01001".to_string(), MultiPolygon::new(vec![square]), JsonObject::new());
        m.attributes.insert("dep".to_string(), json!("01"));
        m.demographics.population = 2000.0;
        m.demographics.derive_scarcity();
        m.demographics_matched = true;
        m.set_flag(OUT_OF_RANGE_PHARMACY, true);
        m.score = Some(2);

        let set = MunicipalitySet::new(Crs::Wgs84, vec![m.clone()]);
        write_municipalities(&path, &set, Crs::Wgs84).unwrap();

        let flags = vec![OUT_OF_RANGE_PHARMACY.to_string()];
        let back = read_municipalities(&path, &flags).unwrap();
        assert_eq!(back.municipalities, vec![m]);
    }

    #[test]
    fn test_string_encoded_flags_are_coerced() {
        let dir = tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "legacy.geojson",
            r#"{"type":"FeatureCollection","features":[
                {"type":"Feature","properties":{"codgeo":"01001","at_risk":"True",
                  "out_of_range_pharmacy":1,"out_of_range_hospital":"false","population":"12"},
                 "geometry":{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,0]]]}}
            ]}"#,
        );
        let flags = vec!["out_of_range_pharmacy".to_string(), "out_of_range_hospital".to_string()];
        let set = read_municipalities(&path, &flags).unwrap();
        let m = &set.municipalities[0];
        assert!(m.at_risk());
        assert!(m.flag("out_of_range_pharmacy"));
        assert!(!m.flag("out_of_range_hospital"));
        assert_eq!(m.demographics.population, 12.0);
    }

    #[test]
    fn test_points_written_in_output_crs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("points.geojson");

        let mut feature = PointFeature::new(Point::new(0.0, 0.0));
        feature.codgeo = Some("01001".to_string());
        let points = PointCollection::new(Crs::WebMercator, vec![feature, PointFeature::new(Point::new(1.0, 1.0))]);
        write_points(&path, &points, Crs::Wgs84).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let parsed: GeoJson = text.parse().unwrap();
        let GeoJson::FeatureCollection(fc) = parsed else {
            panic!("expected a feature collection");
        };
        assert!(fc.foreign_members.is_none());
        assert_eq!(fc.features.len(), 2);
        let props = fc.features[1].properties.as_ref().unwrap();
        assert_eq!(props.get("codgeo"), Some(&JsonValue::Null));
    }
}

//! Demographic table normalization and the medical-scarcity flag.
//!
//! The source layout is positional: administrative code, label, then eight
//! numeric health fields. Header names are ignored.

use tracing::{debug, info};

use crate::io::Table;
use crate::models::DemographicRecord;

/// Number of columns in the demographic source layout.
pub const DEMOGRAPHIC_COLUMNS: usize = 10;

/// Coerce a raw cell to a number. Anything unparseable or non-finite is zero.
pub fn coerce_number(raw: &str) -> f64 {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

/// Build one record per source row and derive `doctors_per_2000` / `at_risk`.
pub fn normalize_demographics(table: &Table) -> Vec<DemographicRecord> {
    if table.headers.len() != DEMOGRAPHIC_COLUMNS {
        debug!(
            "Demographic table has {} columns, expected {}; reading positionally",
            table.headers.len(),
            DEMOGRAPHIC_COLUMNS
        );
    }

    let records: Vec<DemographicRecord> = table.rows.iter().map(|row| normalize_row(row)).collect();

    let at_risk = records.iter().filter(|r| r.at_risk).count();
    info!(
        "Normalized {} demographic records ({} at risk)",
        records.len(),
        at_risk
    );
    records
}

fn normalize_row(row: &[String]) -> DemographicRecord {
    let cell = |i: usize| row.get(i).map(String::as_str).unwrap_or("");
    let number = |i: usize| coerce_number(cell(i));

    let mut record = DemographicRecord {
        codgeo: cell(0).trim().to_string(),
        name: cell(1).trim().to_string(),
        elder_care_facilities: number(2),
        population: number(3),
        emergency_visits: number(4),
        generalists: number(5),
        dentists: number(6),
        physiotherapists: number(7),
        nurses: number(8),
        pharmacies: number(9),
        ..Default::default()
    };
    record.derive_scarcity();
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::read_table;

    const SOURCE: &str = "\u{feff}Code;Libellé;EHPAD;Population;Urgences;Généralistes;Dentistes;Kinés;Infirmiers;Pharmacies
01001;L'Abergement-Clémenciat;0;2000;12;0;1;0;2;0
01002;L'Abergement-de-Varey;1;2000;3;1;0;0;0;1
01004;Ambérieu-en-Bugey;N/A;;x;4;;;;
";

    #[test]
    fn test_positional_normalization() {
        let table = read_table(SOURCE.as_bytes(), b';').unwrap();
        let records = normalize_demographics(&table);
        assert_eq!(records.len(), 3);

        let first = &records[0];
        assert_eq!(first.codgeo, "01001");
        assert_eq!(first.name, "L'Abergement-Clémenciat");
        assert_eq!(first.population, 2000.0);
        assert_eq!(first.emergency_visits, 12.0);
        assert_eq!(first.nurses, 2.0);
        assert_eq!(first.doctors_per_2000, 0.0);
        assert!(first.at_risk);

        let second = &records[1];
        assert_eq!(second.doctors_per_2000, 1.0);
        assert!(!second.at_risk);
    }

    #[test]
    fn test_unparseable_values_degrade_to_zero() {
        let table = read_table(SOURCE.as_bytes(), b';').unwrap();
        let third = &normalize_demographics(&table)[2];
        assert_eq!(third.elder_care_facilities, 0.0);
        assert_eq!(third.population, 0.0);
        assert_eq!(third.generalists, 4.0);
        assert_eq!(third.doctors_per_2000, 0.0);
        assert!(!third.at_risk);
    }

    #[test]
    fn test_coerce_number() {
        assert_eq!(coerce_number(" 42 "), 42.0);
        assert_eq!(coerce_number("1.5"), 1.5);
        assert_eq!(coerce_number("NaN"), 0.0);
        assert_eq!(coerce_number("inf"), 0.0);
        assert_eq!(coerce_number("12 345"), 0.0);
    }
}

//! Left merge of demographic records onto municipal boundaries.
//!
//! The boundary collection is authoritative for enumeration: every boundary
//! survives, and demographic rows without a boundary are dropped.

use hashbrown::{HashMap, HashSet};
use tracing::{debug, info, warn};

use crate::models::{DemographicRecord, MunicipalitySet};

pub fn merge_demographics(
    mut boundaries: MunicipalitySet,
    records: Vec<DemographicRecord>,
) -> MunicipalitySet {
    let source_rows = records.len();

    // Last row wins on duplicate codes.
    let by_code: HashMap<String, DemographicRecord> = records
        .into_iter()
        .map(|r| (r.codgeo.clone(), r))
        .collect();

    let mut matched_codes = HashSet::new();
    let mut unmatched = 0usize;

    for m in &mut boundaries.municipalities {
        match by_code.get(&m.codgeo) {
            Some(record) => {
                m.demographics = record.clone();
                m.demographics_matched = true;
                matched_codes.insert(m.codgeo.clone());
            }
            None => {
                debug!("No demographic record for {}", m.codgeo);
                m.demographics = DemographicRecord::unmatched(&m.codgeo);
                m.demographics_matched = false;
                unmatched += 1;
            }
        }
    }

    let dropped = by_code.len() - matched_codes.len();
    info!(
        "Merged demographics onto {} boundaries ({} source rows)",
        boundaries.len(),
        source_rows
    );
    if unmatched > 0 {
        warn!("{} boundaries have no demographic record; defaulted to zero", unmatched);
    }
    if dropped > 0 {
        warn!("{} demographic codes have no boundary and were dropped", dropped);
    }

    boundaries
}

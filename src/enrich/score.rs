//! Composite access-risk score: the number of risk flags that are set.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::info;

use crate::models::{Municipality, MunicipalitySet};

/// Score distribution: score value to number of municipalities.
pub type ScoreDistribution = BTreeMap<u8, usize>;

/// Count the flags in `flags` that are set on `municipality`.
pub fn score(municipality: &Municipality, flags: &[&str]) -> u8 {
    flags.iter().filter(|flag| municipality.flag(flag)).count() as u8
}

/// Score every municipality in one pass and report the distribution.
pub fn score_municipalities(
    mut set: MunicipalitySet,
    flags: &[&str],
) -> (MunicipalitySet, ScoreDistribution) {
    let mut distribution = ScoreDistribution::new();
    for m in &mut set.municipalities {
        let s = score(m, flags);
        m.score = Some(s);
        *distribution.entry(s).or_default() += 1;
    }

    info!("Score distribution over {} municipalities:", set.len());
    for (s, count) in &distribution {
        info!("  score {}: {}", s, count);
    }

    (set, distribution)
}

/// Coerce a stored flag value to a boolean.
///
/// Recognizes textual and numeric spellings of true/false; any other
/// non-empty string counts as set, null and empty strings as unset.
pub fn coerce_flag(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "" | "false" | "f" | "no" | "n" | "0" | "0.0" => false,
            _ => true,
        },
        Value::Null => false,
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

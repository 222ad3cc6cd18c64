use crate::source::TelemetrySample;
use serde::Serialize;

/// What the sink ingests. Only temperature and gravity matter downstream;
/// `name` is mandatory there and carries the hydrometer id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestionRecord {
    pub name: String,
    pub temp: f64,
    pub temp_unit: &'static str,
    pub gravity: f64,
    pub gravity_unit: &'static str,
}

/// Pure, total conversion of one telemetry sample. Temperature passes through
/// unchanged; gravity is the raw value scaled down by 1000 and rounded
/// half-away-from-zero to three decimals.
pub fn convert(sample: &TelemetrySample) -> IngestionRecord {
    IngestionRecord {
        name: sample.device_id.clone(),
        temp: sample.temperature_c,
        temp_unit: "C",
        gravity: round_half_away(sample.specific_gravity_raw as f64 / 1000.0, 3),
        gravity_unit: "G",
    }
}

// f64::round is round-half-away-from-zero, the documented rounding mode for
// gravity values.
fn round_half_away(value: f64, decimals: u32) -> f64 {
    let scale = 10f64.powi(decimals as i32);
    (value * scale).round() / scale
}

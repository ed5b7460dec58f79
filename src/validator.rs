use crate::error::Fault;
use crate::types::{unset_date, Sample, SessionMetadata};

pub const INVALID_DATE: &str = "Invalid date";
pub const SH_OUT_OF_RANGE: &str = "Specific humidity must be between 0 and 100";
pub const STATION_ID_INVALID: &str = "StationId must not contain path separators, '..' or control characters";

/// Inclusive bounds accepted for specific humidity.
pub const SH_MIN: f64 = 0.0;
pub const SH_MAX: f64 = 100.0;

/// Structural checks applied to every pushed sample, in order.
/// Returns the rejection reason of the first failing check.
///
/// Only the date and specific humidity are checked here; the remaining
/// fields pass through uninterpreted.
pub fn validate_sample(sample: &Sample) -> Result<(), &'static str> {
    if sample.date == unset_date() {
        return Err(INVALID_DATE);
    }

    // NaN fails the range comparison
    if !(SH_MIN..=SH_MAX).contains(&sample.sh) {
        return Err(SH_OUT_OF_RANGE);
    }

    Ok(())
}

/// Protocol checks for a session start request
pub fn validate_metadata(meta: &SessionMetadata) -> Result<(), Fault> {
    if meta.station_id.is_empty() {
        return Err(Fault::data_format("StationId is required"));
    }
    // The station id becomes part of the session's file names
    if meta.station_id.contains(['/', '\\'])
        || meta.station_id.contains("..")
        || meta.station_id.chars().any(char::is_control)
    {
        return Err(Fault::data_format(STATION_ID_INVALID));
    }
    if meta.expected_samples <= 0 {
        return Err(Fault::data_format("ExpectedSamples must be greater than 0"));
    }
    Ok(())
}

//! Helper functions exposed to expressions under the `fmfcn` namespace.

use chrono::{DateTime, ParseError};
use chrono_tz::America::New_York;
use rhai::{EvalAltResult, ImmutableString, Module};

/// Namespace under which the helpers are registered.
pub const FUNCTION_NAMESPACE: &str = "fmfcn";

const EASTERN_DATE_TIME: &str = "%Y-%m-%dT%H:%M:%S%.f";
const EASTERN_DATE: &str = "%Y-%m-%d";

/// Convert an RFC 3339 UTC timestamp to US Eastern local time (`yyyy-MM-ddTHH:mm:ss`).
///
/// Fractional seconds are kept when present.
pub fn convert_utc_to_eastern(utc: &str) -> Result<String, ParseError> {
    eastern(utc, EASTERN_DATE_TIME)
}

/// Convert an RFC 3339 UTC timestamp to the US Eastern local date (`yyyy-MM-dd`).
pub fn convert_utc_to_eastern_date(utc: &str) -> Result<String, ParseError> {
    eastern(utc, EASTERN_DATE)
}

fn eastern(utc: &str, format: &str) -> Result<String, ParseError> {
    let instant = DateTime::parse_from_rfc3339(utc.trim())?;
    Ok(instant.with_timezone(&New_York).format(format).to_string())
}

pub(super) fn module() -> Module {
    let mut module = Module::new();
    module.set_native_fn("convert_utc_to_est", convert_utc_to_est);
    module.set_native_fn("convert_utc_to_est_date_only", convert_utc_to_est_date_only);
    module
}

fn convert_utc_to_est(utc: ImmutableString) -> Result<String, Box<EvalAltResult>> {
    convert_utc_to_eastern(&utc).map_err(|e| format!("invalid UTC timestamp '{utc}': {e}").into())
}

fn convert_utc_to_est_date_only(utc: ImmutableString) -> Result<String, Box<EvalAltResult>> {
    convert_utc_to_eastern_date(&utc).map_err(|e| format!("invalid UTC timestamp '{utc}': {e}").into())
}

//! Module containing some utility functions that didn't fit anywhere else.

use time::{format_description, OffsetDateTime};

/// Produces a timestamp `String` of the current time in YYYY-MM-DD_HH-mm-SS format.
///
/// Falls back to UTC if the local offset cannot be determined, and to the unix timestamp if the
/// format cannot be applied.
pub fn get_timestamp() -> String {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    format_description::parse("[year]-[month]-[day]_[hour]-[minute]-[second]")
        .ok()
        .and_then(|format| now.format(&format).ok())
        .unwrap_or_else(|| {
            log::warn!("Cannot format the current time, using the unix timestamp instead");
            now.unix_timestamp().to_string()
        })
}

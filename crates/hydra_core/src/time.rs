use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime, UtcOffset};

/// Normalises a timeseries timestamp so equivalent spellings compare equal.
///
/// RFC 3339 values are shifted to UTC; `YYYY-MM-DD HH:MM:SS`,
/// `YYYY-MM-DDTHH:MM:SS` and bare dates are read as UTC. Parsed values are
/// written with nine subsecond digits so text order is time order. Anything
/// else (seasonal `XXXX-` stamps, free text) is kept verbatim after trimming.
pub fn canonical_timestamp(raw: &str) -> String {
    let raw = raw.trim();
    if let Ok(parsed) = OffsetDateTime::parse(raw, &Rfc3339) {
        return format_utc(parsed.to_offset(UtcOffset::UTC)).unwrap_or_else(|| raw.to_string());
    }
    let space = format_description!(
        "[year]-[month]-[day] [hour]:[minute]:[second][optional [.[subsecond]]]"
    );
    let tee = format_description!(
        "[year]-[month]-[day]T[hour]:[minute]:[second][optional [.[subsecond]]]"
    );
    for layout in [space, tee] {
        if let Ok(parsed) = PrimitiveDateTime::parse(raw, layout) {
            return format_utc(parsed.assume_utc()).unwrap_or_else(|| raw.to_string());
        }
    }
    if let Ok(date) = Date::parse(raw, format_description!("[year]-[month]-[day]")) {
        return format_utc(date.midnight().assume_utc()).unwrap_or_else(|| raw.to_string());
    }
    raw.to_string()
}

fn format_utc(value: OffsetDateTime) -> Option<String> {
    value
        .format(format_description!(
            "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:9]Z"
        ))
        .ok()
}

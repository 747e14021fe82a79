use chrono::{DateTime, NaiveDateTime, Utc};

/// Parses Lardi's heterogeneous `dateCreate` strings into a UTC instant.
///
/// The marketplace emits all four combinations of fractional seconds and a
/// UTC offset. A missing offset is taken as UTC; anything unparsable yields
/// `None` rather than a guessed date.
pub fn parse_offer_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Short display form (dd.mm.yy HH:MM) of an offer creation timestamp.
pub fn date_format(raw: &str) -> Option<String> {
    parse_offer_timestamp(raw).map(|dt| dt.format("%d.%m.%y %H:%M").to_string())
}

pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

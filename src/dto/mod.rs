use time::{OffsetDateTime, format_description::well_known::Rfc3339};

pub mod envelope;
pub mod extract;
pub mod health;
pub mod room;
pub mod sse;
pub mod validation;

/// Render epoch milliseconds as an RFC 3339 timestamp.
pub(crate) fn format_epoch_ms(ms: u64) -> String {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000)
        .ok()
        .and_then(|time| time.format(&Rfc3339).ok())
        .unwrap_or_else(|| "invalid-timestamp".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_epoch_millis() {
        assert_eq!(format_epoch_ms(0), "1970-01-01T00:00:00Z");
        assert_eq!(format_epoch_ms(61_000), "1970-01-01T00:01:01Z");
    }
}

//! Time conversions between UPnP "H:MM:SS" strings and seconds.

use crate::errors::ControlError;

/// Formats seconds as H:MM:SS (the AVTransport wire format).
pub fn format_hhmmss(seconds: u32) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    format!("{}:{:02}:{:02}", hours, minutes, secs)
}

/// Parses "HH:MM:SS", "MM:SS", or "SS" to seconds.
pub fn parse_time_flexible(input: &str) -> Result<u32, ControlError> {
    let trimmed = input.trim();
    let parts: Vec<&str> = trimmed.split(':').collect();

    if parts.is_empty() || parts.len() > 3 {
        return Err(ControlError::InvalidTime(format!(
            "'{}': expected HH:MM:SS, MM:SS, or SS",
            input
        )));
    }

    let mut total = 0u32;
    for part in parts {
        // Some devices report fractional seconds ("0:03:25.500").
        let whole = part.split('.').next().unwrap_or(part);
        let value = whole.parse::<u32>().map_err(|_| {
            ControlError::InvalidTime(format!("'{}' in time string '{}'", part, input))
        })?;
        total = total * 60 + value;
    }

    Ok(total)
}

/// Normalizes a backend-reported duration to seconds, accepting both raw
/// second counts ("245") and formatted strings ("0:04:05").
pub fn parse_duration_value(input: &str) -> Option<u32> {
    let trimmed = input.trim();
    if trimmed.is_empty() || trimmed == "NOT_IMPLEMENTED" {
        return None;
    }
    parse_time_flexible(trimmed).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_hhmmss() {
        assert_eq!(format_hhmmss(0), "0:00:00");
        assert_eq!(format_hhmmss(61), "0:01:01");
        assert_eq!(format_hhmmss(3661), "1:01:01");
    }

    #[test]
    fn parses_flexible_formats() {
        assert_eq!(parse_time_flexible("1:02:03").unwrap(), 3723);
        assert_eq!(parse_time_flexible("02:03").unwrap(), 123);
        assert_eq!(parse_time_flexible("42").unwrap(), 42);
        assert_eq!(parse_time_flexible("0:03:25.500").unwrap(), 205);

        assert!(parse_time_flexible("1:2:3:4").is_err());
        assert!(parse_time_flexible("abc").is_err());
    }

    #[test]
    fn normalizes_durations() {
        assert_eq!(parse_duration_value("245"), Some(245));
        assert_eq!(parse_duration_value("0:04:05"), Some(245));
        assert_eq!(parse_duration_value("NOT_IMPLEMENTED"), None);
        assert_eq!(parse_duration_value(""), None);
    }
}

use std::time::Duration;

use regex::Regex;

use crate::Error;

/// Parses a human-readable duration like `30s`, `500ms`, `2m` or `1h`.
///
/// Bare numbers are taken to be in milliseconds.
/// @see https://github.com/lightbend/config/blob/main/HOCON.md#duration-format
pub(crate) fn parse_duration(s: &str) -> Result<Duration, Error> {
    let re = Regex::new(r"^([0-9]+)([a-z]*)$").unwrap();
    if let Some(caps) = re.captures(s.trim()) {
        let num: u64 = caps
            .get(1)
            .ok_or_else(|| Error::DurationError(s.to_owned()))?
            .as_str()
            .parse()
            .map_err(|_| Error::DurationError(s.to_owned()))?;
        let unit = caps
            .get(2)
            .ok_or_else(|| Error::DurationError(s.to_owned()))?
            .as_str();
        match unit {
            "" | "ms" | "milli" | "millis" | "millisecond" | "milliseconds" => {
                Ok(Duration::from_millis(num))
            }
            "s" | "second" | "seconds" => Ok(Duration::from_secs(num)),
            "m" | "minute" | "minutes" => Ok(Duration::from_secs(num * 60)),
            "h" | "hour" | "hours" => Ok(Duration::from_secs(num * 3600)),
            _ => Err(Error::DurationError(s.to_owned())),
        }
    } else {
        Err(Error::DurationError(s.to_owned()))
    }
}

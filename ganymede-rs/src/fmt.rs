//! Provides parsers and formatters for the byte sizes and durations found in the config.
use std::time::Duration;

/// Parses a memory size like "64m" into a number of bytes.
///
/// The number may be followed by one of these suffixes (case doesn't matter):
/// * **b**: bytes (which is also the default)
/// * **k**: KiB (1024 bytes)
/// * **m**: MiB
/// * **g**: GiB
///
/// # Examples
///
/// ```
/// assert_eq!(ganymede::fmt::parse_size("2048").unwrap(), 2048);
/// assert_eq!(ganymede::fmt::parse_size("2k").unwrap(), 2048);
/// assert_eq!(ganymede::fmt::parse_size("64 M").unwrap(), 64 * 1024 * 1024);
/// assert_eq!(ganymede::fmt::parse_size("1g").unwrap(), 1024 * 1024 * 1024);
///
/// // Unknown suffixes, fractions and negative numbers are rejected...
/// assert!(ganymede::fmt::parse_size("3 Y").is_err());
/// assert!(ganymede::fmt::parse_size("1.5m").is_err());
/// assert!(ganymede::fmt::parse_size("-1").is_err());
/// ```
pub fn parse_size(str: impl AsRef<str>) -> anyhow::Result<usize> {
    lazy_static::lazy_static! {
        static ref SIZE: regex::Regex = regex::Regex::new(r"^ *(\d+) *([bBkKmMgG]?) *$").unwrap();
    }

    let input = str.as_ref();
    let captures = SIZE.captures(input).ok_or_else(|| {
        anyhow::anyhow!(
            "Cannot parse '{}' as size. Expected a positive number optionally followed by 'b', 'k', 'm' or 'g'.",
            input
        )
    })?;

    let number = captures[1].parse::<usize>()?;
    let factor: usize = match &captures[2] {
        "k" | "K" => 1 << 10,
        "m" | "M" => 1 << 20,
        "g" | "G" => 1 << 30,
        _ => 1,
    };

    number
        .checked_mul(factor)
        .ok_or_else(|| anyhow::anyhow!("The size '{}' is too large.", input))
}

/// Parses a duration like "500ms" or "2s".
///
/// Supported suffixes are **ms** (the default), **s**, **m** (minutes) and **h**.
///
/// # Examples
///
/// ```
/// # use std::time::Duration;
/// assert_eq!(ganymede::fmt::parse_duration("250").unwrap(), Duration::from_millis(250));
/// assert_eq!(ganymede::fmt::parse_duration("500 ms").unwrap(), Duration::from_millis(500));
/// assert_eq!(ganymede::fmt::parse_duration("2s").unwrap(), Duration::from_secs(2));
/// assert_eq!(ganymede::fmt::parse_duration("3 M").unwrap(), Duration::from_secs(180));
/// assert_eq!(ganymede::fmt::parse_duration("1h").unwrap(), Duration::from_secs(3600));
///
/// assert!(ganymede::fmt::parse_duration("1.5s").is_err());
/// assert!(ganymede::fmt::parse_duration("2 weeks").is_err());
/// ```
pub fn parse_duration(str: impl AsRef<str>) -> anyhow::Result<Duration> {
    lazy_static::lazy_static! {
        static ref DURATION: regex::Regex =
            regex::Regex::new(r"^ *(\d+) *(ms|MS|s|S|m|M|h|H)? *$").unwrap();
    }

    let input = str.as_ref();
    let captures = DURATION.captures(input).ok_or_else(|| {
        anyhow::anyhow!(
            "Cannot parse '{}' as duration. Expected a positive number optionally followed by 'ms', 's', 'm' or 'h'.",
            input
        )
    })?;

    let number = captures[1].parse::<u64>()?;
    match captures.get(2).map(|suffix| suffix.as_str()) {
        Some("s") | Some("S") => Ok(Duration::from_secs(number)),
        Some("m") | Some("M") => Ok(Duration::from_secs(number * 60)),
        Some("h") | Some("H") => Ok(Duration::from_secs(number * 60 * 60)),
        _ => Ok(Duration::from_millis(number)),
    }
}

/// Formats a number of bytes using the largest binary unit which keeps the value above 1.
///
/// # Examples
///
/// ```
/// assert_eq!(ganymede::fmt::format_size(1), "1 byte");
/// assert_eq!(ganymede::fmt::format_size(630), "630 bytes");
/// assert_eq!(ganymede::fmt::format_size(2048), "2.00 KiB");
/// assert_eq!(ganymede::fmt::format_size(87_340), "85.3 KiB");
/// assert_eq!(ganymede::fmt::format_size(64 * 1024 * 1024), "64.0 MiB");
/// assert_eq!(ganymede::fmt::format_size(873_400_000), "833 MiB");
/// ```
pub fn format_size(size_in_bytes: usize) -> String {
    const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];

    match size_in_bytes {
        1 => return "1 byte".to_owned(),
        size if size < 1024 => return format!("{} bytes", size),
        _ => (),
    }

    let mut size = size_in_bytes as f64 / 1024.;
    let mut unit = 0;
    while size >= 1024. && unit < UNITS.len() - 1 {
        size /= 1024.;
        unit += 1;
    }

    if size < 10. {
        format!("{:.2} {}", size, UNITS[unit])
    } else if size < 100. {
        format!("{:.1} {}", size, UNITS[unit])
    } else {
        format!("{:.0} {}", size, UNITS[unit])
    }
}

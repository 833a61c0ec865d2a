// src/utils/format.rs
//! Display and conversion helpers shared by the catalog and the API.

use chrono::{FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use ethers::types::{TxHash, U256};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("invalid date `{0}`, expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("invalid time `{0}`, expected HH:MM")]
    InvalidTime(String),

    #[error("local time {0} does not exist in the configured offset")]
    NonexistentTime(String),
}

/// Shortens an address for display: `0x1234...abcd`.
pub fn shorten_address(address: &str) -> String {
    if address.len() <= 10 || !address.is_ascii() {
        return address.to_string();
    }
    format!("{}...{}", &address[..6], &address[address.len() - 4..])
}

/// Wei amount rendered in ether, trailing zeros trimmed (`"0.05"`, `"1"`).
pub fn format_eth(wei: U256) -> String {
    let text = ethers::utils::format_ether(wei);
    match text.split_once('.') {
        Some((whole, fraction)) => {
            let fraction = fraction.trim_end_matches('0');
            if fraction.is_empty() {
                whole.to_string()
            } else {
                format!("{}.{}", whole, fraction)
            }
        }
        None => text,
    }
}

pub fn parse_event_date(date: &str) -> Result<NaiveDate, FormatError> {
    NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
        .map_err(|_| FormatError::InvalidDate(date.to_string()))
}

/// Converts an organizer's date and time strings to a Unix timestamp (seconds).
///
/// # Arguments
/// * `date` - `YYYY-MM-DD`
/// * `time` - `HH:MM` (seconds are accepted and kept)
/// * `offset` - Zone in which the wall-clock values are meant
pub fn date_to_timestamp(date: &str, time: &str, offset: FixedOffset) -> Result<i64, FormatError> {
    let day = parse_event_date(date)?;
    let clock = NaiveTime::parse_from_str(time.trim(), "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(time.trim(), "%H:%M:%S"))
        .map_err(|_| FormatError::InvalidTime(time.to_string()))?;

    let local = NaiveDateTime::new(day, clock);
    offset
        .from_local_datetime(&local)
        .single()
        .map(|dt| dt.timestamp())
        .ok_or_else(|| FormatError::NonexistentTime(local.to_string()))
}

/// Normalizes the maps link an organizer stored on-chain into something a
/// browser can open.
///
/// - bare `lat,lng` coordinates become a Google Maps query
/// - `googleusercontent` redirect wrappers are unwrapped to the inner maps URL
/// - scheme-less links get `https://`
pub fn clean_maps_link(raw: &str) -> String {
    let link = raw.trim();
    if link.is_empty() {
        return String::new();
    }

    if is_coordinate_pair(link) {
        let compact: String = link.chars().filter(|c| !c.is_whitespace()).collect();
        return format!("https://www.google.com/maps?q={}", compact);
    }

    if link.contains("googleusercontent") || link.contains("maps.google.com/10") {
        let inner = ["maps.google.com", "goo.gl"]
            .iter()
            .filter_map(|needle| link.find(needle))
            .min();
        if let Some(start) = inner {
            return format!("https://{}", &link[start..]);
        }
    }

    if !link.starts_with("http") {
        return format!("https://{}", link);
    }
    link.to_string()
}

/// Google Maps search URL for a free-text place description.
pub fn maps_search_link(query: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(query.as_bytes()).collect();
    format!("https://www.google.com/maps/search/?api=1&query={}", encoded)
}

/// Block explorer page of a transaction.
pub fn explorer_tx_link(explorer_url: &str, tx_hash: TxHash) -> String {
    format!("{}/tx/{:?}", explorer_url.trim_end_matches('/'), tx_hash)
}

fn is_coordinate_pair(text: &str) -> bool {
    let mut parts = text.split(',');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(lat), Some(lng), None) => is_decimal(lat) && is_decimal(lng.trim_start()),
        _ => false,
    }
}

// `-?\d+(\.\d+)?`
fn is_decimal(text: &str) -> bool {
    let digits = text.strip_prefix('-').unwrap_or(text);
    let (whole, fraction) = match digits.split_once('.') {
        Some((w, f)) => (w, Some(f)),
        None => (digits, None),
    };
    let all_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    all_digits(whole) && fraction.map_or(true, all_digits)
}

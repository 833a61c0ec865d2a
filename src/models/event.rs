// src/models/event.rs
//! Event data model: on-chain listings, browse queries and creation drafts.

use crate::utils::format::{date_to_timestamp, maps_search_link, parse_event_date, FormatError};
use chrono::{FixedOffset, NaiveDate};
use ethers::types::{Address, U256};
use ethers::utils::parse_ether;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use thiserror::Error;

/// Snapshot of one deployed Event contract.
///
/// # Fields
/// - `address`: Event contract address
/// - `organizer`: Wallet that deployed the event through the factory
/// - `date` / `time`: Organizer-entered wall-clock strings (`YYYY-MM-DD`, `HH:MM`)
/// - `event_timestamp`: Unix seconds; the contract closes sales and unlocks withdrawal after it
/// - `price`: Ticket price in wei
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct EventListing {
    pub address: Address,
    pub organizer: Address,
    pub name: String,
    pub date: String,
    pub time: String,
    pub image_url: String,
    pub location_name: String,
    pub city: String,
    pub country: String,
    pub maps_link: String,
    pub price: U256,
    pub capacity: u64,
    pub sold_count: u64,
    pub is_cancelled: bool,
    pub event_timestamp: u64,
}

impl EventListing {
    pub fn is_sold_out(&self) -> bool {
        self.sold_count >= self.capacity
    }

    /// Whether the scheduled start lies strictly before `now_secs`.
    pub fn has_started(&self, now_secs: i64) -> bool {
        i64::try_from(self.event_timestamp).map_or(false, |start| now_secs > start)
    }

    /// Human-readable venue line: `"Venue, City"`, the city alone, or a placeholder.
    pub fn location_label(&self) -> String {
        match (self.location_name.is_empty(), self.city.is_empty()) {
            (false, _) => format!("{}, {}", self.location_name, self.city),
            (true, false) => self.city.clone(),
            (true, true) => "Location unavailable".to_string(),
        }
    }

    /// Percentage of capacity sold, rounded to the nearest integer.
    pub fn sell_through_percent(&self) -> u64 {
        if self.capacity == 0 {
            return 0;
        }
        let scaled = u128::from(self.sold_count) * 100 + u128::from(self.capacity / 2);
        u64::try_from(scaled / u128::from(self.capacity)).unwrap_or(u64::MAX)
    }
}

/// Ordering applied to browse results.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    DateAsc,
    DateDesc,
    PriceAsc,
    PriceDesc,
}

impl SortOrder {
    pub fn compare(self, a: &EventListing, b: &EventListing) -> Ordering {
        match self {
            SortOrder::DateAsc => a.event_timestamp.cmp(&b.event_timestamp),
            SortOrder::DateDesc => b.event_timestamp.cmp(&a.event_timestamp),
            SortOrder::PriceAsc => a.price.cmp(&b.price),
            SortOrder::PriceDesc => b.price.cmp(&a.price),
        }
    }
}

/// Filters for the public event list. Every filter is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventQuery {
    /// Case-insensitive match against name or venue line.
    pub search: Option<String>,
    /// Case-insensitive match against city or country.
    pub location: Option<String>,
    pub min_price: Option<U256>,
    pub max_price: Option<U256>,
    /// Only events on or after this calendar date.
    pub from_date: Option<NaiveDate>,
    pub hide_sold_out: bool,
    pub sort: SortOrder,
}

impl EventQuery {
    /// Whether `listing` passes every filter. Does not check cancellation or start time.
    pub fn matches(&self, listing: &EventListing) -> bool {
        let contains = |haystack: &str, needle: &str| haystack.to_lowercase().contains(&needle.to_lowercase());

        if let Some(search) = self.search.as_deref() {
            if !contains(&listing.name, search) && !contains(&listing.location_label(), search) {
                return false;
            }
        }
        if let Some(location) = self.location.as_deref() {
            if !contains(&listing.city, location) && !contains(&listing.country, location) {
                return false;
            }
        }
        if self.min_price.map_or(false, |min| listing.price < min) {
            return false;
        }
        if self.max_price.map_or(false, |max| listing.price > max) {
            return false;
        }
        if let Some(from) = self.from_date {
            match parse_event_date(&listing.date) {
                Ok(date) if date >= from => {}
                _ => return false,
            }
        }
        !(self.hide_sold_out && listing.is_sold_out())
    }
}

/// Reasons an organizer's draft cannot be submitted.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DraftError {
    #[error("field `{0}` is required")]
    MissingField(&'static str),

    #[error("ticket price `{0}` is not a non-negative ether amount")]
    InvalidPrice(String),

    #[error("capacity must be at least 1")]
    InvalidCapacity,

    #[error("event must start in the future")]
    StartsInPast,

    #[error(transparent)]
    Schedule(#[from] FormatError),
}

/// Event creation form as submitted by an organizer.
///
/// Price is an ether amount string (`"0.05"`), as typed by the organizer.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct EventDraft {
    pub name: String,
    pub date: String,
    pub time: String,
    pub image_url: String,
    pub location_name: String,
    pub city: String,
    pub country: String,
    #[serde(default)]
    pub maps_link: String,
    pub price: String,
    pub capacity: u64,
}

/// A draft that passed validation, ready for `createEvent`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedEvent {
    pub name: String,
    pub date: String,
    pub time: String,
    pub image_url: String,
    pub location_name: String,
    pub city: String,
    pub country: String,
    pub maps_link: String,
    pub price: U256,
    pub capacity: U256,
    pub event_timestamp: U256,
}

impl EventDraft {
    /// Checks the draft and converts it to contract arguments.
    ///
    /// # Arguments
    /// * `now_secs` - Current Unix time; the event must start after it
    /// * `offset` - Zone in which `date`/`time` are interpreted
    ///
    /// A missing maps link is replaced by a maps search for `"venue, city"`.
    pub fn validate(&self, now_secs: i64, offset: FixedOffset) -> Result<ValidatedEvent, DraftError> {
        for (field, value) in [
            ("name", &self.name),
            ("date", &self.date),
            ("time", &self.time),
            ("price", &self.price),
            ("location_name", &self.location_name),
            ("city", &self.city),
            ("country", &self.country),
            ("image_url", &self.image_url),
        ] {
            if value.trim().is_empty() {
                return Err(DraftError::MissingField(field));
            }
        }

        let price_text = self.price.trim();
        if price_text.starts_with('-') {
            return Err(DraftError::InvalidPrice(self.price.clone()));
        }
        let price = parse_ether(price_text).map_err(|_| DraftError::InvalidPrice(self.price.clone()))?;

        if self.capacity == 0 {
            return Err(DraftError::InvalidCapacity);
        }

        let event_timestamp = date_to_timestamp(&self.date, &self.time, offset)?;
        if event_timestamp <= now_secs {
            return Err(DraftError::StartsInPast);
        }

        let maps_link = if self.maps_link.trim().is_empty() {
            maps_search_link(&format!("{}, {}", self.location_name.trim(), self.city.trim()))
        } else {
            self.maps_link.trim().to_string()
        };

        Ok(ValidatedEvent {
            name: self.name.trim().to_string(),
            date: self.date.trim().to_string(),
            time: self.time.trim().to_string(),
            image_url: self.image_url.trim().to_string(),
            location_name: self.location_name.trim().to_string(),
            city: self.city.trim().to_string(),
            country: self.country.trim().to_string(),
            maps_link,
            price,
            capacity: U256::from(self.capacity),
            event_timestamp: U256::from(event_timestamp),
        })
    }
}

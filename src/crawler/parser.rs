//! Search payload decoding
//!
//! This module turns one search API response body into a [`PageResult`]:
//! - Locating the listing collection across response shapes
//! - Reading the reported page count
//! - Coercing each item into a [`RawListingRecord`], skipping bad items
//! - Deriving the absolute URL, the source tag and the open-house time

use crate::listing::{Field, RawListingRecord};
use chrono::{DateTime, NaiveDateTime};
use serde_json::{Map, Value};
use tracing::debug;

/// Keys under which the listing collection has been observed
const COLLECTION_KEYS: [&str; 5] = ["listings", "items", "results", "data", "edges"];

/// How deep to look for a nested collection
const MAX_SEARCH_DEPTH: usize = 4;

/// Display format of normalized timestamps
const LOCAL_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Outcome of decoding one search page
#[derive(Debug, Clone, PartialEq)]
pub enum PageResult {
    /// At least one listing decoded
    Listings {
        records: Vec<RawListingRecord>,
        /// Page count reported by the API, when present
        total_pages: Option<u32>,
        /// Items dropped because they failed coercion
        skipped: usize,
    },

    /// The collection was found and empty: no more results
    EndOfResults { total_pages: Option<u32> },

    /// The payload could not be understood
    Malformed { reason: String },
}

impl PageResult {
    pub fn len(&self) -> usize {
        match self {
            Self::Listings { records, .. } => records.len(),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Why one item was dropped
#[derive(Debug)]
struct DecodeError(String);

type DecodeResult<T> = Result<T, DecodeError>;

/// Decodes a search response body
///
/// # Arguments
///
/// * `body` - Raw response text
/// * `base_url` - Site origin used to absolutize relative listing URLs
/// * `source` - Provider tag stored on every record
pub fn decode_page(body: &str, base_url: &str, source: &str) -> PageResult {
    let payload: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(e) => {
            return PageResult::Malformed {
                reason: format!("response is not JSON: {}", e),
            }
        }
    };

    let Some(root) = payload.as_object() else {
        return PageResult::Malformed {
            reason: "top-level JSON value is not an object".to_string(),
        };
    };

    let Some(items) = find_collection(root, 0) else {
        return PageResult::Malformed {
            reason: "no listing collection in response".to_string(),
        };
    };

    let total_pages = find_total_pages(root, 0);

    if items.is_empty() {
        return PageResult::EndOfResults { total_pages };
    }

    let mut records = Vec::with_capacity(items.len());
    let mut skipped = 0;
    for item in items {
        match decode_item(unwrap_node(item), base_url, source) {
            Ok(record) => records.push(record),
            Err(DecodeError(reason)) => {
                debug!(reason = %reason, "Skipping undecodable listing");
                skipped += 1;
            }
        }
    }

    if records.is_empty() {
        return PageResult::Malformed {
            reason: format!("all {} listings failed to decode", skipped),
        };
    }

    PageResult::Listings {
        records,
        total_pages,
        skipped,
    }
}

/// Finds the first array stored under a collection key
///
/// Top-level keys win; otherwise nested objects are searched in order.
fn find_collection(object: &Map<String, Value>, depth: usize) -> Option<&Vec<Value>> {
    for key in COLLECTION_KEYS {
        if let Some(Value::Array(items)) = object.get(key) {
            return Some(items);
        }
    }

    if depth >= MAX_SEARCH_DEPTH {
        return None;
    }

    object
        .values()
        .filter_map(Value::as_object)
        .find_map(|inner| find_collection(inner, depth + 1))
}

/// Reads the reported page count, or derives it from item totals
fn find_total_pages(object: &Map<String, Value>, depth: usize) -> Option<u32> {
    for key in ["totalPages", "total_pages", "pageCount"] {
        if let Some(pages) = object.get(key).and_then(as_u64) {
            return Some(pages.min(u32::MAX as u64) as u32);
        }
    }

    let total = ["totalCount", "total_count", "total"]
        .iter()
        .find_map(|key| object.get(*key).and_then(as_u64));
    let per_page = ["perPage", "per_page", "pageSize"]
        .iter()
        .find_map(|key| object.get(*key).and_then(as_u64))
        .filter(|n| *n > 0);
    if let (Some(total), Some(per_page)) = (total, per_page) {
        return Some(total.div_ceil(per_page).min(u32::MAX as u64) as u32);
    }

    if depth >= MAX_SEARCH_DEPTH {
        return None;
    }

    object
        .values()
        .filter_map(Value::as_object)
        .find_map(|inner| find_total_pages(inner, depth + 1))
}

fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Edge/node responses wrap each listing in `{"node": {...}}`
fn unwrap_node(item: &Value) -> &Value {
    item.get("node").filter(|n| n.is_object()).unwrap_or(item)
}

/// Looks up the first present key among `keys`
fn lookup<'a>(item: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| item.get(*key))
}

/// Applies `coerce` to the first present key; missing keys stay absent
fn field<T>(
    item: &Map<String, Value>,
    keys: &[&str],
    coerce: impl Fn(&Value) -> DecodeResult<Option<T>>,
) -> DecodeResult<Field<T>> {
    match lookup(item, keys) {
        None => Ok(Field::Absent),
        Some(Value::Null) => Ok(Field::Null),
        Some(value) => coerce(value)
            .map(Field::from)
            .map_err(|DecodeError(e)| DecodeError(format!("{}: {}", keys[0], e))),
    }
}

fn text(value: &Value) -> DecodeResult<Option<String>> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
        }
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::Bool(b) => Ok(Some(b.to_string())),
        _ => Err(DecodeError("expected text".to_string())),
    }
}

/// Text that may also arrive as `{"name": ...}`
fn named_text(value: &Value) -> DecodeResult<Option<String>> {
    match value {
        Value::Object(inner) => match inner.get("name") {
            Some(Value::Null) | None => Ok(None),
            Some(name) => text(name),
        },
        other => text(other),
    }
}

/// Lists arrive as arrays of strings or of `{"name": ...}`
fn joined_text(value: &Value) -> DecodeResult<Option<String>> {
    match value {
        Value::Array(entries) => {
            let parts = entries
                .iter()
                .map(named_text)
                .collect::<DecodeResult<Vec<_>>>()?;
            let joined = parts.into_iter().flatten().collect::<Vec<_>>().join(", ");
            Ok((!joined.is_empty()).then_some(joined))
        }
        other => named_text(other),
    }
}

/// Extracts the leading number of a display string such as "1.5 ba"
fn leading_number(s: &str) -> Option<f64> {
    let start = s.find(|c: char| c.is_ascii_digit())?;
    let rest = &s[start..];
    let end = rest
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(rest.len());
    rest[..end].trim_end_matches('.').parse().ok()
}

fn real(value: &Value) -> DecodeResult<Option<f64>> {
    match value {
        Value::Number(n) => Ok(n.as_f64()),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) if s.to_lowercase().contains("studio") => Ok(Some(0.0)),
        Value::String(s) => leading_number(s)
            .map(Some)
            .ok_or_else(|| DecodeError(format!("not a number: {:?}", s))),
        _ => Err(DecodeError("expected a number".to_string())),
    }
}

/// Whole numbers; display strings like "$3,200" keep only their digits
fn integer(value: &Value) -> DecodeResult<Option<i64>> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.round() as i64))
            .map(Some)
            .ok_or_else(|| DecodeError("number out of range".to_string())),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => {
            let whole = s.split('.').next().unwrap_or_default();
            let digits: String = whole.chars().filter(char::is_ascii_digit).collect();
            if digits.is_empty() {
                return Err(DecodeError(format!("not a number: {:?}", s)));
            }
            let magnitude: i64 = digits
                .parse()
                .map_err(|_| DecodeError(format!("number out of range: {:?}", s)))?;
            Ok(Some(if whole.trim_start().starts_with('-') {
                -magnitude
            } else {
                magnitude
            }))
        }
        _ => Err(DecodeError("expected a number".to_string())),
    }
}

fn flag(value: &Value) -> DecodeResult<Option<bool>> {
    match value {
        Value::Bool(b) => Ok(Some(*b)),
        Value::Number(n) => Ok(n.as_f64().map(|f| f != 0.0)),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "" => Ok(None),
            "true" | "yes" | "1" => Ok(Some(true)),
            "false" | "no" | "0" => Ok(Some(false)),
            _ => Err(DecodeError(format!("not a flag: {:?}", s))),
        },
        _ => Err(DecodeError("expected a flag".to_string())),
    }
}

/// Normalizes an ISO-8601 timestamp to wall-clock `YYYY-MM-DD HH:MM:SS`
///
/// The time is kept in the offset it was written in. Unparseable input
/// yields `None`.
pub fn normalize_timestamp(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.naive_local().format(LOCAL_TIMESTAMP_FORMAT).to_string());
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.format(LOCAL_TIMESTAMP_FORMAT).to_string())
}

/// Open houses arrive as `{"startTime": ...}` or a bare string
fn open_house(value: &Value) -> DecodeResult<Option<String>> {
    let start = match value {
        Value::Object(inner) => inner.get("startTime").or_else(|| inner.get("start_time")),
        other => Some(other),
    };
    Ok(start.and_then(Value::as_str).and_then(normalize_timestamp))
}

fn external_id(item: &Map<String, Value>) -> DecodeResult<String> {
    let id = lookup(item, &["id", "listing_id", "listingId", "seo_id", "hash_id"])
        .ok_or_else(|| DecodeError("missing listing id".to_string()))?;
    match id {
        Value::String(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(DecodeError("unusable listing id".to_string())),
    }
}

fn absolute_url(base_url: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        path.to_string()
    } else {
        format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

/// Decodes one listing item
fn decode_item(item: &Value, base_url: &str, source: &str) -> DecodeResult<RawListingRecord> {
    let item = item
        .as_object()
        .ok_or_else(|| DecodeError("listing is not an object".to_string()))?;

    let mut record = RawListingRecord::new(source, external_id(item)?);

    record.url_path = field(item, &["urlPath", "url_path"], text)?;
    record.url = field(item, &["url", "canonical_url", "canonicalUrl"], text)?
        .or(record.url_path.clone())
        .map(|path| absolute_url(base_url, &path));

    record.address = field(item, &["address", "display_address", "displayAddress"], text)?;
    record.neighborhood = field(item, &["neighborhood"], named_text)?;
    record.borough = field(item, &["borough"], named_text)?;
    record.beds = field(item, &["beds", "bedrooms", "bedroomCount"], real)?;
    record.baths = field(item, &["baths", "bathrooms", "bathroomCount"], real)?;
    record.sqft = field(item, &["sqft", "size_sqft"], integer)?;
    record.price = field(item, &["price", "price_display", "priceDisplay"], integer)?;

    record.fee = match lookup(item, &["noFee", "no_fee"]) {
        Some(_) => field(item, &["noFee", "no_fee"], flag)?.map(|no_fee| !no_fee),
        None => field(item, &["fee"], flag)?,
    };

    record.latitude = field(item, &["latitude", "lat"], real)?;
    record.longitude = field(item, &["longitude", "lng", "lon"], real)?;
    if let Some(Value::Object(point)) = item.get("geoPoint") {
        record.latitude = record.latitude.or(field(point, &["latitude", "lat"], real)?);
        record.longitude = record
            .longitude
            .or(field(point, &["longitude", "lng", "lon"], real)?);
    }

    record.building_name = field(item, &["buildingName", "building_name"], named_text)?;
    record.unit = field(item, &["unit"], text)?;
    record.pets = field(item, &["pets"], joined_text)?;
    record.amenities = field(item, &["amenities"], joined_text)?;
    record.broker = field(item, &["broker", "sourceGroupLabel"], named_text)?;
    record.listed_at = field(item, &["listedAt", "listed_at"], text)?;
    record.area_name = field(item, &["areaName", "area_name"], text)?;
    record.available_at = field(item, &["availableAt", "available_at"], text)?;
    record.building_type = field(item, &["buildingType", "building_type"], text)?;
    record.full_bathroom_count = field(item, &["fullBathroomCount"], integer)?;
    record.half_bathroom_count = field(item, &["halfBathroomCount"], integer)?;
    record.furnished = field(item, &["furnished"], flag)?;
    record.has_tour_3d = field(item, &["hasTour3d", "has_tour_3d"], flag)?;
    record.has_videos = field(item, &["hasVideos", "has_videos"], flag)?;
    record.interesting_price_delta = field(item, &["interestingPriceDelta"], integer)?;
    record.is_new_development = field(item, &["isNewDevelopment"], flag)?;
    record.lease_term = field(item, &["leaseTerm", "lease_term"], integer)?;
    record.living_area_size = field(item, &["livingAreaSize", "living_area_size"], integer)?;
    record.months_free = field(item, &["monthsFree", "months_free"], real)?;
    record.net_effective_price = field(item, &["netEffectivePrice"], integer)?;
    record.off_market_at = field(item, &["offMarketAt", "off_market_at"], text)?;
    record.rello_express = field(item, &["relloExpress"], text)?;
    record.slug = field(item, &["slug"], text)?;
    record.source_group_label = field(item, &["sourceGroupLabel"], text)?;
    record.source_type = field(item, &["sourceType"], text)?;
    record.state = field(item, &["state"], text)?;
    record.status = field(item, &["status"], text)?;
    record.street = field(item, &["street"], text)?;
    record.upcoming_open_house = field(item, &["upcomingOpenHouse"], open_house)?;
    record.display_unit = field(item, &["displayUnit"], text)?;
    record.zip_code = field(item, &["zipCode", "zip_code"], text)?;
    record.tier = field(item, &["tier"], text)?;

    Ok(record)
}

//! Listing records as produced by the search client
//!
//! A `RawListingRecord` is one decoded API item, already validated and
//! renamed to the entity's attribute names. Every optional attribute is a
//! [`Field`], which keeps "the response omitted this key" apart from "the
//! response sent null", so the ingestion sink can leave omitted columns
//! untouched on update.

mod field;

pub use field::Field;

/// One listing as decoded from a search page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawListingRecord {
    /// Provider tag, part of the natural key
    pub source: String,

    /// Provider-side listing id, part of the natural key
    pub external_id: String,

    /// Absolute listing URL
    pub url: Field<String>,

    pub address: Field<String>,
    pub neighborhood: Field<String>,
    pub borough: Field<String>,
    pub beds: Field<f64>,
    pub baths: Field<f64>,
    pub sqft: Field<i64>,
    pub price: Field<i64>,
    pub fee: Field<bool>,
    pub latitude: Field<f64>,
    pub longitude: Field<f64>,
    pub building_name: Field<String>,
    pub unit: Field<String>,
    pub pets: Field<String>,
    pub amenities: Field<String>,
    pub broker: Field<String>,
    pub listed_at: Field<String>,
    pub area_name: Field<String>,
    pub available_at: Field<String>,
    pub building_type: Field<String>,
    pub full_bathroom_count: Field<i64>,
    pub half_bathroom_count: Field<i64>,
    pub furnished: Field<bool>,
    pub has_tour_3d: Field<bool>,
    pub has_videos: Field<bool>,
    pub interesting_price_delta: Field<i64>,
    pub is_new_development: Field<bool>,
    pub lease_term: Field<i64>,
    pub living_area_size: Field<i64>,
    pub months_free: Field<f64>,
    pub net_effective_price: Field<i64>,
    pub off_market_at: Field<String>,
    pub rello_express: Field<String>,
    pub slug: Field<String>,
    pub source_group_label: Field<String>,
    pub source_type: Field<String>,
    pub state: Field<String>,
    pub status: Field<String>,
    pub street: Field<String>,
    /// Normalized to `YYYY-MM-DD HH:MM:SS`; null when unparseable
    pub upcoming_open_house: Field<String>,
    pub display_unit: Field<String>,
    pub url_path: Field<String>,
    pub zip_code: Field<String>,
    pub tier: Field<String>,
}

impl RawListingRecord {
    /// Creates a record carrying only its natural key
    pub fn new(source: impl Into<String>, external_id: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            external_id: external_id.into(),
            ..Self::default()
        }
    }
}

//! Mapping from decoded listings to `listings` columns
//!
//! Only attributes present in the response become columns; an absent
//! attribute is left out of both the insert and the conflict update, so a
//! later sighting that omits a key never nulls what an earlier one stored.

use crate::listing::{Field, RawListingRecord};
use rusqlite::types::Value;

/// Present attributes of `record` as `(column, value)` pairs
pub(crate) fn listing_columns(record: &RawListingRecord) -> Vec<(&'static str, Value)> {
    let mut columns = Columns::default();

    columns.text("url", &record.url);
    columns.text("address", &record.address);
    columns.text("neighborhood", &record.neighborhood);
    columns.text("borough", &record.borough);
    columns.real("beds", &record.beds);
    columns.real("baths", &record.baths);
    columns.integer("sqft", &record.sqft);
    columns.integer("price", &record.price);
    columns.flag("fee", &record.fee);
    columns.real("latitude", &record.latitude);
    columns.real("longitude", &record.longitude);
    columns.text("building_name", &record.building_name);
    columns.text("unit", &record.unit);
    columns.text("pets", &record.pets);
    columns.text("amenities", &record.amenities);
    columns.text("broker", &record.broker);
    columns.text("listed_at", &record.listed_at);
    columns.text("area_name", &record.area_name);
    columns.text("available_at", &record.available_at);
    columns.text("building_type", &record.building_type);
    columns.integer("full_bathroom_count", &record.full_bathroom_count);
    columns.integer("half_bathroom_count", &record.half_bathroom_count);
    columns.flag("furnished", &record.furnished);
    columns.flag("has_tour_3d", &record.has_tour_3d);
    columns.flag("has_videos", &record.has_videos);
    columns.integer("interesting_price_delta", &record.interesting_price_delta);
    columns.flag("is_new_development", &record.is_new_development);
    columns.integer("lease_term", &record.lease_term);
    columns.integer("living_area_size", &record.living_area_size);
    columns.real("months_free", &record.months_free);
    columns.integer("net_effective_price", &record.net_effective_price);
    columns.text("off_market_at", &record.off_market_at);
    columns.text("rello_express", &record.rello_express);
    columns.text("slug", &record.slug);
    columns.text("source_group_label", &record.source_group_label);
    columns.text("source_type", &record.source_type);
    columns.text("state", &record.state);
    columns.text("status", &record.status);
    columns.text("street", &record.street);
    columns.text("upcoming_open_house", &record.upcoming_open_house);
    columns.text("display_unit", &record.display_unit);
    columns.text("url_path", &record.url_path);
    columns.text("zip_code", &record.zip_code);
    columns.text("tier", &record.tier);

    columns.0
}

#[derive(Default)]
struct Columns(Vec<(&'static str, Value)>);

impl Columns {
    fn push<T>(&mut self, name: &'static str, field: &Field<T>, convert: impl FnOnce(&T) -> Value) {
        match field {
            Field::Absent => {}
            Field::Null => self.0.push((name, Value::Null)),
            Field::Value(v) => self.0.push((name, convert(v))),
        }
    }

    fn text(&mut self, name: &'static str, field: &Field<String>) {
        self.push(name, field, |v| Value::Text(v.clone()));
    }

    fn integer(&mut self, name: &'static str, field: &Field<i64>) {
        self.push(name, field, |v| Value::Integer(*v));
    }

    fn real(&mut self, name: &'static str, field: &Field<f64>) {
        self.push(name, field, |v| {
            if v.is_finite() {
                Value::Real(*v)
            } else {
                Value::Null
            }
        });
    }

    fn flag(&mut self, name: &'static str, field: &Field<bool>) {
        self.push(name, field, |v| Value::Integer(i64::from(*v)));
    }
}

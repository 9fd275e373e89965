//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the listing database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track crawl runs
CREATE TABLE IF NOT EXISTS crawl_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL,
    units_completed INTEGER NOT NULL DEFAULT 0,
    units_failed INTEGER NOT NULL DEFAULT 0
);

-- Latest known state of every listing
CREATE TABLE IF NOT EXISTS listings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source TEXT NOT NULL,
    external_id TEXT NOT NULL,
    url TEXT,
    address TEXT,
    neighborhood TEXT,
    borough TEXT,
    beds REAL,
    baths REAL,
    sqft INTEGER,
    price INTEGER,
    fee INTEGER,
    latitude REAL,
    longitude REAL,
    building_name TEXT,
    unit TEXT,
    pets TEXT,
    amenities TEXT,
    broker TEXT,
    listed_at TEXT,
    area_name TEXT,
    available_at TEXT,
    building_type TEXT,
    full_bathroom_count INTEGER,
    half_bathroom_count INTEGER,
    furnished INTEGER,
    has_tour_3d INTEGER,
    has_videos INTEGER,
    interesting_price_delta INTEGER,
    is_new_development INTEGER,
    lease_term INTEGER,
    living_area_size INTEGER,
    months_free REAL,
    net_effective_price INTEGER,
    off_market_at TEXT,
    rello_express TEXT,
    slug TEXT,
    source_group_label TEXT,
    source_type TEXT,
    state TEXT,
    status TEXT,
    street TEXT,
    upcoming_open_house TEXT,
    display_unit TEXT,
    url_path TEXT,
    zip_code TEXT,
    tier TEXT,
    first_seen_at TEXT NOT NULL,
    last_seen_at TEXT NOT NULL,
    UNIQUE(source, external_id)
);

CREATE INDEX IF NOT EXISTS idx_listings_area ON listings(area_name);
CREATE INDEX IF NOT EXISTS idx_listings_status ON listings(status);

-- One row per price sighting
CREATE TABLE IF NOT EXISTS price_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    listing_id INTEGER NOT NULL REFERENCES listings(id),
    price INTEGER NOT NULL,
    observed_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_price_history_listing ON price_history(listing_id);

-- Neighborhood catalog (work unit source)
CREATE TABLE IF NOT EXISTS neighborhoods (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    level INTEGER,
    parent_id INTEGER,
    slug TEXT
);

CREATE INDEX IF NOT EXISTS idx_neighborhoods_parent ON neighborhoods(parent_id);

-- Table-backed checkpoint store
CREATE TABLE IF NOT EXISTS checkpoints (
    unit TEXT PRIMARY KEY,
    completed_at TEXT NOT NULL
);

-- Read interface for dashboards and exports
CREATE VIEW IF NOT EXISTS listing_read_view AS
SELECT
    id,
    source,
    external_id,
    url,
    address,
    COALESCE(area_name, neighborhood) AS area_name,
    COALESCE(borough, state) AS borough,
    beds,
    baths,
    COALESCE(living_area_size, sqft) AS living_area_size,
    price,
    fee,
    latitude,
    longitude,
    status,
    available_at,
    off_market_at,
    zip_code,
    last_seen_at
FROM listings;
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

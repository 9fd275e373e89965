//! Neighborhood catalog
//!
//! The catalog is the list of areas the site knows about, arranged as a tree
//! through `parent_id`. Work units are drawn from it: either every area at a
//! chosen hierarchy level, or the leaves of the tree.

use crate::storage::Storage;
use crate::{CrawlError, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

/// One area of the catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Neighborhood {
    pub id: i64,
    pub name: String,
    pub level: Option<i64>,
    pub parent_id: Option<i64>,
    /// URL slug; derived from the name when unset
    pub slug: Option<String>,
}

/// A crawlable scope handed to the orchestrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkUnit {
    pub id: i64,
    pub name: String,
    /// Identifier used in search URLs and in the checkpoint store
    pub slug: String,
    pub level: Option<i64>,
}

impl WorkUnit {
    /// Builds a unit from a catalog entry, deriving the slug when missing
    pub fn from_neighborhood(neighborhood: &Neighborhood) -> Self {
        let slug = match neighborhood.slug.as_deref().map(str::trim) {
            Some(slug) if !slug.is_empty() => slug.to_string(),
            _ => slugify(&neighborhood.name),
        };
        Self {
            id: neighborhood.id,
            name: neighborhood.name.clone(),
            slug,
            level: neighborhood.level,
        }
    }
}

/// Derives a URL slug from a display name
///
/// Lowercases and turns every space into a hyphen, nothing more. Slugs stored
/// in the catalog and lines in existing checkpoint files were produced the
/// same way, so other characters are left alone.
///
/// ```
/// use listing_crawler::slugify;
///
/// assert_eq!(slugify("Upper West Side"), "upper-west-side");
/// assert_eq!(slugify("Hell's Kitchen"), "hell's-kitchen");
/// ```
pub fn slugify(name: &str) -> String {
    name.to_lowercase().replace(' ', "-")
}

/// Picks the work units for a run
///
/// With a level, every area at that level; otherwise the leaf areas. Catalog
/// order is kept.
pub fn select_work_units(neighborhoods: &[Neighborhood], level: Option<i64>) -> Vec<WorkUnit> {
    match level {
        Some(level) => neighborhoods
            .iter()
            .filter(|n| n.level == Some(level))
            .map(WorkUnit::from_neighborhood)
            .collect(),
        None => {
            let parents: HashSet<i64> = neighborhoods.iter().filter_map(|n| n.parent_id).collect();
            neighborhoods
                .iter()
                .filter(|n| !parents.contains(&n.id))
                .map(WorkUnit::from_neighborhood)
                .collect()
        }
    }
}

#[derive(Debug, Deserialize)]
struct AreaDump {
    #[serde(default)]
    data: Option<AreaData>,
}

#[derive(Debug, Deserialize)]
struct AreaData {
    #[serde(default)]
    areas: Vec<Area>,
}

#[derive(Debug, Deserialize)]
struct Area {
    id: i64,
    name: String,
    #[serde(default)]
    level: Option<i64>,
    #[serde(default)]
    parent_id: Option<i64>,
}

/// Parses the site's area dump (`{"data": {"areas": [...]}}`)
pub fn parse_catalog_json(content: &str) -> Result<Vec<Neighborhood>> {
    let dump: AreaDump = serde_json::from_str(content)?;
    let areas = dump.data.map(|d| d.areas).unwrap_or_default();
    if areas.is_empty() {
        return Err(CrawlError::Catalog(
            "area dump contains no data.areas entries".to_string(),
        ));
    }

    Ok(areas
        .into_iter()
        .map(|area| Neighborhood {
            id: area.id,
            name: area.name,
            level: area.level,
            parent_id: area.parent_id,
            slug: None,
        })
        .collect())
}

/// Loads an area dump from disk into the `neighborhoods` table
///
/// # Returns
///
/// The number of areas written.
pub fn import_catalog<S: Storage + ?Sized>(storage: &mut S, path: &Path) -> Result<usize> {
    let content = std::fs::read_to_string(path)?;
    let neighborhoods = parse_catalog_json(&content)?;
    let written = storage.upsert_neighborhoods(&neighborhoods)?;
    info!(
        path = %path.display(),
        areas = neighborhoods.len(),
        "Imported neighborhood catalog"
    );
    Ok(written)
}

/// Loads work units from storage, failing when the catalog is empty
pub fn load_work_units<S: Storage + ?Sized>(storage: &S, level: Option<i64>) -> Result<Vec<WorkUnit>> {
    let neighborhoods = storage.load_neighborhoods()?;
    if neighborhoods.is_empty() {
        return Err(CrawlError::Catalog(
            "neighborhood catalog is empty; import it first".to_string(),
        ));
    }
    Ok(select_work_units(&neighborhoods, level))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hood(id: i64, name: &str, level: i64, parent_id: Option<i64>) -> Neighborhood {
        Neighborhood {
            id,
            name: name.to_string(),
            level: Some(level),
            parent_id,
            slug: None,
        }
    }

    fn catalog() -> Vec<Neighborhood> {
        vec![
            hood(1, "Manhattan", 1, None),
            hood(2, "Midtown", 2, Some(1)),
            hood(3, "Midtown East", 3, Some(2)),
            hood(4, "SoHo", 2, Some(1)),
        ]
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Midtown"), "midtown");
        assert_eq!(slugify("Hell's Kitchen"), "hell's-kitchen");
        assert_eq!(slugify("Upper  East Side"), "upper--east-side");
        assert_eq!(slugify("Bedford-Stuyvesant"), "bedford-stuyvesant");
        assert_eq!(slugify("St. George"), "st.-george");
    }

    #[test]
    fn test_leaf_selection() {
        let units = select_work_units(&catalog(), None);
        let slugs: Vec<&str> = units.iter().map(|u| u.slug.as_str()).collect();
        assert_eq!(slugs, vec!["midtown-east", "soho"]);
    }

    #[test]
    fn test_level_selection() {
        let units = select_work_units(&catalog(), Some(2));
        let slugs: Vec<&str> = units.iter().map(|u| u.slug.as_str()).collect();
        assert_eq!(slugs, vec!["midtown", "soho"]);
    }

    #[test]
    fn test_stored_slug_wins() {
        let mut hoods = catalog();
        hoods[3].slug = Some("soho-nyc".to_string());
        let units = select_work_units(&hoods, Some(2));
        assert_eq!(units[1].slug, "soho-nyc");
    }

    #[test]
    fn test_parse_catalog_json() {
        let json = r#"{"data": {"areas": [
            {"id": 1, "name": "Manhattan", "level": 1, "parent_id": null, "extra": true},
            {"id": 2, "name": "Midtown", "level": 2, "parent_id": 1}
        ]}}"#;

        let hoods = parse_catalog_json(json).unwrap();

        assert_eq!(hoods.len(), 2);
        assert_eq!(hoods[0].parent_id, None);
        assert_eq!(hoods[1].parent_id, Some(1));
    }

    #[test]
    fn test_parse_catalog_without_areas() {
        assert!(matches!(
            parse_catalog_json(r#"{"data": {}}"#),
            Err(CrawlError::Catalog(_))
        ));
        assert!(matches!(
            parse_catalog_json("not json"),
            Err(CrawlError::Json(_))
        ));
    }

    #[test]
    fn test_import_catalog_into_storage() {
        let dir = tempfile::TempDir::new().unwrap();
        let dump = dir.path().join("neighborhoods.json");
        std::fs::write(
            &dump,
            r#"{"data": {"areas": [
                {"id": 1, "name": "Manhattan", "level": 1},
                {"id": 2, "name": "Midtown", "level": 2, "parent_id": 1}
            ]}}"#,
        )
        .unwrap();

        let mut storage = crate::storage::open_storage(&dir.path().join("crawl.db")).unwrap();
        assert_eq!(import_catalog(&mut storage, &dump).unwrap(), 2);

        let units = load_work_units(&storage, None).unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].slug, "midtown");
    }

    #[test]
    fn test_empty_catalog_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let storage = crate::storage::open_storage(&dir.path().join("crawl.db")).unwrap();
        assert!(matches!(
            load_work_units(&storage, None),
            Err(CrawlError::Catalog(_))
        ));
    }
}

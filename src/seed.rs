use serde::Deserialize;
use serde_json::Value;

use crate::error::AppError;
use crate::store::sqlite::GrampsDb;

const SAMPLE_TREE_JSON: &str = include_str!("../assets/sample_tree.json");

/// Default person of the bundled sample tree (Lewis Anderson Garner).
pub const SAMPLE_DEFAULT_PERSON: &str = "GNUJQCL9MD64AM56OH";

#[derive(Debug, Deserialize)]
struct SampleTree {
    default_person: String,
    #[serde(default)]
    places: Vec<Value>,
    #[serde(default)]
    events: Vec<Value>,
    #[serde(default)]
    people: Vec<Value>,
    #[serde(default)]
    families: Vec<Value>,
}

/// Load the bundled sample tree into `db` unless it already holds people.
/// Returns whether anything was written.
pub fn seed_if_empty(db: &GrampsDb) -> Result<bool, AppError> {
    if !db.is_empty()? {
        return Ok(false);
    }

    let tree: SampleTree = serde_json::from_str(SAMPLE_TREE_JSON)?;
    for place in &tree.places {
        db.upsert_place(place)?;
    }
    for event in &tree.events {
        db.upsert_event(event)?;
    }
    for person in &tree.people {
        db.upsert_person(person)?;
    }
    for family in &tree.families {
        db.upsert_family(family)?;
    }
    db.set_default_person(&tree.default_person)?;

    tracing::debug!(
        people = tree.people.len(),
        families = tree.families.len(),
        events = tree.events.len(),
        places = tree.places.len(),
        "seeded sample tree"
    );
    Ok(true)
}

/// In-memory database holding the sample tree.
pub fn sample_database() -> Result<GrampsDb, AppError> {
    let db = GrampsDb::open_in_memory()?;
    seed_if_empty(&db)?;
    Ok(db)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeding_is_idempotent() {
        let db = GrampsDb::open_in_memory().unwrap();
        assert!(seed_if_empty(&db).unwrap());
        assert!(!seed_if_empty(&db).unwrap());
        assert_eq!(db.all_people().unwrap().len(), 6);
    }

    #[test]
    fn sample_tree_relationships_resolve() {
        let db = sample_database().unwrap();

        let start = db.default_person().unwrap().unwrap();
        assert_eq!(start["handle"], SAMPLE_DEFAULT_PERSON);

        assert_eq!(db.mother_of(SAMPLE_DEFAULT_PERSON).unwrap()["gramps_id"], "I0006");
        assert_eq!(db.father_of(SAMPLE_DEFAULT_PERSON).unwrap()["gramps_id"], "I0005");
        assert_eq!(
            db.children_of(SAMPLE_DEFAULT_PERSON).unwrap(),
            vec!["EUGENE0GARNER0003".to_string(), "JENNIE0GARNER0004".to_string()]
        );
        assert_eq!(db.birth_date(SAMPLE_DEFAULT_PERSON).unwrap(), "1855-06-21");
        assert_eq!(db.death_date(SAMPLE_DEFAULT_PERSON).unwrap(), "1911-06-28");
        assert_eq!(db.birth_place(SAMPLE_DEFAULT_PERSON).unwrap(), "Wheeling, WV, USA");
        assert_eq!(db.death_place(SAMPLE_DEFAULT_PERSON).unwrap(), "Great Falls, Cascade, MT, USA");
        assert_eq!(db.event_handles_of(SAMPLE_DEFAULT_PERSON).unwrap().len(), 3);
        assert_eq!(db.child_in_families(SAMPLE_DEFAULT_PERSON).unwrap()[0]["gramps_id"], "F0002");
    }

    #[test]
    fn sample_tree_edge_cases() {
        let db = sample_database().unwrap();

        assert_eq!(db.birth_date("JENNIE0GARNER0004").unwrap(), "");
        assert!(db.children_of("JENNIE0GARNER0004").unwrap().is_empty());
        assert!(db.mother_of("ROBERT0GARNER0005").is_err());

        assert_eq!(db.birth_date("LUELLA0MARTEL0002").unwrap(), "about 1852");
        assert_eq!(db.birth_place("LUELLA0MARTEL0002").unwrap(), "");
        assert_eq!(db.birth_date("ROBERT0GARNER0005").unwrap(), "sometime before the war");
    }

    #[test]
    fn name_search_spans_alternate_names_and_diacritics() {
        let db = sample_database().unwrap();
        assert_eq!(db.find_people_by_name("garner").unwrap().len(), 4);
        assert_eq!(db.find_people_by_name("GARDNER").unwrap().len(), 1);
        assert_eq!(db.find_people_by_name("andy").unwrap().len(), 1);
        assert_eq!(db.find_people_by_name("zieliń").unwrap().len(), 1);
        assert!(db.find_people_by_name("nobody").unwrap().is_empty());
    }
}

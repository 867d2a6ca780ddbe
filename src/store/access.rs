//! Relationship and display helpers layered over the raw record lookups.
//!
//! These follow the Gramps "simple access" conventions: a person's parents
//! come from their main (first) parent family, their children from their
//! main (first) own family, and birth/death come from the event referenced
//! by `birth_ref_index` / `death_ref_index`.

use std::collections::HashSet;

use regex::RegexBuilder;
use serde_json::Value;

use crate::error::AppError;
use crate::store::sqlite::GrampsDb;

const MAX_PLACE_DEPTH: usize = 16;

impl GrampsDb {
    pub fn mother_of(&self, person_handle: &str) -> Result<Value, AppError> {
        self.parent_of(person_handle, "mother_handle", "mother")
    }

    pub fn father_of(&self, person_handle: &str) -> Result<Value, AppError> {
        self.parent_of(person_handle, "father_handle", "father")
    }

    fn parent_of(&self, person_handle: &str, key: &str, label: &str) -> Result<Value, AppError> {
        let person = self.get_person(person_handle)?;
        let parent = match handles(&person, "parent_family_list").first() {
            Some(family_handle) => {
                let family = self.get_family(family_handle)?;
                str_field(&family, key).map(str::to_string)
            }
            None => None,
        };
        match parent {
            Some(handle) => self.get_person(&handle),
            None => Err(AppError::Message(format!(
                "No {label} is recorded for person '{person_handle}'"
            ))),
        }
    }

    pub fn children_of(&self, person_handle: &str) -> Result<Vec<String>, AppError> {
        let person = self.get_person(person_handle)?;
        let Some(family_handle) = handles(&person, "family_list").first().cloned() else {
            return Ok(Vec::new());
        };
        let family = self.get_family(&family_handle)?;
        Ok(refs(&family, "child_ref_list"))
    }

    pub fn event_handles_of(&self, person_handle: &str) -> Result<Vec<String>, AppError> {
        let person = self.get_person(person_handle)?;
        Ok(refs(&person, "event_ref_list"))
    }

    pub fn child_in_families(&self, person_handle: &str) -> Result<Vec<Value>, AppError> {
        let person = self.get_person(person_handle)?;
        handles(&person, "parent_family_list")
            .iter()
            .map(|h| self.get_family(h))
            .collect()
    }

    pub fn birth_date(&self, person_handle: &str) -> Result<String, AppError> {
        self.vital_event(person_handle, "birth_ref_index")
            .map(|e| e.map(|e| display_date(e.get("date"))).unwrap_or_default())
    }

    pub fn death_date(&self, person_handle: &str) -> Result<String, AppError> {
        self.vital_event(person_handle, "death_ref_index")
            .map(|e| e.map(|e| display_date(e.get("date"))).unwrap_or_default())
    }

    pub fn birth_place(&self, person_handle: &str) -> Result<String, AppError> {
        match self.vital_event(person_handle, "birth_ref_index")? {
            Some(event) => self.display_event_place(&event),
            None => Ok(String::new()),
        }
    }

    pub fn death_place(&self, person_handle: &str) -> Result<String, AppError> {
        match self.vital_event(person_handle, "death_ref_index")? {
            Some(event) => self.display_event_place(&event),
            None => Ok(String::new()),
        }
    }

    pub fn event_place(&self, event_handle: &str) -> Result<String, AppError> {
        let event = self.get_event(event_handle)?;
        self.display_event_place(&event)
    }

    fn vital_event(&self, person_handle: &str, index_key: &str) -> Result<Option<Value>, AppError> {
        let person = self.get_person(person_handle)?;
        let index = person.get(index_key).and_then(Value::as_i64).unwrap_or(-1);
        if index < 0 {
            return Ok(None);
        }
        let event_refs = refs(&person, "event_ref_list");
        match event_refs.get(index as usize) {
            Some(handle) => self.get_event(handle).map(Some),
            None => Ok(None),
        }
    }

    fn display_event_place(&self, event: &Value) -> Result<String, AppError> {
        match str_field(event, "place") {
            Some(handle) => self.display_place(handle),
            None => Ok(String::new()),
        }
    }

    /// Full place title, innermost first, walking the enclosed-by chain.
    pub fn display_place(&self, place_handle: &str) -> Result<String, AppError> {
        let mut parts = Vec::new();
        let mut seen = HashSet::new();
        let mut current = Some(place_handle.to_string());

        while let Some(handle) = current.take() {
            if !seen.insert(handle.clone()) || seen.len() > MAX_PLACE_DEPTH {
                break;
            }
            let place = self.get_place(&handle)?;
            let name = place
                .get("name")
                .and_then(|n| n.get("value"))
                .and_then(Value::as_str)
                .or_else(|| str_field(&place, "title"))
                .unwrap_or_default();
            if !name.is_empty() {
                parts.push(name.to_string());
            }
            current = refs(&place, "placeref_list").into_iter().next();
        }

        Ok(parts.join(", "))
    }

    /// People whose primary or alternate names contain `search` (case-insensitive).
    pub fn find_people_by_name(&self, search: &str) -> Result<Vec<Value>, AppError> {
        let pattern = RegexBuilder::new(&regex::escape(search))
            .case_insensitive(true)
            .build()
            .map_err(|e| AppError::Message(e.to_string()))?;

        let mut matches = Vec::new();
        for person in self.all_people()? {
            let primary = person.get("primary_name").into_iter();
            let alternates = person
                .get("alternate_names")
                .and_then(Value::as_array)
                .into_iter()
                .flatten();
            let hit = primary
                .chain(alternates)
                .any(|name| name_matches(name, &|s: &str| pattern.is_match(s)));
            if hit {
                matches.push(person);
            }
        }
        Ok(matches)
    }
}

const NAME_FIELDS: [&str; 8] = [
    "first_name", "prefix", "suffix", "title", "call", "nick", "famnick", "patronymic",
];
const SURNAME_FIELDS: [&str; 3] = ["surname", "prefix", "connector"];

fn name_matches(name: &Value, is_match: &dyn Fn(&str) -> bool) -> bool {
    let field_hit = |obj: &Value, fields: &[&str]| {
        fields
            .iter()
            .filter_map(|f| str_field(obj, f))
            .any(|v| !v.is_empty() && is_match(v))
    };

    if field_hit(name, &NAME_FIELDS) {
        return true;
    }
    name.get("surname_list")
        .and_then(Value::as_array)
        .map(|list| list.iter().any(|s| field_hit(s, &SURNAME_FIELDS)))
        .unwrap_or(false)
}

fn str_field<'a>(obj: &'a Value, key: &str) -> Option<&'a str> {
    obj.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn handles(obj: &Value, key: &str) -> Vec<String> {
    obj.get(key)
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Handles out of a `[{ "ref": ... }]` reference list.
fn refs(obj: &Value, key: &str) -> Vec<String> {
    obj.get(key)
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter_map(|r| r.get("ref").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Render a Gramps date record as ISO `yyyy-mm-dd`, dropping unknown parts.
///
/// `dateval` is `[day, month, year, slash]`. A date with no numeric parts
/// falls back to its free-text form.
pub fn display_date(date: Option<&Value>) -> String {
    let Some(date) = date else {
        return String::new();
    };
    if let Some(s) = date.as_str() {
        return s.to_string();
    }

    let part = |i: usize| {
        date.get("dateval")
            .and_then(Value::as_array)
            .and_then(|v| v.get(i))
            .and_then(Value::as_i64)
            .unwrap_or(0)
    };
    let (day, month, year) = (part(0), part(1), part(2));

    if year == 0 && month == 0 && day == 0 {
        return str_field(date, "text").unwrap_or_default().to_string();
    }

    let mut out = if year > 0 { format!("{year:04}") } else { "????".to_string() };
    if month > 0 {
        out.push_str(&format!("-{month:02}"));
        if day > 0 {
            out.push_str(&format!("-{day:02}"));
        }
    }

    let quality = match date.get("quality").and_then(Value::as_i64).unwrap_or(0) {
        1 => "estimated ",
        2 => "calculated ",
        _ => "",
    };
    let modifier = match date.get("modifier").and_then(Value::as_i64).unwrap_or(0) {
        1 => "before ",
        2 => "after ",
        3 => "about ",
        _ => "",
    };
    format!("{quality}{modifier}{out}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn dates_render_like_iso_with_modifiers() {
        assert_eq!(display_date(None), "");
        assert_eq!(display_date(Some(&json!({ "dateval": [21, 6, 1855, false] }))), "1855-06-21");
        assert_eq!(display_date(Some(&json!({ "dateval": [0, 3, 1901, false] }))), "1901-03");
        assert_eq!(
            display_date(Some(&json!({ "dateval": [0, 0, 1820, false], "modifier": 3 }))),
            "about 1820"
        );
        assert_eq!(
            display_date(Some(&json!({ "dateval": [0, 0, 1790, false], "quality": 1, "modifier": 1 }))),
            "estimated before 1790"
        );
        assert_eq!(
            display_date(Some(&json!({ "dateval": [0, 0, 0, false], "text": "in the spring" }))),
            "in the spring"
        );
        assert_eq!(display_date(Some(&json!("1900"))), "1900");
    }

    #[test]
    fn name_matching_covers_surnames_and_nicknames() {
        let name = json!({
            "first_name": "Lewis Anderson",
            "nick": "Lew",
            "surname_list": [{ "surname": "Garner", "prefix": "von" }]
        });
        let contains = |needle: &'static str| move |s: &str| s.to_lowercase().contains(needle);
        assert!(name_matches(&name, &contains("garner")));
        assert!(name_matches(&name, &contains("lew")));
        assert!(name_matches(&name, &contains("von")));
        assert!(!name_matches(&name, &contains("zielinski")));
    }
}

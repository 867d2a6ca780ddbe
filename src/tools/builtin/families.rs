use serde_json::Value;

use crate::error::AppError;
use crate::store::sqlite::GrampsDb;
use crate::tools::registry::require_str;

pub fn get_family(db: &GrampsDb, args: &Value) -> Result<Value, AppError> {
    db.get_family(&require_str(args, "family_handle")?)
}

pub fn get_children_of_person(db: &GrampsDb, args: &Value) -> Result<Value, AppError> {
    let children = db.children_of(&require_str(args, "person_handle")?)?;
    Ok(serde_json::json!(children))
}

pub fn get_child_in_families(db: &GrampsDb, args: &Value) -> Result<Value, AppError> {
    Ok(Value::Array(db.child_in_families(&require_str(args, "person_handle")?)?))
}

use serde_json::Value;

use crate::error::AppError;
use crate::store::sqlite::GrampsDb;
use crate::tools::registry::require_str;

pub fn get_person_event_list(db: &GrampsDb, args: &Value) -> Result<Value, AppError> {
    let handles = db.event_handles_of(&require_str(args, "person_handle")?)?;
    Ok(serde_json::json!(handles))
}

pub fn get_event(db: &GrampsDb, args: &Value) -> Result<Value, AppError> {
    db.get_event(&require_str(args, "event_handle")?)
}

pub fn get_event_place(db: &GrampsDb, args: &Value) -> Result<Value, AppError> {
    db.event_place(&require_str(args, "event_handle")?).map(Value::String)
}

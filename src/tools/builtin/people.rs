use serde_json::Value;

use crate::error::AppError;
use crate::store::sqlite::GrampsDb;
use crate::tools::registry::require_str;

pub fn start_point(db: &GrampsDb, _args: &Value) -> Result<Value, AppError> {
    Ok(db.default_person()?.unwrap_or(Value::Null))
}

pub fn get_person(db: &GrampsDb, args: &Value) -> Result<Value, AppError> {
    db.get_person(&require_str(args, "person_handle")?)
}

pub fn get_mother_of_person(db: &GrampsDb, args: &Value) -> Result<Value, AppError> {
    db.mother_of(&require_str(args, "person_handle")?)
}

pub fn get_father_of_person(db: &GrampsDb, args: &Value) -> Result<Value, AppError> {
    db.father_of(&require_str(args, "person_handle")?)
}

pub fn get_person_birth_date(db: &GrampsDb, args: &Value) -> Result<Value, AppError> {
    db.birth_date(&require_str(args, "person_handle")?).map(Value::String)
}

pub fn get_person_death_date(db: &GrampsDb, args: &Value) -> Result<Value, AppError> {
    db.death_date(&require_str(args, "person_handle")?).map(Value::String)
}

pub fn get_person_birth_place(db: &GrampsDb, args: &Value) -> Result<Value, AppError> {
    db.birth_place(&require_str(args, "person_handle")?).map(Value::String)
}

pub fn get_person_death_place(db: &GrampsDb, args: &Value) -> Result<Value, AppError> {
    db.death_place(&require_str(args, "person_handle")?).map(Value::String)
}

pub fn find_people_by_name(db: &GrampsDb, args: &Value) -> Result<Value, AppError> {
    let search = require_str(args, "search_string")?;
    Ok(Value::Array(db.find_people_by_name(&search)?))
}

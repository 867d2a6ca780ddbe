pub mod events;
pub mod families;
pub mod people;

use crate::error::AppError;
use crate::store::sqlite::GrampsDb;
use crate::tools::definition::{JsonType, ToolDescriptor};
use crate::tools::registry::ToolRegistry;

const PERSON_HANDLE: &str = "person_handle";

/// The read-only genealogy toolset, in the order it is offered to the model.
pub fn registry() -> Result<ToolRegistry<GrampsDb>, AppError> {
    let mut r = ToolRegistry::new();

    r.register(
        ToolDescriptor::new(
            "start_point",
            "Get the start of the genealogy tree, i.e., the default person. \
             The \"first_name\" contains call names of the person, the \"surname\" contains last name of the person.",
        ),
        people::start_point,
    )?;
    r.register(
        person_tool("get_person", "Given a person's handle, get the data dictionary of that person."),
        people::get_person,
    )?;
    r.register(
        person_tool("get_mother_of_person", "Given a person's handle, return their mother's data dictionary."),
        people::get_mother_of_person,
    )?;
    r.register(
        person_tool("get_father_of_person", "Given a person's handle, return their father's data dictionary."),
        people::get_father_of_person,
    )?;
    r.register(
        ToolDescriptor::new(
            "get_family",
            "Get a family's data given the family handle. Note that family handles are different from a person handle. \
             You can use a person's family data to get the family handle. The result contains several handles: \
             \"father_handle\" is the person_handle of the father in the family, \"mother_handle\" is the person_handle \
             of the mother, and each item of \"child_ref_list\" has a \"ref\" which is the person_handle of a child. \
             Details of the persons can be retrieved using the \"get_person\" tool.",
        )
        .param("family_handle", JsonType::String, ""),
        families::get_family,
    )?;
    r.register(
        person_tool(
            "get_children_of_person",
            "Get a list of children handles of a person's main family, given a person's handle.",
        ),
        families::get_children_of_person,
    )?;
    r.register(
        person_tool("get_person_birth_date", "Given a person's handle, return the birth date as a string."),
        people::get_person_birth_date,
    )?;
    r.register(
        person_tool("get_person_death_date", "Given a person's handle, return the death date as a string."),
        people::get_person_death_date,
    )?;
    r.register(
        person_tool("get_person_birth_place", "Given a person's handle, return the birth place as a string."),
        people::get_person_birth_place,
    )?;
    r.register(
        person_tool("get_person_death_place", "Given a person's handle, return the death place as a string."),
        people::get_person_death_place,
    )?;
    r.register(
        person_tool(
            "get_person_event_list",
            "Get a list of event handles associated with a person, given the person handle. \
             Use `get_event(event_handle)` to look up details about an event.",
        ),
        events::get_person_event_list,
    )?;
    r.register(
        ToolDescriptor::new("get_event", "Given an event_handle, get the associated data dictionary.")
            .param("event_handle", JsonType::String, ""),
        events::get_event,
    )?;
    r.register(
        ToolDescriptor::new("get_event_place", "Given an event_handle, return the associated place string.")
            .param("event_handle", JsonType::String, ""),
        events::get_event_place,
    )?;
    r.register(
        person_tool(
            "get_child_in_families",
            "Retrieve detailed information about all families where the given person is listed as a child. \
             Use it to identify the person's siblings and parents. Returns a list of family data dictionaries.",
        ),
        families::get_child_in_families,
    )?;
    r.register(
        ToolDescriptor::new(
            "find_people_by_name",
            "Search for people whose primary or alternate names contain the given search string (case-insensitive). \
             Returns a list of the matching people's data dictionaries.",
        )
        .param("search_string", JsonType::String, "The string to match in person names."),
        people::find_people_by_name,
    )?;

    Ok(r)
}

fn person_tool(name: &str, description: &str) -> ToolDescriptor {
    ToolDescriptor::new(name, description).param(PERSON_HANDLE, JsonType::String, "")
}

pub mod access;
pub mod sqlite;

pub use sqlite::GrampsDb;

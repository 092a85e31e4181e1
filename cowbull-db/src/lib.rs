pub mod db;
pub mod models;
pub mod slot;
pub mod store;

pub use rusqlite;

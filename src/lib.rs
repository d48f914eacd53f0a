pub mod ai;
pub mod audit;
pub mod catalog;
pub mod column;
pub mod config;
pub mod database;
pub mod engine;
pub mod error;
pub mod guard;
pub mod ident;
pub mod identity;
pub mod ingest;
pub mod literal;
pub mod masking;
pub mod models;
pub mod person;
pub mod reader;
pub mod schema;
pub mod store;
pub mod table_store;

pub use config::VaultConfig;
pub use engine::VaultEngine;
pub use error::VaultError;
pub use identity::{Caller, Role};

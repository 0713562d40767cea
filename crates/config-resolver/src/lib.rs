//! A layered, meta-directive-driven configuration database for a hardware design flow driver.
//!
//! Providers (flattened `key -> value` mappings, optionally paired with `key_meta` directives) are
//! folded onto one another in precedence order, then any `lazy*` directives left over are
//! evaluated in dependency order. See [`database::ConfigDatabase`] for the entry point.

pub use self::{
    database::{ConfigDatabase, Layer},
    error::{ConfigError, ConfigErrorKind, ConfigResult},
    loader::{load_from_defaults, load_from_file, load_from_paths, load_from_str, Format},
    value::Value,
};

pub mod database;
mod directive;
mod eager;
pub mod error;
pub mod flatten;
mod loader;
mod scheduler;
pub mod value;

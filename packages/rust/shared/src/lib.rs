//! Shared types, error model, and configuration for besengine.
//!
//! This crate is the foundation depended on by all other besengine crates.
//! It provides:
//! - [`BesEngineError`], the unified error type
//! - Domain types ([`Recipe`], [`ActionDescriptor`], [`ActionCollection`])
//! - Configuration ([`AppConfig`], config and recipe loading)
//! - XML 1.0 name and character checks ([`is_xml_name`], [`first_invalid_char`])

pub mod config;
pub mod error;
pub mod types;
pub mod xml;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, ConsoleConfig, DefaultsConfig, config_dir, config_file_path, console_password,
    expand_home, init_config, load_config, load_config_from, load_recipe,
};
pub use error::{BesEngineError, Result};
pub use types::{
    ActionCollection, ActionDescriptor, ActionEntry, DEFAULT_ACTION_NAME, KeyedAction,
    LinkDescription, MimeField, Recipe, SelfServiceSettings, emission_order,
};
pub use xml::{first_invalid_char, is_xml_char, is_xml_name};

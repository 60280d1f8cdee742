//! Configuration schema and discovery.
//!
//! Config files are `haggler.{toml,yaml,yml,json}`, searched project-local
//! first and then under `~/.config/haggler/`. String values support
//! `${ENV_VAR}` substitution so cookie strings can stay out of the file.

pub mod env_subst;
pub mod loader;
pub mod schema;

pub use {
    loader::{discover_and_load, load_config, set_config_dir},
    schema::{AccountEntry, GatewaySettings, HagglerConfig},
};

//! Configuration model for filewarden.
//!
//! The config file is YAML and is only read from an explicit path
//! (`--config`). Parsing is forward-compatible (unknown fields are ignored),
//! every field has a default, and values are validated after parsing.

mod model;
mod operations;
pub mod types;


pub use model::Config;

//! CLI subcommand implementations for the harvester binary.

pub mod doctor;
pub mod fetch_cmd;
pub mod serve_cmd;
pub mod workspaces_cmd;

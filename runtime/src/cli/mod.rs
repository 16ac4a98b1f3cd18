//! CLI subcommand implementations for the tagger binary.

pub mod client;
pub mod doctor;
pub mod extract_cmd;
pub mod history_cmd;
pub mod output;
pub mod pid;
pub mod start;
pub mod status;
pub mod stop;
pub mod tag_cmd;
pub mod toggle_cmd;

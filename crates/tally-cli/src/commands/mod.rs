pub mod add;
pub mod auth_cmd;
pub mod category;
pub mod common;
pub mod config;
pub mod delete;
pub mod edit;
pub mod import;
pub mod list;
pub mod prefs;
pub mod sync;
pub mod watch;

//! amadeus-relay - OneBot relay with hot-reloadable native plugins

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod plugins;
pub mod utils;

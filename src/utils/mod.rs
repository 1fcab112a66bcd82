//! Small shared helpers

pub mod time_format;

pub use time_format::timestamp_format;

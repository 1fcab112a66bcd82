//! Platform adapters

pub mod onebot;

pub use onebot::{OneBotClient, OneBotServer};

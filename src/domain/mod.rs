//! Domain layer - Core types with no infrastructure dependencies
//!
//! This layer contains:
//! - Entities: OneBot events and action requests
//! - Traits: Abstractions for infrastructure (Bot)

pub mod entities;
pub mod traits;

//! Application layer - Use cases and business logic
//!
//! This layer contains:
//! - Services: Plugin lifecycle orchestration
//! - Errors: Domain-specific errors
//! - Messaging: Event dispatching

pub mod errors;
pub mod services;
pub mod messaging;

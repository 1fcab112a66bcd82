//! Event handling - Routing events from the OneBot connection

pub mod dispatcher;

pub use dispatcher::EventDispatcher;

//! Domain entities - OneBot events and action requests

pub mod event;
pub mod request;

pub use event::{Event, MessageKind, Sender};
pub use request::{GroupMessage, PrivateMessage, Request};

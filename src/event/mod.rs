//! Out-of-band event bus
//!
//! Components publish [`Event`]s on an [`EventChannel`]. Readers either pull
//! events by id (blocking or not), or register an [`EventListener`] that the
//! channel notifies asynchronously through its [`Dispatcher`].

mod channel;
mod record;

pub use channel::{Dispatcher, EventChannel, EventListener};
pub use record::{Event, EventPayload, EventState};

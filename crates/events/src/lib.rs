//! `stackview-events`: presentation event plumbing.
//!
//! Mechanics only: an event naming trait, a sequenced envelope and a
//! broadcast bus. The concrete event set lives with the engine.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};

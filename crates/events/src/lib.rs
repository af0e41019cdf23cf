//! Stock and catalog change notifications.
//!
//! Ledger writes are the source of truth; events are published only after a
//! business transaction commits, for consumers that keep their own views.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};

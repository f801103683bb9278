//! Per-item timer entities
//!
//! Each item identity with a pending due date is owned by exactly one
//! logical timer entity. The entity keeps the last item snapshot it saw and
//! a single pending wake-up; messages for one identity are processed one at
//! a time by the [`EntityDispatcher`].
//!
//! ```text
//! create ──► armed ──wake-up──► reevaluate ──► overdue / deleted
//!              ▲                    │
//!              └──── re-armed ◄─────┘
//! ```

mod dispatcher;
mod message;
mod snapshot;
mod state_store;
mod timer;

pub use dispatcher::EntityDispatcher;
pub use message::{EntityCommand, EntityCommandSink, EntityOutcome, TimerMessage};
pub use snapshot::{TimerSnapshot, WakeUp, WakeUpToken};
pub use state_store::{EntityStateStore, InMemoryEntityStateStore};
pub use timer::{EntityContext, TimerEntity, WakeUpScheduler};

//! Session timer core.
//!
//! - `clock`: time sources (system and manual)
//! - `store`: key/value storage and record persistence
//! - `bus`: cross-instance record propagation
//! - `engine`: the timer state machine
//! - `cycle`: focus/break interval sequencing
//! - `summary`: actual-vs-estimated completion summary
//! - `error`: error types

pub mod bus;
pub mod clock;
pub mod cycle;
pub mod engine;
pub mod error;
pub mod store;
pub mod summary;

pub use bus::{BusMessage, BusSubscription, CrossInstanceBus};
pub use clock::{ManualTimeSource, SystemTimeSource, TimeSource};
pub use cycle::{IntervalCycle, PhaseRequest};
pub use engine::{TimerContext, TimerEngine, TimerEvent};
pub use error::{StoreError, TimerError};
pub use store::{FileStore, KeyValueStore, LoadOutcome, MemoryStore, RecordStore};
pub use summary::SessionSummary;

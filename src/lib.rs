//! Study Timer Library
//!
//! This library provides the core functionality for the Study Timer CLI.
//! It includes:
//! - Timer engine with crash recovery, cross-instance sync and a duration cap
//! - Focus/break interval cycle on top of the engine
//! - Daemon with tick loop, IPC server and reminder scheduler
//! - CLI command parsing and display utilities
//! - Type definitions for records, configuration and IPC

pub mod cli;
pub mod daemon;
pub mod timer;
pub mod types;

// Re-export commonly used types for convenience
pub use timer::{
    CrossInstanceBus, IntervalCycle, ManualTimeSource, RecordStore, SessionSummary,
    SystemTimeSource, TimeSource, TimerContext, TimerEngine, TimerError, TimerEvent,
};
pub use types::{
    CycleConfig, IpcRequest, IpcResponse, PersistedTimerRecord, ResponseData, StartParams,
    TimerConfig, TimerIdentity, TimerPhase,
};

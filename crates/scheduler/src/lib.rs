//! Per-user polling scheduler and deduplication engine.
//!
//! Every active user gets one [`Poller`] task running the
//! fetch → dedup → deliver → advance-watermark cycle on its own interval.
//! The [`Supervisor`] owns the table of running pollers and is the only
//! component that starts or stops them.

pub mod cycle;
pub mod event;
pub mod poller;
pub mod supervisor;

pub use cycle::{CycleOutcome, CycleReport};
pub use event::PollerEvent;
pub use poller::{Poller, PollerDeps, PollerOptions};
pub use supervisor::Supervisor;

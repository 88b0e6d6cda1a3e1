//! Core application primitives (time buckets, pass runtime, scheduling, status server)

pub mod http;
pub mod runtime;
pub mod scheduler;
pub mod timeframe;

pub use runtime::{AlertOutcome, ReportHandle, RunReport, SignalRuntime, SymbolIssue};
pub use scheduler::{cron_expression, JobScheduler, SchedulerError};
pub use timeframe::{BucketResolver, DisplayTime, DisplayZone, TimeBucket};

//! Consolidated alert delivery.
//!
//! The runtime hands every sink one [`AlertBatch`] per pass holding the
//! already-deduplicated events. Sinks only report success or failure; a
//! failed send never re-opens the dedup window.

pub mod batch;
pub mod sink;

pub use batch::AlertBatch;
pub use sink::{AlertError, AlertSink, LogAlertSink, WebhookAlertSink};

//! loghook - the outbound alert delivery core of a structured-logging facade
//!
//! Log entries flagged for alerting are formatted into a bounded text
//! message and posted to an ordered list of webhook endpoints, with
//! per-endpoint rate limiting, bounded retries, and failover. Arbitrary
//! error values are first folded into a bounded [`serializer::ErrorNode`]
//! tree so an entry is always safe to format and ship.

pub mod config;
pub mod core;
pub mod dispatch;
pub mod formatting;
pub mod ratelimit;
pub mod serializer;

// Re-export the types most callers touch.
pub use crate::config::{Config, SerializerConfig, WebhookConfig};
pub use crate::core::{DiagnosticEvent, Level, LogEntry};
pub use crate::dispatch::{DispatchError, WebhookDispatcher};
pub use crate::ratelimit::RateLimiter;
pub use crate::serializer::{serialize, ErrorNode, SerializeLimits};

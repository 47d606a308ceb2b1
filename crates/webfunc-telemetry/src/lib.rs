//! Webfunc Telemetry - logging and request spans.
//!
//! # Example
//!
//! ```rust,no_run
//! use webfunc_telemetry::{LogConfig, LogFormat, RequestContext, setup_logging};
//!
//! # fn main() -> Result<(), webfunc_telemetry::TelemetryError> {
//! let _guard = setup_logging(
//!     &LogConfig::new("info")
//!         .with_format(LogFormat::Compact)
//!         .with_directive("webfunc_sandbox=debug"),
//! )?;
//!
//! let ctx = RequestContext::new("GET", "/hello");
//! let span = ctx.span();
//! let _entered = span.enter();
//! tracing::info!("handling request");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod context;
mod error;
mod logging;

pub use context::{RequestContext, RequestGuard};
pub use error::{TelemetryError, TelemetryResult};
pub use logging::{FileRotation, LogConfig, LogFormat, LogTarget, LoggingGuard, setup_logging};

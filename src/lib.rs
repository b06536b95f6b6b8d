//! Line-delimited ADC telemetry ingestion.
//!
//! ADC Monitor reads a continuous feed of JSON frames from a streaming
//! transport (typically a Bluetooth SPP link to an ESP32),
//! keeps a bounded rolling window of samples for plotting, and maintains
//! running statistics over the whole session.
//!
//! # Features
//!
//! - **Transport-agnostic**: anything that yields lines implements [`LineSource`]
//! - **Bounded memory**: the sample window evicts oldest-first at a fixed capacity
//! - **Steady output**: snapshots are published at a fixed cadence, not per frame
//! - **Fault tolerant**: malformed frames and dropped links degrade to log events
//!
//! # Pipeline
//!
//! ```text
//! transport bytes → line → FrameParser → Batch → {StatisticsAggregator, SampleBuffer}
//!                                                         → periodic Snapshot → SnapshotSink
//! ```
//!
//! ## Example (TCP bridge)
//!
//! ```rust,no_run
//! use adc_monitor::{AlwaysGranted, IngestionEngine, MonitorConfig};
//! use adc_monitor::transports::TcpTransport;
//! use futures::StreamExt;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> adc_monitor::Result<()> {
//!     let engine = IngestionEngine::new(MonitorConfig::default(), TcpTransport, AlwaysGranted)?;
//!     engine.connect("127.0.0.1:3333").await?;
//!
//!     let mut snapshots = Box::pin(engine.snapshots());
//!     while let Some(snapshot) = snapshots.next().await {
//!         println!("{:?} mean={:?}", snapshot.state, snapshot.stats.session_mean);
//!     }
//!     Ok(())
//! }
//! ```

// Core types and error handling
mod error;
mod events;
#[cfg_attr(any(test, feature = "benchmark"), path = "test_utils.rs")]
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Ingestion pipeline
pub mod buffer;
pub mod config;
pub mod parser;
pub mod stats;

// Connection lifecycle
pub mod connection;
pub mod driver;
pub mod transport;
pub mod transports;

// Composition and publication
pub mod engine;
pub mod publisher;

// Core exports
pub use error::*;
pub use events::EventBus;
pub use types::*;

// Main API exports
pub use buffer::SampleBuffer;
pub use config::MonitorConfig;
pub use connection::{ConnectionStateMachine, LinkTimeouts};
pub use driver::LineSink;
pub use engine::{IngestionEngine, SnapshotHandle};
pub use parser::FrameParser;
pub use publisher::{Snapshot, SnapshotSink, Subscription};
pub use stats::{DerivedStats, SessionStats, StatisticsAggregator};
pub use transport::{AlwaysGranted, LineSource, PermissionGate, ReleaseHandle, TransportFactory};

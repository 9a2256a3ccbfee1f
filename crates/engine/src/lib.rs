//! `stackview-engine`
//!
//! **Responsibility:** keep the aggregated inventory view in sync with the
//! remote service.
//!
//! This crate provides:
//! - The incremental scan (`scan`): paged pulls until nothing new arrives
//! - Trade reconciliation (`trade`): reservations and committed trades
//! - Presentation events (`publisher`) delivered over the event bus
//! - The `Engine` context tying these to a `Transport`

pub mod config;
pub mod engine;
pub mod protocol;
pub mod publisher;
pub mod scan;
pub mod trade;
pub mod transport;

pub use config::{ConfigError, EngineConfig, RescanPolicy};
pub use engine::{Engine, EngineError};
pub use protocol::{OfferPair, ProtocolEvent, TradeSide};
pub use publisher::{EventPublisher, PresentationEnvelope, PresentationEvent};
pub use scan::{BatchOutcome, ScanCoordinator, ScanError, ScanPhase};
pub use trade::{TradeError, TradeEvent, TradePhase, TradeReconciler};
pub use transport::{InMemoryTransport, OutboundCommand, Transport, TransportError};

//! `stackview-core`: protocol-independent building blocks.
//!
//! This crate contains **pure data** primitives shared by the store, the scan
//! coordinator and the trade reconciler (no IO, no locking).

pub mod error;
pub mod id;
pub mod item;
pub mod value;

pub use error::{DomainError, DomainResult};
pub use id::{ItemId, ScanGeneration};
pub use item::{Item, ItemKind};
pub use value::Value;

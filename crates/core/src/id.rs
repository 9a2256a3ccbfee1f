//! Strongly-typed identifiers.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Identifier of an item, unique within the remote inventory.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(i64);

/// Generation of an inventory scan. Bumped on every scan start.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScanGeneration(u64);

macro_rules! impl_int_newtype {
    ($t:ty, $inner:ty, $name:literal) => {
        impl $t {
            pub const fn new(raw: $inner) -> Self {
                Self(raw)
            }

            pub const fn get(&self) -> $inner {
                self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<$inner> for $t {
            fn from(value: $inner) -> Self {
                Self(value)
            }
        }

        impl From<$t> for $inner {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let raw = s
                    .trim()
                    .parse::<$inner>()
                    .map_err(|e| DomainError::invalid_id(format!("{}: {}", $name, e)))?;
                Ok(Self(raw))
            }
        }
    };
}

impl_int_newtype!(ItemId, i64, "ItemId");
impl_int_newtype!(ScanGeneration, u64, "ScanGeneration");

impl ScanGeneration {
    /// The generation that follows this one.
    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_id_parses_and_displays() {
        let id: ItemId = " 42 ".parse().unwrap();
        assert_eq!(id, ItemId::new(42));
        assert_eq!(id.to_string(), "42");
    }

    #[test]
    fn item_id_rejects_garbage() {
        let err = "chair".parse::<ItemId>().unwrap_err();
        assert!(matches!(err, DomainError::InvalidId(msg) if msg.starts_with("ItemId")));
    }

    #[test]
    fn generations_advance() {
        let g = ScanGeneration::default();
        assert_eq!(g.next().get(), 1);
        assert!(g.next() > g);
    }
}

//! Type-safe logical dataset keys.
//!
//! A [`DatasetKey`] names one refreshable unit: the combined order books of
//! every configured venue, a single venue's order book, or one
//! `(type, region)` history series. The string form doubles as the id of the
//! refresh marker row and as the WebSocket subscription target.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SyncError;

/// Marker id shared by the combined order-book refresh.
const MARKET_ORDERS: &str = "market_order";

/// Identifies one refreshable dataset.
///
/// | Variant | String form |
/// |---|---|
/// | `MarketOrders` | `market_order` |
/// | `VenueOrders("jita")` | `orders:jita` |
/// | `History { type_id: 34, region_id: 10000002 }` | `history:34:10000002` |
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DatasetKey {
    /// Order books of all configured venues, refreshed together.
    MarketOrders,
    /// Order book of one named venue.
    VenueOrders(String),
    /// Daily history of one type in one region.
    History {
        /// Item type id.
        type_id: i32,
        /// Region id.
        region_id: i32,
    },
}

impl DatasetKey {
    /// Shorthand for the venue order-book key.
    #[must_use]
    pub fn venue(name: &str) -> Self {
        Self::VenueOrders(name.to_string())
    }

    /// Shorthand for the history key.
    #[must_use]
    pub const fn history(type_id: i32, region_id: i32) -> Self {
        Self::History { type_id, region_id }
    }
}

impl fmt::Display for DatasetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MarketOrders => f.write_str(MARKET_ORDERS),
            Self::VenueOrders(name) => write!(f, "orders:{name}"),
            Self::History { type_id, region_id } => write!(f, "history:{type_id}:{region_id}"),
        }
    }
}

impl FromStr for DatasetKey {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || SyncError::UnknownDataset(s.to_string());
        if s == MARKET_ORDERS {
            return Ok(Self::MarketOrders);
        }
        match s.split(':').collect::<Vec<_>>().as_slice() {
            ["orders", name] if !name.is_empty() => Ok(Self::VenueOrders((*name).to_string())),
            ["history", type_id, region_id] => {
                let type_id = type_id.parse().map_err(|_| unknown())?;
                let region_id = region_id.parse().map_err(|_| unknown())?;
                Ok(Self::History { type_id, region_id })
            }
            _ => Err(unknown()),
        }
    }
}

impl TryFrom<String> for DatasetKey {
    type Error = SyncError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DatasetKey> for String {
    fn from(key: DatasetKey) -> Self {
        key.to_string()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_marker_ids() {
        assert_eq!(DatasetKey::MarketOrders.to_string(), "market_order");
        assert_eq!(DatasetKey::venue("jita").to_string(), "orders:jita");
        assert_eq!(
            DatasetKey::history(34, 10000002).to_string(),
            "history:34:10000002"
        );
    }

    #[test]
    fn parse_accepts_every_form() {
        let Ok(key) = "history:44992:19000001".parse::<DatasetKey>() else {
            panic!("history key should parse");
        };
        assert_eq!(key, DatasetKey::history(44992, 19000001));

        let Ok(key) = "orders:frt".parse::<DatasetKey>() else {
            panic!("venue key should parse");
        };
        assert_eq!(key, DatasetKey::venue("frt"));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!("orders:".parse::<DatasetKey>().is_err());
        assert!("history:abc:1".parse::<DatasetKey>().is_err());
        assert!("history:1".parse::<DatasetKey>().is_err());
        assert!("prices".parse::<DatasetKey>().is_err());
    }

    #[test]
    fn serde_uses_string_form() {
        let json = serde_json::to_string(&DatasetKey::venue("jita")).ok();
        assert_eq!(json.as_deref(), Some("\"orders:jita\""));

        let parsed: Result<DatasetKey, _> = serde_json::from_str("\"market_order\"");
        assert!(matches!(parsed, Ok(DatasetKey::MarketOrders)));
    }
}

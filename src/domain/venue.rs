//! Market venues whose order books are refreshed as one unit.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use utoipa::ToSchema;

use crate::error::SyncError;

/// Where a venue's orders come from on the remote API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VenueSource {
    /// Public region order book, filtered down to the venue's location.
    Region {
        /// Region id passed to the regional orders endpoint.
        region_id: i32,
    },
    /// Player structure market, requires an access token.
    Structure {
        /// Structure id passed to the structure orders endpoint.
        structure_id: i64,
    },
}

/// A trade hub whose order book is fetched and replaced as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Venue {
    /// Short unique name (e.g. `"jita"`).
    pub name: String,
    /// Location id that scopes the venue's orders.
    pub location_id: i64,
    /// Remote resource holding the orders.
    pub source: VenueSource,
    /// First page probed when discovering the page count.
    pub probe_seed: u32,
    /// Forward jump used while bracketing the last page.
    pub probe_step: u32,
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.location_id)
    }
}

/// Parses a venue from its configuration form.
///
/// - `name:region:<region_id>:<location_id>:<seed>:<step>`
/// - `name:structure:<structure_id>:<seed>:<step>`
impl FromStr for Venue {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |what: &str| SyncError::Config(format!("invalid venue `{s}`: {what}"));
        let parts: Vec<&str> = s.trim().split(':').collect();
        match parts.as_slice() {
            [name, "region", region_id, location_id, seed, step] => Ok(Self {
                name: parse_name(name).ok_or_else(|| invalid("empty name"))?,
                location_id: location_id.parse().map_err(|_| invalid("location id"))?,
                source: VenueSource::Region {
                    region_id: region_id.parse().map_err(|_| invalid("region id"))?,
                },
                probe_seed: seed.parse().map_err(|_| invalid("probe seed"))?,
                probe_step: step.parse().map_err(|_| invalid("probe step"))?,
            }),
            [name, "structure", structure_id, seed, step] => {
                let structure_id: i64 = structure_id.parse().map_err(|_| invalid("structure id"))?;
                Ok(Self {
                    name: parse_name(name).ok_or_else(|| invalid("empty name"))?,
                    location_id: structure_id,
                    source: VenueSource::Structure { structure_id },
                    probe_seed: seed.parse().map_err(|_| invalid("probe seed"))?,
                    probe_step: step.parse().map_err(|_| invalid("probe step"))?,
                })
            }
            _ => Err(invalid("expected name:region:... or name:structure:...")),
        }
    }
}

fn parse_name(name: &str) -> Option<String> {
    let name = name.trim();
    (!name.is_empty()).then(|| name.to_lowercase())
}

/// Parses a comma-separated venue list, rejecting duplicate names.
///
/// # Errors
///
/// Returns [`SyncError::Config`] on a malformed entry, a duplicate name, or
/// an empty list.
pub fn parse_venues(list: &str) -> Result<Vec<Venue>, SyncError> {
    let mut venues: Vec<Venue> = Vec::new();
    for entry in list.split(',').filter(|e| !e.trim().is_empty()) {
        let venue: Venue = entry.parse()?;
        if venues.iter().any(|v| v.name == venue.name) {
            return Err(SyncError::Config(format!("duplicate venue `{}`", venue.name)));
        }
        venues.push(venue);
    }
    if venues.is_empty() {
        return Err(SyncError::Config("no market venues configured".to_string()));
    }
    Ok(venues)
}

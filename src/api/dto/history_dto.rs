//! History read and batch DTOs.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::domain::HistoryOrder;
use crate::error::SyncError;
use crate::service::{HistoryBatchReport, HistorySeries};

/// Largest batch accepted by the history batch endpoints.
pub const MAX_BATCH_TYPE_IDS: usize = 1_000;

/// Query parameters for `GET /history/{region_id}/{type_id}`.
#[derive(Debug, Clone, Copy, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct HistoryQuery {
    /// `asc` (oldest first) or `desc` (newest first, default).
    #[serde(default)]
    pub order: HistoryOrder,
}

/// Query parameters for `GET /history/{region_id}/{type_id}/stats`.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StatsQuery {
    /// Extra comma-separated region ids to compute alongside the path one.
    #[serde(default)]
    pub also: Option<String>,
}

impl StatsQuery {
    /// Path region followed by the distinct extra regions.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidRequest`] if an extra id is not a number.
    pub fn regions(&self, region_id: i32) -> Result<Vec<i32>, SyncError> {
        let mut regions = vec![region_id];
        for part in self.also.iter().flat_map(|s| s.split(',')) {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let id: i32 = part
                .parse()
                .map_err(|_| SyncError::InvalidRequest(format!("invalid region id `{part}`")))?;
            if !regions.contains(&id) {
                regions.push(id);
            }
        }
        Ok(regions)
    }
}

/// Request body for `POST /history/refresh` and `POST /history/batch`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct HistoryBatchRequest {
    /// Region to refresh.
    pub region_id: i32,
    /// Item type ids; duplicates are ignored.
    pub type_ids: Vec<i32>,
    /// Row order of the returned series (batch read only).
    #[serde(default)]
    pub order: HistoryOrder,
}

impl HistoryBatchRequest {
    /// Rejects empty and oversized batches.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidRequest`] when `type_ids` is empty or
    /// longer than [`MAX_BATCH_TYPE_IDS`].
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.type_ids.is_empty() {
            return Err(SyncError::InvalidRequest("type_ids must not be empty".to_string()));
        }
        if self.type_ids.len() > MAX_BATCH_TYPE_IDS {
            return Err(SyncError::InvalidRequest(format!(
                "at most {MAX_BATCH_TYPE_IDS} type ids per batch"
            )));
        }
        Ok(())
    }
}

/// Response body for `POST /history/batch`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HistoryBatchResponse {
    /// What the staleness-filtered refresh did.
    pub report: HistoryBatchReport,
    /// One series per requested type id.
    pub data: Vec<HistorySeries>,
}

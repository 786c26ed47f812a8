//! Refresh trigger DTOs.

use serde::Deserialize;
use utoipa::ToSchema;

use crate::domain::DatasetKey;
use crate::error::SyncError;

/// Request body for `POST /refresh`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RefreshRequest {
    /// Dataset key: `market_order`, `orders:<venue>` or
    /// `history:<type_id>:<region_id>`.
    #[schema(example = "market_order")]
    pub dataset: String,
    /// Refresh even when the dataset is still fresh.
    #[serde(default)]
    pub force: bool,
}

impl RefreshRequest {
    /// Parses the requested dataset key.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::UnknownDataset`] for an unrecognised key.
    pub fn key(&self) -> Result<DatasetKey, SyncError> {
        self.dataset.parse()
    }
}

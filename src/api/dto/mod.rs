//! Data Transfer Objects for REST request/response serialization.
//!
//! Response bodies reuse the service report types where they already carry
//! the right shape; the types here cover request bodies, query strings and
//! list envelopes.

pub mod history_dto;
pub mod market_dto;
pub mod refresh_dto;

pub use history_dto::*;
pub use market_dto::*;
pub use refresh_dto::*;

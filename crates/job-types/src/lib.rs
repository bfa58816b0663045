//! Core types and traits for tracking long-running server-side jobs.
//!
//! DTOs mirror the JSON returned by the job API (`POST /import`, `GET /status/{jobId}`).

mod dto;
mod traits;

pub use dto::*;
pub use traits::*;

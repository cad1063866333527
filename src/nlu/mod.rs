//! Client for the external text-understanding service.
//!
//! The service is the last extraction strategy: it receives an utterance
//! plus a slot description and replies with the extracted value or an
//! explicit unparseable marker.

mod client;
mod types;

pub use client::NluClient;
pub use types::{ExtractRequest, ExtractResponse};

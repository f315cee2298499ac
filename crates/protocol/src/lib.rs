//! Wire types for the property valuation query API.
//!
//! These are shared by the core broker (which produces them) and the HTTP
//! layer (which serializes them). The two-call workflow is:
//!
//! 1. [`SearchRequest`] under a `session-id` header returns a list of [`Candidate`]s
//! 2. [`ValuationRequest`] under the same header returns a [`Valuation`]
//!
//! # Main Types
//!
//! - [`Candidate`] - A matched address with a stable, 1-based id
//! - [`Valuation`] - Estimated price range for a property, or a not-available marker
//! - [`BrokerStats`] - Admission broker counters

use serde::{Deserialize, Serialize};

/// Request header carrying the client-chosen session identifier.
pub const SESSION_HEADER: &str = "session-id";

/// Alternate spelling of [`SESSION_HEADER`] accepted from older clients.
pub const SESSION_HEADER_ALT: &str = "sessionid";

/// An address candidate returned by the search phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
	/// User-facing id, 1-based by position in the result list.
	pub id: u32,
	/// Display string of the matched address.
	pub display: String,
}

impl Candidate {
	pub fn new(id: u32, display: impl Into<String>) -> Self {
		Self {
			id,
			display: display.into(),
		}
	}
}

/// Valuation estimate for a single property.
///
/// When the site has no estimate for the target, `available` is `false` and
/// the figures are `null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Valuation {
	/// Address the valuation was resolved for.
	pub address: String,
	pub low: Option<String>,
	pub high: Option<String>,
	pub confidence: Option<String>,
	/// Whether an estimate was found.
	pub available: bool,
	/// Reason reported by the site when no estimate could be read.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}

impl Valuation {
	/// Builds an available estimate.
	pub fn estimate(address: impl Into<String>, low: impl Into<String>, high: impl Into<String>, confidence: impl Into<String>) -> Self {
		Self {
			address: address.into(),
			low: Some(low.into()),
			high: Some(high.into()),
			confidence: Some(confidence.into()),
			available: true,
			error: None,
		}
	}

	/// Builds a not-available result for `address`.
	pub fn unavailable(address: impl Into<String>) -> Self {
		Self {
			address: address.into(),
			low: None,
			high: None,
			confidence: None,
			available: false,
			error: None,
		}
	}

	/// Attaches the site-reported reason to a not-available result.
	pub fn with_error(mut self, error: impl Into<String>) -> Self {
		self.error = Some(error.into());
		self
	}
}

/// Snapshot of the admission broker counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerStats {
	/// Tasks currently holding an admission slot.
	pub active: usize,
	/// Tasks waiting for a slot.
	pub queued: usize,
	/// Maximum number of concurrently admitted tasks.
	pub ceiling: usize,
}

/// Body of `POST /search`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
	pub address: String,
}

/// Body of `POST /valuation`.
///
/// `address` overrides the address selected during search. It may also be a
/// candidate id (e.g. `"2"`) from the search results.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValuationRequest {
	#[serde(default)]
	pub address: Option<String>,
}

/// Data returned by `GET /stats`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStats {
	#[serde(flatten)]
	pub broker: BrokerStats,
	/// Sessions currently holding an open resource.
	pub open_sessions: usize,
}

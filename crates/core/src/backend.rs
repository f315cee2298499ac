//! External resource operations consumed by the session store.
//!
//! A [`PropertyBackend`] owns the expensive automation resource (a browser,
//! an HTTP session with cookies, ...). The store never inspects a handle; it
//! only moves it between the four operations below and guarantees that every
//! handle returned from [`acquire_and_search`](PropertyBackend::acquire_and_search)
//! reaches [`release`](PropertyBackend::release) exactly once.

use async_trait::async_trait;

use crate::error::Result;

/// An address candidate as reported by the backend.
///
/// `id` is whatever the backend uses internally; callers only ever see the
/// positional ids produced by the session store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateRecord {
	pub id: u64,
	pub display: String,
}

impl CandidateRecord {
	pub fn new(id: u64, display: impl Into<String>) -> Self {
		Self {
			id,
			display: display.into(),
		}
	}
}

/// Result of the search phase: the open resource plus what it found.
#[derive(Debug)]
pub struct SearchOutcome<H> {
	/// Open resource, now owned by the caller.
	pub handle: H,
	pub candidates: Vec<CandidateRecord>,
	/// Best guess at the intended address. Empty when nothing matched.
	pub selected: String,
}

/// What the resource showed once it reached the target page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
	Estimate { low: String, high: String, confidence: String },
	/// The page was reached but carried no estimate.
	Missing(String),
}

/// Replaceable driver for the target website.
///
/// Implementations report failures with the matching [`Error`](crate::Error)
/// kind: [`Acquisition`](crate::Error::Acquisition),
/// [`Navigation`](crate::Error::Navigation) or [`Read`](crate::Error::Read).
#[async_trait]
pub trait PropertyBackend: Send + Sync + 'static {
	/// Resource owned by a session between the two phases.
	type Handle: Send + 'static;

	/// Opens a resource and searches for `query`.
	///
	/// If this fails after a resource was opened, the implementation must
	/// close it itself; no handle escapes a failed acquisition.
	async fn acquire_and_search(&self, query: &str) -> Result<SearchOutcome<Self::Handle>>;

	/// Drives the resource to the page for `target`.
	///
	/// Returns `false` when the site has nothing for the target.
	async fn advance(&self, handle: &mut Self::Handle, target: &str) -> Result<bool>;

	/// Reads the valuation from the page reached by [`advance`](Self::advance).
	async fn read_result(&self, handle: &mut Self::Handle, target: &str) -> Result<ReadOutcome>;

	/// Closes the resource.
	///
	/// Must tolerate a handle in a degraded state. Errors are logged by the
	/// caller and never propagated.
	async fn release(&self, handle: Self::Handle) -> Result<()>;
}

//! Testing infrastructure for the valuation broker.
//!
//! [`MockBackend`] is a scripted [`PropertyBackend`] that records every call,
//! so tests can assert on exactly which handles were acquired and released
//! without driving a real site.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use pv::testing::MockBackend;
//!
//! #[tokio::test]
//! async fn search_then_valuate() {
//!     let backend = Arc::new(MockBackend::new().with_advance(false));
//!     let service = pv::ValuationService::new(Arc::clone(&backend), 3).unwrap();
//!     service.begin("s1", "42 X St").await.unwrap();
//!     service.complete("s1", None).await.unwrap();
//!     assert_eq!(backend.release_calls(), 1);
//! }
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::backend::{CandidateRecord, PropertyBackend, ReadOutcome, SearchOutcome};
use crate::error::{Error, Result};

/// Handle given out by [`MockBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockHandle {
	pub id: u64,
	pub query: String,
}

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
	Acquire { query: String },
	Advance { handle: u64, target: String },
	Read { handle: u64, target: String },
	Release { handle: u64 },
}

#[derive(Debug, Default)]
struct Script {
	candidates: HashMap<String, Vec<String>>,
	advance: Option<bool>,
	read: Option<ReadOutcome>,
	fail_acquire: Option<String>,
	fail_advance: Option<String>,
	panic_advance: Option<String>,
	fail_read: Option<String>,
	fail_release: Option<String>,
	delay: Option<Duration>,
}

/// Scripted backend that counts calls.
///
/// Defaults: every query yields a single candidate equal to the query,
/// `advance` succeeds, and `read_result` returns a fixed estimate.
#[derive(Debug, Default)]
pub struct MockBackend {
	script: Mutex<Script>,
	calls: Mutex<Vec<MockCall>>,
	next_handle: AtomicU64,
}

impl MockBackend {
	pub fn new() -> Self {
		Self::default()
	}

	/// Sets the candidate list returned for `query`.
	pub fn with_candidates(self, query: &str, candidates: &[&str]) -> Self {
		self.script
			.lock()
			.candidates
			.insert(query.to_string(), candidates.iter().map(|c| c.to_string()).collect());
		self
	}

	/// Sets what `advance` reports.
	pub fn with_advance(self, reached: bool) -> Self {
		self.script.lock().advance = Some(reached);
		self
	}

	/// Sets what `read_result` returns.
	pub fn with_read(self, outcome: ReadOutcome) -> Self {
		self.script.lock().read = Some(outcome);
		self
	}

	pub fn failing_acquire(self, message: &str) -> Self {
		self.script.lock().fail_acquire = Some(message.to_string());
		self
	}

	pub fn failing_advance(self, message: &str) -> Self {
		self.script.lock().fail_advance = Some(message.to_string());
		self
	}

	/// Makes `advance` panic with `message`, as a crashing driver would.
	pub fn panicking_advance(self, message: &str) -> Self {
		self.script.lock().panic_advance = Some(message.to_string());
		self
	}

	pub fn failing_read(self, message: &str) -> Self {
		self.script.lock().fail_read = Some(message.to_string());
		self
	}

	pub fn failing_release(self, message: &str) -> Self {
		self.script.lock().fail_release = Some(message.to_string());
		self
	}

	/// Makes every operation sleep before answering.
	pub fn with_delay(self, delay: Duration) -> Self {
		self.script.lock().delay = Some(delay);
		self
	}

	/// Every call made so far, in order.
	pub fn calls(&self) -> Vec<MockCall> {
		self.calls.lock().clone()
	}

	pub fn total_calls(&self) -> usize {
		self.calls.lock().len()
	}

	pub fn acquire_calls(&self) -> usize {
		self.count(|call| matches!(call, MockCall::Acquire { .. }))
	}

	pub fn advance_calls(&self) -> usize {
		self.count(|call| matches!(call, MockCall::Advance { .. }))
	}

	pub fn read_calls(&self) -> usize {
		self.count(|call| matches!(call, MockCall::Read { .. }))
	}

	pub fn release_calls(&self) -> usize {
		self.count(|call| matches!(call, MockCall::Release { .. }))
	}

	/// Ids of released handles, in release order.
	pub fn released(&self) -> Vec<u64> {
		self.calls
			.lock()
			.iter()
			.filter_map(|call| match call {
				MockCall::Release { handle } => Some(*handle),
				_ => None,
			})
			.collect()
	}

	/// Ids of handles acquired but not yet released.
	pub fn open_handles(&self) -> Vec<u64> {
		let released = self.released();
		(1..=self.next_handle.load(Ordering::SeqCst))
			.filter(|id| !released.contains(id))
			.collect()
	}

	fn count(&self, pred: impl Fn(&MockCall) -> bool) -> usize {
		self.calls.lock().iter().filter(|call| pred(call)).count()
	}

	fn record(&self, call: MockCall) {
		self.calls.lock().push(call);
	}

	async fn pause(&self) {
		let delay = self.script.lock().delay;
		if let Some(delay) = delay {
			tokio::time::sleep(delay).await;
		}
	}
}

#[async_trait]
impl PropertyBackend for MockBackend {
	type Handle = MockHandle;

	async fn acquire_and_search(&self, query: &str) -> Result<SearchOutcome<MockHandle>> {
		self.record(MockCall::Acquire { query: query.to_string() });
		self.pause().await;

		let (failure, scripted) = {
			let script = self.script.lock();
			(script.fail_acquire.clone(), script.candidates.get(query).cloned())
		};
		if let Some(message) = failure {
			return Err(Error::acquisition(message));
		}

		let displays = scripted.unwrap_or_else(|| vec![query.to_string()]);
		let candidates: Vec<CandidateRecord> = displays
			.iter()
			.zip(0u64..)
			.map(|(display, idx)| CandidateRecord::new(idx, display.clone()))
			.collect();
		let selected = displays.first().cloned().unwrap_or_default();
		let id = self.next_handle.fetch_add(1, Ordering::SeqCst) + 1;

		Ok(SearchOutcome {
			handle: MockHandle {
				id,
				query: query.to_string(),
			},
			candidates,
			selected,
		})
	}

	async fn advance(&self, handle: &mut MockHandle, target: &str) -> Result<bool> {
		self.record(MockCall::Advance {
			handle: handle.id,
			target: target.to_string(),
		});
		self.pause().await;

		let crash = self.script.lock().panic_advance.clone();
		if let Some(message) = crash {
			panic!("{message}");
		}

		let script = self.script.lock();
		if let Some(message) = &script.fail_advance {
			return Err(Error::navigation(target, message.clone()));
		}
		Ok(script.advance.unwrap_or(true))
	}

	async fn read_result(&self, handle: &mut MockHandle, target: &str) -> Result<ReadOutcome> {
		self.record(MockCall::Read {
			handle: handle.id,
			target: target.to_string(),
		});
		self.pause().await;

		let script = self.script.lock();
		if let Some(message) = &script.fail_read {
			return Err(Error::read(target, message.clone()));
		}
		Ok(script.read.clone().unwrap_or_else(|| ReadOutcome::Estimate {
			low: "$1,000,000".to_string(),
			high: "$1,200,000".to_string(),
			confidence: "High".to_string(),
		}))
	}

	async fn release(&self, handle: MockHandle) -> Result<()> {
		self.record(MockCall::Release { handle: handle.id });

		let failure = self.script.lock().fail_release.clone();
		match failure {
			Some(message) => Err(Error::acquisition(message)),
			None => Ok(()),
		}
	}
}

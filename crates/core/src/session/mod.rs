//! Session-affine ownership of backend resources across the two-call workflow.
//!
//! A [`SessionStore`] maps a client-chosen session id to the one open
//! resource handle that id may hold, plus what the search phase learned
//! about it. The store is the only owner of stored handles: a phase takes a
//! session out of the map before awaiting anything on its handle, so no two
//! operations can ever drive the same resource.
//!
//! Lifecycle of an entry:
//!
//! ```text
//! absent ──begin──► open ──complete (estimate | no match | error)──► absent
//!                    │
//!                    └──begin (same id)──► released, replaced by a new open entry
//! ```


use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use parking_lot::Mutex;
use pv_protocol::{Candidate, Valuation};
use tracing::{debug, warn};

use crate::backend::{CandidateRecord, PropertyBackend, ReadOutcome};
use crate::error::{Error, Result};

struct Session<H> {
	handle: H,
	selected: String,
	candidates: Vec<CandidateRecord>,
	opened_at: Instant,
}

/// Injectable session map that owns every open backend handle.
pub struct SessionStore<B: PropertyBackend> {
	backend: Arc<B>,
	sessions: Mutex<HashMap<String, Session<B::Handle>>>,
}

impl<B: PropertyBackend> SessionStore<B> {
	pub fn new(backend: Arc<B>) -> Self {
		Self {
			backend,
			sessions: Mutex::new(HashMap::new()),
		}
	}

	/// Number of sessions currently holding an open handle.
	pub fn len(&self) -> usize {
		self.sessions.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.sessions.lock().is_empty()
	}

	pub fn contains(&self, session_id: &str) -> bool {
		self.sessions.lock().contains_key(session_id)
	}

	/// Search phase: opens a resource for `session_id` and returns the candidates.
	///
	/// Any resource still held under `session_id` is released before the new
	/// one is acquired. On acquisition failure nothing is stored.
	pub async fn begin(&self, session_id: &str, query: &str) -> Result<Vec<Candidate>> {
		let previous = self.sessions.lock().remove(session_id);
		if let Some(previous) = previous {
			debug!(target = "pv.session", session_id, "releasing resource of replaced session");
			self.release(session_id, previous.handle).await;
		}

		let outcome = self.backend.acquire_and_search(query).await?;
		let candidates = expose_candidates(&outcome.candidates);
		debug!(
			target = "pv.session",
			session_id,
			candidates = candidates.len(),
			selected = %outcome.selected,
			"session opened"
		);

		let session = Session {
			handle: outcome.handle,
			selected: outcome.selected,
			candidates: outcome.candidates,
			opened_at: Instant::now(),
		};
		let displaced = self.sessions.lock().insert(session_id.to_string(), session);
		if let Some(displaced) = displaced {
			warn!(
				target = "pv.session",
				session_id, "concurrent search replaced an open session; releasing it"
			);
			self.release(session_id, displaced.handle).await;
		}

		Ok(candidates)
	}

	/// Valuation phase: drives the stored resource to the target and reads the estimate.
	///
	/// `target_override` replaces the address chosen during search when it is
	/// non-empty; an override naming a candidate id (`"2"`) selects that
	/// candidate. Once the session is taken, its resource is released and the
	/// entry deleted on every exit path.
	pub async fn complete(&self, session_id: &str, target_override: Option<&str>) -> Result<Valuation> {
		let session = {
			let mut sessions = self.sessions.lock();
			match sessions.entry(session_id.to_string()) {
				Entry::Vacant(_) => {
					return Err(Error::SessionNotFound {
						session_id: session_id.to_string(),
					});
				}
				Entry::Occupied(entry) if entry.get().selected.is_empty() => {
					return Err(Error::InvalidSessionState {
						session_id: session_id.to_string(),
						reason: "no address was selected during search",
					});
				}
				Entry::Occupied(entry) => entry.remove(),
			}
		};

		let Session {
			mut handle,
			selected,
			candidates,
			..
		} = session;
		let target = resolve_target(target_override, &selected, &candidates);

		// A panicking backend still gets its handle back before the panic moves on.
		let outcome = AssertUnwindSafe(self.valuate(&mut handle, &target)).catch_unwind().await;
		self.release(session_id, handle).await;
		let outcome = match outcome {
			Ok(outcome) => outcome,
			Err(payload) => {
				warn!(target = "pv.session", session_id, "backend panicked during valuation");
				panic::resume_unwind(payload);
			}
		};

		match &outcome {
			Ok(valuation) => debug!(
				target = "pv.session",
				session_id,
				address = %valuation.address,
				available = valuation.available,
				"session completed"
			),
			Err(err) => warn!(target = "pv.session", session_id, error = %err, "session failed"),
		}
		outcome
	}

	async fn valuate(&self, handle: &mut B::Handle, target: &str) -> Result<Valuation> {
		if !self.backend.advance(handle, target).await? {
			debug!(target = "pv.session", address = target, "no property page for target");
			return Ok(Valuation::unavailable(target));
		}

		Ok(match self.backend.read_result(handle, target).await? {
			ReadOutcome::Estimate { low, high, confidence } => Valuation::estimate(target, low, high, confidence),
			ReadOutcome::Missing(reason) => Valuation::unavailable(target).with_error(reason),
		})
	}

	/// Releases every session opened more than `max_age` ago.
	///
	/// Returns the number of sessions evicted.
	pub async fn evict_idle(&self, max_age: Duration) -> usize {
		let expired: Vec<(String, Session<B::Handle>)> = {
			let mut sessions = self.sessions.lock();
			let ids: Vec<String> = sessions
				.iter()
				.filter(|(_, session)| session.opened_at.elapsed() >= max_age)
				.map(|(id, _)| id.clone())
				.collect();
			ids.into_iter()
				.filter_map(|id| sessions.remove(&id).map(|session| (id, session)))
				.collect()
		};

		let count = expired.len();
		for (session_id, session) in expired {
			debug!(target = "pv.session", session_id = %session_id, "evicting idle session");
			self.release(&session_id, session.handle).await;
		}
		count
	}

	/// Releases every open session. Returns how many were closed.
	pub async fn shutdown(&self) -> usize {
		let drained: Vec<(String, Session<B::Handle>)> = self.sessions.lock().drain().collect();
		let count = drained.len();
		for (session_id, session) in drained {
			self.release(&session_id, session.handle).await;
		}
		count
	}

	async fn release(&self, session_id: &str, handle: B::Handle) {
		match self.backend.release(handle).await {
			Ok(()) => debug!(target = "pv.session", session_id, "resource released"),
			Err(err) => warn!(target = "pv.session", session_id, error = %err, "resource release failed"),
		}
	}
}

/// Re-numbers backend candidates with 1-based positional ids.
fn expose_candidates(records: &[CandidateRecord]) -> Vec<Candidate> {
	records
		.iter()
		.zip(1u32..)
		.map(|(record, id)| Candidate::new(id, record.display.clone()))
		.collect()
}

fn resolve_target(target_override: Option<&str>, selected: &str, candidates: &[CandidateRecord]) -> String {
	let Some(requested) = target_override.map(str::trim).filter(|s| !s.is_empty()) else {
		return selected.to_string();
	};

	requested
		.parse::<usize>()
		.ok()
		.and_then(|id| id.checked_sub(1))
		.and_then(|index| candidates.get(index))
		.map(|candidate| candidate.display.clone())
		.unwrap_or_else(|| requested.to_string())
}

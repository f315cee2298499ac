//! Public entry point: every operation is admitted by the broker first.

use std::sync::Arc;
use std::time::Duration;

use pv_protocol::{BrokerStats, Candidate, ServiceStats, Valuation};

use crate::backend::PropertyBackend;
use crate::broker::AdmissionBroker;
use crate::error::Result;
use crate::session::SessionStore;

/// Two-phase valuation workflow behind a bounded admission broker.
///
/// Cloning is cheap; clones share the broker and the session store.
pub struct ValuationService<B: PropertyBackend> {
	broker: AdmissionBroker,
	store: Arc<SessionStore<B>>,
}

impl<B: PropertyBackend> Clone for ValuationService<B> {
	fn clone(&self) -> Self {
		Self {
			broker: self.broker.clone(),
			store: Arc::clone(&self.store),
		}
	}
}

impl<B: PropertyBackend> ValuationService<B> {
	/// Builds a service admitting at most `ceiling` operations at once.
	pub fn new(backend: Arc<B>, ceiling: usize) -> Result<Self> {
		Ok(Self::from_parts(
			AdmissionBroker::try_new(ceiling)?,
			Arc::new(SessionStore::new(backend)),
		))
	}

	pub fn from_parts(broker: AdmissionBroker, store: Arc<SessionStore<B>>) -> Self {
		Self { broker, store }
	}

	/// Search phase for `session_id`. See [`SessionStore::begin`].
	pub async fn begin(&self, session_id: impl Into<String>, query: impl Into<String>) -> Result<Vec<Candidate>> {
		let store = Arc::clone(&self.store);
		let session_id = session_id.into();
		let query = query.into();
		self.broker
			.submit(move || async move { store.begin(&session_id, &query).await })
			.await
	}

	/// Valuation phase for `session_id`. See [`SessionStore::complete`].
	pub async fn complete(&self, session_id: impl Into<String>, target_override: Option<String>) -> Result<Valuation> {
		let store = Arc::clone(&self.store);
		let session_id = session_id.into();
		self.broker
			.submit(move || async move { store.complete(&session_id, target_override.as_deref()).await })
			.await
	}

	/// Releases sessions older than `max_age`, holding an admission slot while doing so.
	pub async fn evict_idle(&self, max_age: Duration) -> Result<usize> {
		let store = Arc::clone(&self.store);
		self.broker
			.submit(move || async move { Ok(store.evict_idle(max_age).await) })
			.await
	}

	/// Releases every open session.
	pub async fn shutdown(&self) -> Result<usize> {
		let store = Arc::clone(&self.store);
		self.broker
			.submit(move || async move { Ok(store.shutdown().await) })
			.await
	}

	pub fn stats(&self) -> BrokerStats {
		self.broker.stats()
	}

	/// Number of sessions currently holding an open handle.
	pub fn sessions(&self) -> usize {
		self.store.len()
	}

	pub fn service_stats(&self) -> ServiceStats {
		ServiceStats {
			broker: self.broker.stats(),
			open_sessions: self.sessions(),
		}
	}

	pub fn store(&self) -> &Arc<SessionStore<B>> {
		&self.store
	}
}

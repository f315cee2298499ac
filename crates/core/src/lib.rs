//! Bounded admission and session affinity for property valuation lookups.
//!
//! Looking up a valuation takes two independent calls that share one
//! expensive automation resource:
//!
//! 1. `begin(session, address)` opens a resource, searches, and returns candidates
//! 2. `complete(session, override)` drives that same resource to the property
//!    page, reads the estimate, and closes it
//!
//! # Architecture
//!
//! ```text
//! caller ──► AdmissionBroker (FIFO, ≤ N in flight)
//!                 │
//!                 ▼
//!            SessionStore (session id → open handle)
//!                 │
//!                 ▼
//!            PropertyBackend (acquire / advance / read / release)
//! ```
//!
//! [`ValuationService`] wires the three together. Backends are replaceable;
//! [`testing::MockBackend`] records calls for tests.

pub mod backend;
pub mod broker;
pub mod error;
pub mod service;
pub mod session;
pub mod testing;

pub use backend::{CandidateRecord, PropertyBackend, ReadOutcome, SearchOutcome};
pub use broker::{AdmissionBroker, DEFAULT_CEILING, TaskHandle};
pub use error::{Error, Result};
pub use pv_protocol::{BrokerStats, Candidate, ServiceStats, Valuation};
pub use service::ValuationService;
pub use session::SessionStore;

//! Error types for the valuation broker.

use thiserror::Error;

/// Result type alias for broker and session operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by [`ValuationService`](crate::ValuationService) operations.
///
/// The first three variants originate in a [`PropertyBackend`](crate::PropertyBackend)
/// and carry only an opaque message. The session variants are raised by the
/// core before any resource is touched.
#[derive(Debug, Error)]
pub enum Error {
	/// Opening a resource or running the initial search failed.
	#[error("Acquisition failed: {0}")]
	Acquisition(String),

	/// Driving the resource to the target failed.
	#[error("Navigation to '{target}' failed: {message}")]
	Navigation { target: String, message: String },

	/// Reading the valuation from the resource failed.
	#[error("Reading valuation for '{target}' failed: {message}")]
	Read { target: String, message: String },

	/// No session is stored under the identifier.
	#[error("Session not found: {session_id}")]
	SessionNotFound { session_id: String },

	/// A session exists but cannot serve the valuation phase.
	#[error("Session '{session_id}' is not ready: {reason}")]
	InvalidSessionState { session_id: String, reason: &'static str },

	/// The broker scheduler stopped before the task reported an outcome.
	#[error("Admission broker closed before the task completed")]
	BrokerClosed,

	/// The submitted operation panicked while running.
	#[error("Task panicked: {0}")]
	TaskPanicked(String),

	/// Construction parameters were rejected.
	#[error("Invalid configuration: {0}")]
	InvalidConfig(String),
}

impl Error {
	pub fn acquisition(message: impl Into<String>) -> Self {
		Self::Acquisition(message.into())
	}

	pub fn navigation(target: impl Into<String>, message: impl Into<String>) -> Self {
		Self::Navigation {
			target: target.into(),
			message: message.into(),
		}
	}

	pub fn read(target: impl Into<String>, message: impl Into<String>) -> Self {
		Self::Read {
			target: target.into(),
			message: message.into(),
		}
	}

	/// Whether the error was caused by the client rather than the backend.
	pub fn is_client_error(&self) -> bool {
		matches!(self, Self::SessionNotFound { .. } | Self::InvalidSessionState { .. })
	}

	/// Whether the error came from an external resource operation.
	pub fn is_backend_error(&self) -> bool {
		matches!(self, Self::Acquisition(_) | Self::Navigation { .. } | Self::Read { .. })
	}
}

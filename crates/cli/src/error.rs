use std::path::PathBuf;

use thiserror::Error;

use crate::output::{CommandError, ErrorCode};

pub type Result<T> = std::result::Result<T, PvError>;

#[derive(Debug, Error)]
pub enum PvError {
	#[error(transparent)]
	Service(#[from] pv::Error),

	#[error("invalid input: {0}")]
	InvalidInput(String),

	#[error("config error in {path}: {message}")]
	Config { path: PathBuf, message: String },

	#[error("invalid configuration: {0}")]
	InvalidConfig(String),

	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error(transparent)]
	Json(#[from] serde_json::Error),

	#[error(transparent)]
	Anyhow(#[from] anyhow::Error),
}

impl PvError {
	/// Convert this error to a CommandError for structured output
	pub fn to_command_error(&self) -> CommandError {
		let (code, message, details) = match self {
			PvError::Service(err) => return service_command_error(err),
			PvError::InvalidInput(msg) => (ErrorCode::InvalidInput, msg.clone(), None),
			PvError::Config { path, message } => (
				ErrorCode::ConfigError,
				format!("Failed to load {}: {message}", path.display()),
				Some(serde_json::json!({ "path": path })),
			),
			PvError::InvalidConfig(msg) => (ErrorCode::ConfigError, msg.clone(), None),
			PvError::Io(err) => (ErrorCode::IoError, err.to_string(), None),
			PvError::Json(err) => (ErrorCode::InternalError, format!("JSON error: {err}"), None),
			PvError::Anyhow(err) => (ErrorCode::InternalError, err.to_string(), None),
		};

		CommandError { code, message, details }
	}
}

/// Maps a core error onto an envelope error, keeping the identifiers callers need.
pub fn service_command_error(err: &pv::Error) -> CommandError {
	let (code, details) = match err {
		pv::Error::SessionNotFound { session_id } => (
			ErrorCode::SessionNotFound,
			Some(serde_json::json!({ "sessionId": session_id })),
		),
		pv::Error::InvalidSessionState { session_id, reason } => (
			ErrorCode::InvalidSessionState,
			Some(serde_json::json!({ "sessionId": session_id, "reason": reason })),
		),
		pv::Error::Acquisition(_) => (ErrorCode::AcquisitionFailed, None),
		pv::Error::Navigation { target, .. } => (
			ErrorCode::NavigationFailed,
			Some(serde_json::json!({ "address": target })),
		),
		pv::Error::Read { target, .. } => (ErrorCode::ReadFailed, Some(serde_json::json!({ "address": target }))),
		pv::Error::InvalidConfig(_) => (ErrorCode::ConfigError, None),
		pv::Error::BrokerClosed | pv::Error::TaskPanicked(_) => (ErrorCode::InternalError, None),
	};

	CommandError {
		code,
		message: err.to_string(),
		details,
	}
}

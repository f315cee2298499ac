use std::sync::Arc;
use std::time::Instant;

use pv::{PropertyBackend, ValuationService};
use tracing::{info, warn};

use crate::cli::LookupArgs;
use crate::config::ServiceConfig;
use crate::error::{PvError, Result};
use crate::output::{self, LookupData, OutputFormat, ResultBuilder};
use crate::site::SiteBackend;

const LOOKUP_SESSION: &str = "lookup";

pub async fn execute(args: LookupArgs, format: OutputFormat) -> Result<()> {
	let started = Instant::now();
	let mut config = ServiceConfig::resolve(args.site.config.as_deref())?;
	config.apply(&args.overrides());
	config.validate()?;

	let backend = Arc::new(SiteBackend::new(config.site.clone())?);
	let service = ValuationService::new(backend, config.max_concurrent)?;

	let data = lookup(&service, &args.address, args.pick).await?;
	let result = ResultBuilder::started_at("lookup", started)
		.session_id(LOOKUP_SESSION)
		.data(data)
		.build();
	output::print_result(&result, format);
	Ok(())
}

/// Runs both phases for `address` under one session, valuing candidate
/// `pick` (1-based) or the site's own selection.
///
/// No valuation is attempted when the search finds nothing. The session is
/// always released before returning.
pub async fn lookup<B: PropertyBackend>(service: &ValuationService<B>, address: &str, pick: Option<u32>) -> Result<LookupData> {
	let address = address.trim();
	if address.is_empty() {
		return Err(PvError::InvalidInput("address must not be empty".to_string()));
	}

	let outcome = run_phases(service, address, pick).await;

	match service.shutdown().await {
		Ok(0) => {}
		Ok(released) => info!(target = "pv.lookup", released, "released leftover sessions"),
		Err(err) => warn!(target = "pv.lookup", error = %err, "failed to release sessions"),
	}
	outcome
}

async fn run_phases<B: PropertyBackend>(service: &ValuationService<B>, address: &str, pick: Option<u32>) -> Result<LookupData> {
	let candidates = service.begin(LOOKUP_SESSION, address).await?;
	info!(target = "pv.lookup", address, candidates = candidates.len(), "search completed");

	if candidates.is_empty() {
		return Ok(LookupData {
			candidates,
			valuation: None,
		});
	}

	let target = match pick {
		None => None,
		Some(id) if candidates.iter().any(|c| c.id == id) => Some(id.to_string()),
		Some(id) => {
			return Err(PvError::InvalidInput(format!(
				"--pick {id} is out of range (1..={})",
				candidates.len()
			)));
		}
	};

	let valuation = service.complete(LOOKUP_SESSION, target).await?;
	Ok(LookupData {
		candidates,
		valuation: Some(valuation),
	})
}

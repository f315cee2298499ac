//! HTTP-driven backend for the valuation website.
//!
//! Each session gets its own cookie-keeping [`reqwest::Client`], which plays
//! the role of a browser context: the search phase warms it up on the home
//! page and queries the address autocomplete API, and the valuation phase
//! follows the first property link from the search results and scrapes the
//! estimate from the property page.

use std::sync::LazyLock;

use async_trait::async_trait;
use pv::{CandidateRecord, Error, PropertyBackend, ReadOutcome, SearchOutcome};
use regex_lite::Regex;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

use crate::config::SiteConfig;
use crate::error::{PvError, Result};

static PROPERTY_LINK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"href="(/property/[^"?#]+)"#).unwrap());

/// Children of `.mdText` blocks hold the low and high figures, in that order.
static ESTIMATE_FIGURE_RE: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r#"(?s)class="[^"]*\bmdText\b[^"]*"[^>]*>\s*<div[^>]*>\s*([^<]*?)\s*</div>"#).unwrap()
});

static CONFIDENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r#"(?s)class="[^"]*ValuationEstimates__confidenceContainer[^"]*"[^>]*>(.*?)</div>"#).unwrap()
});

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());

/// Open resource for one session.
#[derive(Debug)]
pub struct SiteSession {
	client: Client,
	property_url: Option<Url>,
	page: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LocationsResponse {
	#[serde(default)]
	content: Vec<Location>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Location {
	formatted_address: String,
}

/// [`PropertyBackend`] that scrapes the configured site over HTTP.
#[derive(Debug, Clone)]
pub struct SiteBackend {
	config: SiteConfig,
	base: Url,
}

impl SiteBackend {
	pub fn new(config: SiteConfig) -> Result<Self> {
		let base = Url::parse(&config.base_url)
			.map_err(|err| PvError::InvalidConfig(format!("site.baseUrl '{}': {err}", config.base_url)))?;
		Ok(Self { config, base })
	}

	fn endpoint(&self, path: &str) -> std::result::Result<Url, String> {
		self.base.join(path).map_err(|err| format!("invalid path '{path}': {err}"))
	}

	/// Search results page for `target`: `<searchPath>?<searchParam>=<target>`.
	///
	/// The site's own form submits from the home page and lands on a
	/// `/real-estate/<slug>/` page; this query form is assumed to reach the
	/// same results. Override `site.searchPath` / `site.searchParam` if it
	/// stops doing so.
	pub fn search_url(&self, target: &str) -> std::result::Result<Url, String> {
		let mut url = self.endpoint(&self.config.search_path)?;
		url.query_pairs_mut().append_pair(&self.config.search_param, target);
		Ok(url)
	}

	fn open_client(&self) -> pv::Result<Client> {
		Client::builder()
			.cookie_store(true)
			.user_agent(self.config.user_agent.clone())
			.timeout(self.config.timeout())
			.build()
			.map_err(|err| Error::acquisition(format!("failed to build HTTP client: {err}")))
	}

	async fn fetch_page(client: &Client, url: Url) -> std::result::Result<Option<String>, reqwest::Error> {
		let response = client.get(url).send().await?;
		if response.status() == StatusCode::NOT_FOUND {
			return Ok(None);
		}
		response.error_for_status()?.text().await.map(Some)
	}
}

#[async_trait]
impl PropertyBackend for SiteBackend {
	type Handle = SiteSession;

	async fn acquire_and_search(&self, query: &str) -> pv::Result<SearchOutcome<SiteSession>> {
		let client = self.open_client()?;

		client
			.get(self.base.clone())
			.send()
			.await
			.and_then(|response| response.error_for_status())
			.map_err(|err| Error::acquisition(format!("failed to load {}: {err}", self.base)))?;

		let mut url = self.endpoint(&self.config.autocomplete_path).map_err(Error::acquisition)?;
		url.query_pairs_mut().append_pair("query", query);
		let locations: LocationsResponse = client
			.get(url)
			.send()
			.await
			.and_then(|response| response.error_for_status())
			.map_err(|err| Error::acquisition(format!("failed to fetch autocomplete: {err}")))?
			.json()
			.await
			.map_err(|err| Error::acquisition(format!("unexpected autocomplete payload: {err}")))?;

		let candidates: Vec<CandidateRecord> = locations
			.content
			.into_iter()
			.zip(1u64..)
			.map(|(location, id)| CandidateRecord::new(id, location.formatted_address))
			.collect();
		let selected = candidates.first().map(|c| c.display.clone()).unwrap_or_default();
		info!(target = "pv.site", query, candidates = candidates.len(), "address search completed");

		Ok(SearchOutcome {
			handle: SiteSession {
				client,
				property_url: None,
				page: None,
			},
			candidates,
			selected,
		})
	}

	async fn advance(&self, handle: &mut SiteSession, target: &str) -> pv::Result<bool> {
		let url = self.search_url(target).map_err(|err| Error::navigation(target, err))?;

		let Some(results) = Self::fetch_page(&handle.client, url)
			.await
			.map_err(|err| Error::navigation(target, err.to_string()))?
		else {
			debug!(target = "pv.site", address = target, "search page not found");
			return Ok(false);
		};

		let Some(href) = first_property_link(&results) else {
			debug!(target = "pv.site", address = target, "no property card in search results");
			return Ok(false);
		};
		let property_url = self.endpoint(&href).map_err(|err| Error::navigation(target, err))?;

		let Some(page) = Self::fetch_page(&handle.client, property_url.clone())
			.await
			.map_err(|err| Error::navigation(target, err.to_string()))?
		else {
			return Ok(false);
		};

		debug!(target = "pv.site", address = target, url = %property_url, "reached property page");
		handle.property_url = Some(property_url);
		handle.page = Some(page);
		Ok(true)
	}

	async fn read_result(&self, handle: &mut SiteSession, target: &str) -> pv::Result<ReadOutcome> {
		let Some(page) = handle.page.as_deref() else {
			return Err(Error::read(target, "no property page loaded"));
		};

		let mut figures = estimate_figures(page).into_iter();
		match (figures.next(), figures.next()) {
			(Some(low), Some(high)) => Ok(ReadOutcome::Estimate {
				low,
				high,
				confidence: confidence_text(page).unwrap_or_else(|| "N/A".to_string()),
			}),
			_ => Ok(ReadOutcome::Missing(format!(
				"no valuation estimate on {}",
				handle.property_url.as_ref().map(Url::as_str).unwrap_or("property page")
			))),
		}
	}

	async fn release(&self, handle: SiteSession) -> pv::Result<()> {
		debug!(
			target = "pv.site",
			url = handle.property_url.as_ref().map(Url::as_str).unwrap_or(""),
			"closing site session"
		);
		drop(handle);
		Ok(())
	}
}

/// First `/property/...` link in a search results page.
pub fn first_property_link(html: &str) -> Option<String> {
	PROPERTY_LINK_RE
		.captures(html)
		.and_then(|caps| caps.get(1))
		.map(|m| m.as_str().to_string())
}

/// Non-empty estimate figures in page order.
pub fn estimate_figures(html: &str) -> Vec<String> {
	ESTIMATE_FIGURE_RE
		.captures_iter(html)
		.filter_map(|caps| caps.get(1))
		.map(|m| m.as_str().trim().to_string())
		.filter(|text| !text.is_empty())
		.collect()
}

/// Visible text of the confidence container, whitespace-collapsed.
pub fn confidence_text(html: &str) -> Option<String> {
	let inner = CONFIDENCE_RE.captures(html)?.get(1)?.as_str();
	let text = TAG_RE.replace_all(inner, " ");
	let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
	(!collapsed.is_empty()).then_some(collapsed)
}

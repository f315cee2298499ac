
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::ConfigOverrides;
use crate::output::OutputFormat;
use crate::styles::cli_styles;

/// Root CLI for pv.
#[derive(Parser, Debug)]
#[command(name = "pv")]
#[command(about = "Property valuation lookups behind a bounded admission broker")]
#[command(version)]
#[command(styles = cli_styles())]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Output format: toon (default), json, ndjson, or text
	#[arg(short = 'f', long, global = true, value_enum, default_value = "toon")]
	pub format: OutputFormat,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Run the HTTP query API.
	Serve(ServeArgs),
	/// Search for an address and fetch its valuation in one go.
	Lookup(LookupArgs),
}

/// Options shared by every command that talks to the site.
#[derive(Args, Debug, Clone, Default)]
pub struct SiteArgs {
	/// Path to a JSON config file (default: $XDG_CONFIG_HOME/pv/config.json).
	#[arg(long, value_name = "FILE")]
	pub config: Option<PathBuf>,

	/// Override the valuation site base URL.
	#[arg(long, value_name = "URL")]
	pub base_url: Option<String>,

	/// Maximum number of site operations running at once.
	#[arg(long, value_name = "N")]
	pub max_concurrent: Option<usize>,
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
	#[command(flatten)]
	pub site: SiteArgs,

	/// Address to listen on (for example 127.0.0.1:4000).
	#[arg(long, value_name = "ADDR")]
	pub listen: Option<String>,

	/// Release sessions left open longer than this many seconds (0 disables).
	#[arg(long, value_name = "SECS")]
	pub idle_session_secs: Option<u64>,
}

#[derive(Args, Debug, Clone)]
pub struct LookupArgs {
	/// Address to search for.
	#[arg(value_name = "ADDRESS")]
	pub address: String,

	/// Value the Nth candidate instead of the first (1-based).
	#[arg(long, value_name = "N")]
	pub pick: Option<u32>,

	#[command(flatten)]
	pub site: SiteArgs,
}

impl ServeArgs {
	pub fn overrides(&self) -> ConfigOverrides {
		ConfigOverrides {
			listen: self.listen.clone(),
			max_concurrent: self.site.max_concurrent,
			idle_session_secs: self.idle_session_secs,
			base_url: self.site.base_url.clone(),
		}
	}
}

impl LookupArgs {
	pub fn overrides(&self) -> ConfigOverrides {
		ConfigOverrides {
			max_concurrent: self.site.max_concurrent,
			base_url: self.site.base_url.clone(),
			..Default::default()
		}
	}
}

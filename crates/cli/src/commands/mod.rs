mod lookup;
mod serve;

use crate::cli::{Cli, Commands};
use crate::error::Result;
use crate::output::OutputFormat;

pub use lookup::lookup;

pub async fn dispatch(cli: Cli, format: OutputFormat) -> Result<()> {
	match cli.command {
		Commands::Serve(args) => serve::execute(args).await,
		Commands::Lookup(args) => lookup::execute(args, format).await,
	}
}

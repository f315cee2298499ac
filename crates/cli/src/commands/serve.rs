use crate::cli::ServeArgs;
use crate::config::ServiceConfig;
use crate::error::Result;
use crate::server;

pub async fn execute(args: ServeArgs) -> Result<()> {
	let mut config = ServiceConfig::resolve(args.site.config.as_deref())?;
	config.apply(&args.overrides());
	server::serve(config).await
}

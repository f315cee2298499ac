use clap::Parser;
use pv_cli::cli::{Cli, Commands};
use pv_cli::error::PvError;
use pv_cli::output::{self, OutputFormat, ResultBuilder};
use pv_cli::{commands, logging};

#[tokio::main]
async fn main() {
	let cli = Cli::parse();
	logging::init_logging(cli.verbose);

	let format = cli.format;
	let command = match &cli.command {
		Commands::Serve(_) => "serve",
		Commands::Lookup(_) => "lookup",
	};

	if let Err(err) = commands::dispatch(cli, format).await {
		handle_error(err, command, format);
		std::process::exit(1);
	}
}

fn handle_error(err: PvError, command: &str, format: OutputFormat) {
	let cmd_error = err.to_command_error();

	// Always print to stderr for humans
	output::print_error_stderr(&cmd_error);

	// Also emit the envelope on stdout with ok=false for scripts
	if format != OutputFormat::Text {
		let result: output::CommandResult<()> = ResultBuilder::new(command).command_error(cmd_error).build();
		output::print_result(&result, format);
	}
}

//! Help output styling for the `pv` binary.

use clap::builder::Styles;
use clap::builder::styling::AnsiColor;

/// Cargo-like help colors: bold green headings, cyan flags and placeholders,
/// yellow for invalid values.
pub fn cli_styles() -> Styles {
	Styles::styled()
		.header(AnsiColor::Green.on_default().bold())
		.usage(AnsiColor::Green.on_default().bold())
		.literal(AnsiColor::Cyan.on_default())
		.placeholder(AnsiColor::Cyan.on_default())
		.valid(AnsiColor::Cyan.on_default())
		.invalid(AnsiColor::Yellow.on_default().bold())
		.error(AnsiColor::Red.on_default().bold())
}

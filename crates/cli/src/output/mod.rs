//! Structured output envelope and payload models.

#[cfg(test)]
mod tests;

mod format;
mod model;

use std::io::Write;

use serde::Serialize;

pub use format::OutputFormat;
pub use model::*;

/// Print a command result to stdout in the specified format.
pub fn print_result<T: Serialize>(result: &CommandResult<T>, format: OutputFormat) {
	let mut stdout = std::io::stdout().lock();
	let rendered = match format {
		OutputFormat::Json => serde_json::to_string_pretty(result).ok(),
		OutputFormat::Ndjson => serde_json::to_string(result).ok(),
		OutputFormat::Text => Some(render_text(result)),
	};
	if let Some(rendered) = rendered {
		let _ = writeln!(stdout, "{rendered}");
		let _ = stdout.flush();
	}
}

fn render_text<T: Serialize>(result: &CommandResult<T>) -> String {
	if let Some(error) = &result.error {
		return format!("Error [{}]: {}", error.code, error.message);
	}
	result
		.data
		.as_ref()
		.and_then(|data| serde_json::to_string_pretty(data).ok())
		.unwrap_or_default()
}

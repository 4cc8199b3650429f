use anyhow::{Context, Result};
use tracing::info;

use super::CommandContext;
use crate::output::EnsureData;

pub async fn execute(ctx: &CommandContext, path: &str) -> Result<()> {
	info!(target: "zkreg", %path, "ensure");

	let session = ctx.connect().await?;
	let result = zkreg::ensure_exists(&session, path).await;
	session.close().await;
	result.with_context(|| format!("ensuring {path}"))?;

	ctx.emit(EnsureData { path: path.to_string() });
	Ok(())
}

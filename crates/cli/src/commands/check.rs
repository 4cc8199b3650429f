use anyhow::Result;
use tracing::info;

use super::CommandContext;
use crate::output::CheckData;

pub async fn execute(ctx: &CommandContext, service: &str) -> Result<()> {
	let config = ctx.settings.registry_config()?;
	let path = zkreg::registration_path(&config.base_path, &config.service_address, service)?;
	info!(target: "zkreg", path = %path, "check");

	let session = ctx.connect().await?;
	let stat = session.exists(path.as_str()).await;
	session.close().await;
	let stat = stat?;

	ctx.emit(CheckData {
		path: path.to_string(),
		registered: stat.is_some_and(|stat| stat.is_ephemeral()),
		stat,
	});
	Ok(())
}

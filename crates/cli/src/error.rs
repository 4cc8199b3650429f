use thiserror::Error;
use zkreg::{ConfigError, ConnectError, PathError, RegisterError};
use zkreg_runtime::SessionState;

use crate::output::{CommandError, ErrorCode};

/// Failures that originate in the CLI itself.
#[derive(Debug, Error)]
pub enum CliError {
	#[error("session ended while services were registered (state: {0:?})")]
	SessionLost(SessionState),
}

/// Maps an error chain onto a structured error for the output envelope.
pub fn classify(err: &anyhow::Error) -> CommandError {
	let code = err.chain().find_map(code_of).unwrap_or(ErrorCode::InvalidInput);
	CommandError {
		code,
		message: format!("{err:#}"),
	}
}

fn code_of(cause: &(dyn std::error::Error + 'static)) -> Option<ErrorCode> {
	if let Some(err) = cause.downcast_ref::<CliError>() {
		return Some(match err {
			CliError::SessionLost(_) => ErrorCode::SessionLost,
		});
	}
	if cause.is::<ConfigError>() {
		return Some(ErrorCode::InvalidInput);
	}
	if cause.is::<ConnectError>() {
		return Some(ErrorCode::ConnectFailed);
	}
	if let Some(err) = cause.downcast_ref::<RegisterError>() {
		return Some(match err {
			err if err.session_error().is_some_and(zkreg_runtime::Error::is_session_error) => ErrorCode::SessionLost,
			RegisterError::InvalidSegment { .. } | RegisterError::Path(PathError::Empty | PathError::NotAbsolute(_) | PathError::EmptySegment(_)) => {
				ErrorCode::InvalidInput
			}
			_ => ErrorCode::RegisterFailed,
		});
	}
	if let Some(err) = cause.downcast_ref::<PathError>() {
		return Some(match err {
			PathError::Coordination { source, .. } if source.is_session_error() => ErrorCode::SessionLost,
			PathError::Coordination { .. } => ErrorCode::CoordinationError,
			_ => ErrorCode::InvalidInput,
		});
	}
	if let Some(err) = cause.downcast_ref::<zkreg_runtime::Error>() {
		return Some(match err {
			zkreg_runtime::Error::NoServerReachable { .. } | zkreg_runtime::Error::Timeout(_) => ErrorCode::ConnectFailed,
			err if err.is_session_error() => ErrorCode::SessionLost,
			_ => ErrorCode::CoordinationError,
		});
	}
	None
}

#[cfg(test)]
mod tests {
	use anyhow::Context;

	use super::*;

	#[test]
	fn codes_follow_the_innermost_known_error() {
		let unreachable = anyhow::Error::new(zkreg_runtime::Error::NoServerReachable {
			servers: "zk:2181".into(),
			last: "refused".into(),
		});
		assert_eq!(classify(&unreachable).code, ErrorCode::ConnectFailed);

		let bad_path: anyhow::Result<()> = Err(PathError::NotAbsolute("a".into())).context("ensuring a");
		let classified = classify(&bad_path.unwrap_err());
		assert_eq!(classified.code, ErrorCode::InvalidInput);
		assert!(classified.message.starts_with("ensuring a: "), "{}", classified.message);

		let lost = anyhow::Error::new(CliError::SessionLost(SessionState::Expired));
		assert_eq!(classify(&lost).code, ErrorCode::SessionLost);

		assert_eq!(classify(&anyhow::anyhow!("no address")).code, ErrorCode::InvalidInput);
	}

	#[test]
	fn session_failures_are_reported_as_lost() {
		let expired = anyhow::Error::new(RegisterError::Create {
			path: "/rpcx/Arith/127.0.0.1:8972".into(),
			source: zkreg_runtime::Error::SessionExpired,
			stale_delete: None,
		});
		assert_eq!(classify(&expired).code, ErrorCode::SessionLost);

		let walk: anyhow::Result<()> = Err(PathError::Coordination {
			path: "/rpcx".into(),
			source: zkreg_runtime::Error::NotConnected,
		})
		.context("ensuring /rpcx/Arith");
		assert_eq!(classify(&walk.unwrap_err()).code, ErrorCode::SessionLost);

		let refused = anyhow::Error::new(RegisterError::Create {
			path: "/rpcx/Arith/127.0.0.1:8972".into(),
			source: zkreg_runtime::Error::Server {
				op: zkreg_runtime::protocol::OpCode::Create,
				code: zkreg_runtime::protocol::ErrorCode::NoAuth,
			},
			stale_delete: None,
		});
		assert_eq!(classify(&refused).code, ErrorCode::RegisterFailed);

		let dropped = anyhow::Error::new(zkreg_runtime::Error::ConnectionLoss);
		assert_eq!(classify(&dropped).code, ErrorCode::SessionLost);
	}
}

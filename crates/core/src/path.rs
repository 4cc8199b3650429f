//! Namespace paths and idempotent creation of their ancestors.

use std::fmt;

use bytes::Bytes;
use tracing::{debug, trace};
use zkreg_protocol::{CreateMode, open_acl};
use zkreg_runtime::Session;

use crate::error::PathError;

/// Absolute, slash-delimited node path.
///
/// Non-empty, starts with `/`, and every segment is non-empty; `/` itself is
/// the root.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NamespacePath(String);

impl NamespacePath {
	pub fn parse(path: &str) -> Result<Self, PathError> {
		if path.is_empty() {
			return Err(PathError::Empty);
		}
		if !path.starts_with('/') {
			return Err(PathError::NotAbsolute(path.to_string()));
		}
		if path != "/" && path[1..].split('/').any(str::is_empty) {
			return Err(PathError::EmptySegment(path.to_string()));
		}
		Ok(Self(path.to_string()))
	}

	pub fn root() -> Self {
		Self("/".to_string())
	}

	pub fn is_root(&self) -> bool {
		self.0 == "/"
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}

	/// Appends one segment; the caller guarantees it contains no `/`.
	pub fn join(&self, segment: &str) -> Self {
		if self.is_root() {
			Self(format!("/{segment}"))
		} else {
			Self(format!("{}/{segment}", self.0))
		}
	}

	/// Every proper and improper prefix from the top down, excluding the root.
	///
	/// `/a/b/c` yields `/a`, `/a/b`, `/a/b/c`.
	pub fn prefixes(&self) -> impl Iterator<Item = &str> + '_ {
		let path = self.0.as_str();
		path.match_indices('/')
			.skip(1)
			.map(move |(index, _)| &path[..index])
			.chain((!self.is_root()).then_some(path))
	}
}

impl fmt::Display for NamespacePath {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl AsRef<str> for NamespacePath {
	fn as_ref(&self) -> &str {
		&self.0
	}
}

/// Makes sure `path` and all of its ancestors exist.
///
/// Missing nodes are created persistent, empty, and world-accessible. A
/// node-exists reply while creating a prefix means another client won the
/// race and counts as success; any other failure is returned. The root needs
/// no round trip.
pub async fn ensure_exists(session: &Session, path: &str) -> Result<(), PathError> {
	let path = NamespacePath::parse(path)?;
	if path.is_root() {
		return Ok(());
	}

	match session.exists(path.as_str()).await {
		Ok(Some(_)) => return Ok(()),
		Ok(None) => {}
		Err(err) => debug!(target: "zkreg.path", path = %path, error = %err, "existence check failed; creating"),
	}

	// The common case is a single missing leaf under an existing parent.
	match create_placeholder(session, path.as_str()).await {
		Ok(()) => return Ok(()),
		Err(err) => trace!(target: "zkreg.path", path = %path, error = %err, "direct create failed; walking ancestors"),
	}

	for prefix in path.prefixes() {
		let coordination = |source| PathError::Coordination {
			path: prefix.to_string(),
			source,
		};
		if session.exists(prefix).await.map_err(coordination)?.is_some() {
			continue;
		}
		match create_placeholder(session, prefix).await {
			Ok(()) => {}
			Err(err) if err.is_node_exists() => trace!(target: "zkreg.path", path = prefix, "created concurrently"),
			Err(err) => return Err(coordination(err)),
		}
	}
	Ok(())
}

async fn create_placeholder(session: &Session, path: &str) -> zkreg_runtime::Result<()> {
	let created = session.create(path, Bytes::new(), open_acl(), CreateMode::Persistent).await?;
	debug!(target: "zkreg.path", path = %created, "created namespace node");
	Ok(())
}

//! In-memory node tree with server-side create/delete semantics.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use zkreg_protocol::{ANY_VERSION, CreateMode, ErrorCode, Stat};

#[derive(Debug, Clone)]
struct Node {
	data: Bytes,
	stat: Stat,
}

/// Node tree keyed by absolute path; `/` always exists.
#[derive(Debug)]
pub(crate) struct Tree {
	nodes: BTreeMap<String, Node>,
	zxid: i64,
}

impl Default for Tree {
	fn default() -> Self {
		let mut nodes = BTreeMap::new();
		nodes.insert(
			"/".to_string(),
			Node {
				data: Bytes::new(),
				stat: Stat::default(),
			},
		);
		Self { nodes, zxid: 0 }
	}
}

fn now_ms() -> i64 {
	SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as i64).unwrap_or_default()
}

fn valid_path(path: &str) -> bool {
	if path == "/" {
		return true;
	}
	path.starts_with('/') && path[1..].split('/').all(|segment| !segment.is_empty())
}

fn parent_of(path: &str) -> &str {
	match path.rfind('/') {
		Some(0) | None => "/",
		Some(index) => &path[..index],
	}
}

fn child_prefix(path: &str) -> String {
	if path == "/" { "/".to_string() } else { format!("{path}/") }
}

impl Tree {
	pub(crate) fn zxid(&self) -> i64 {
		self.zxid
	}

	pub(crate) fn stat(&self, path: &str) -> Option<Stat> {
		self.nodes.get(path).map(|node| node.stat)
	}

	pub(crate) fn data(&self, path: &str) -> Option<Bytes> {
		self.nodes.get(path).map(|node| node.data.clone())
	}

	/// Direct children names of `path`, sorted.
	pub(crate) fn children(&self, path: &str) -> Vec<String> {
		let prefix = child_prefix(path);
		self.nodes
			.range(prefix.clone()..)
			.take_while(|(key, _)| key.starts_with(&prefix))
			.filter_map(|(key, _)| {
				let rest = &key[prefix.len()..];
				(!rest.is_empty() && !rest.contains('/')).then(|| rest.to_string())
			})
			.collect()
	}

	pub(crate) fn create(&mut self, path: &str, data: Bytes, mode: CreateMode, owner: i64) -> Result<String, ErrorCode> {
		if path == "/" || !valid_path(path) {
			return Err(ErrorCode::BadArguments);
		}

		let parent_path = parent_of(path).to_string();
		let parent = self.nodes.get(&parent_path).ok_or(ErrorCode::NoNode)?;
		if parent.stat.ephemeral_owner != 0 {
			return Err(ErrorCode::NoChildrenForEphemerals);
		}

		let created = match mode {
			CreateMode::PersistentSequential | CreateMode::EphemeralSequential => format!("{path}{:010}", parent.stat.cversion),
			CreateMode::Persistent | CreateMode::Ephemeral => path.to_string(),
		};
		if self.nodes.contains_key(&created) {
			return Err(ErrorCode::NodeExists);
		}

		self.zxid += 1;
		let zxid = self.zxid;
		let now = now_ms();
		let stat = Stat {
			czxid: zxid,
			mzxid: zxid,
			ctime: now,
			mtime: now,
			ephemeral_owner: if mode.is_ephemeral() { owner } else { 0 },
			data_length: data.len() as i32,
			pzxid: zxid,
			..Stat::default()
		};
		self.nodes.insert(created.clone(), Node { data, stat });

		if let Some(parent) = self.nodes.get_mut(&parent_path) {
			parent.stat.cversion += 1;
			parent.stat.num_children += 1;
			parent.stat.pzxid = zxid;
		}
		Ok(created)
	}

	pub(crate) fn delete(&mut self, path: &str, version: i32) -> Result<(), ErrorCode> {
		if path == "/" || !valid_path(path) {
			return Err(ErrorCode::BadArguments);
		}
		let node = self.nodes.get(path).ok_or(ErrorCode::NoNode)?;
		if version != ANY_VERSION && version != node.stat.version {
			return Err(ErrorCode::BadVersion);
		}
		if node.stat.num_children > 0 {
			return Err(ErrorCode::NotEmpty);
		}

		self.nodes.remove(path);
		self.zxid += 1;
		let zxid = self.zxid;
		if let Some(parent) = self.nodes.get_mut(parent_of(path)) {
			parent.stat.cversion += 1;
			parent.stat.num_children -= 1;
			parent.stat.pzxid = zxid;
		}
		Ok(())
	}

	/// Deletes every ephemeral node owned by `owner`, returning their paths.
	pub(crate) fn remove_ephemerals(&mut self, owner: i64) -> Vec<String> {
		let owned: Vec<String> = self
			.nodes
			.iter()
			.filter(|(_, node)| owner != 0 && node.stat.ephemeral_owner == owner)
			.map(|(path, _)| path.clone())
			.collect();
		for path in &owned {
			// Ephemeral nodes cannot have children, so this cannot fail with NotEmpty.
			let _ = self.delete(path, ANY_VERSION);
		}
		owned
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn root_always_exists() {
		let tree = Tree::default();
		assert!(tree.stat("/").is_some());
		assert!(tree.children("/").is_empty());
	}

	#[test]
	fn create_requires_parent() {
		let mut tree = Tree::default();
		assert_eq!(tree.create("/a/b", Bytes::new(), CreateMode::Persistent, 0), Err(ErrorCode::NoNode));
		assert_eq!(tree.create("/a", Bytes::new(), CreateMode::Persistent, 0), Ok("/a".to_string()));
		assert_eq!(tree.create("/a/b", Bytes::new(), CreateMode::Persistent, 0), Ok("/a/b".to_string()));
		assert_eq!(tree.create("/a", Bytes::new(), CreateMode::Persistent, 0), Err(ErrorCode::NodeExists));
		assert_eq!(tree.stat("/a").unwrap().num_children, 1);
	}

	#[test]
	fn malformed_paths_are_bad_arguments() {
		let mut tree = Tree::default();
		for path in ["", "a", "/a/", "//a", "/"] {
			assert_eq!(tree.create(path, Bytes::new(), CreateMode::Persistent, 0), Err(ErrorCode::BadArguments), "{path}");
		}
	}

	#[test]
	fn ephemeral_nodes_cannot_have_children() {
		let mut tree = Tree::default();
		tree.create("/e", Bytes::new(), CreateMode::Ephemeral, 9).unwrap();
		assert!(tree.stat("/e").unwrap().is_ephemeral());
		assert_eq!(tree.create("/e/x", Bytes::new(), CreateMode::Persistent, 0), Err(ErrorCode::NoChildrenForEphemerals));
	}

	#[test]
	fn delete_checks_children_and_version() {
		let mut tree = Tree::default();
		tree.create("/a", Bytes::new(), CreateMode::Persistent, 0).unwrap();
		tree.create("/a/b", Bytes::new(), CreateMode::Persistent, 0).unwrap();
		assert_eq!(tree.delete("/a", ANY_VERSION), Err(ErrorCode::NotEmpty));
		assert_eq!(tree.delete("/a/b", 4), Err(ErrorCode::BadVersion));
		assert_eq!(tree.delete("/a/b", 0), Ok(()));
		assert_eq!(tree.delete("/a/b", ANY_VERSION), Err(ErrorCode::NoNode));
		assert_eq!(tree.stat("/a").unwrap().num_children, 0);
	}

	#[test]
	fn sequential_names_use_parent_cversion() {
		let mut tree = Tree::default();
		tree.create("/q", Bytes::new(), CreateMode::Persistent, 0).unwrap();
		let first = tree.create("/q/item-", Bytes::new(), CreateMode::PersistentSequential, 0).unwrap();
		let second = tree.create("/q/item-", Bytes::new(), CreateMode::PersistentSequential, 0).unwrap();
		assert_eq!(first, "/q/item-0000000000");
		assert_eq!(second, "/q/item-0000000001");
	}

	#[test]
	fn removing_a_sessions_ephemerals_keeps_others() {
		let mut tree = Tree::default();
		tree.create("/svc", Bytes::new(), CreateMode::Persistent, 0).unwrap();
		tree.create("/svc/a", Bytes::new(), CreateMode::Ephemeral, 1).unwrap();
		tree.create("/svc/b", Bytes::new(), CreateMode::Ephemeral, 2).unwrap();

		assert_eq!(tree.remove_ephemerals(1), vec!["/svc/a".to_string()]);
		assert_eq!(tree.children("/svc"), vec!["b".to_string()]);
		assert!(tree.remove_ephemerals(0).is_empty());
	}

	#[test]
	fn children_lists_direct_descendants_only() {
		let mut tree = Tree::default();
		tree.create("/a", Bytes::new(), CreateMode::Persistent, 0).unwrap();
		tree.create("/a/b", Bytes::new(), CreateMode::Persistent, 0).unwrap();
		tree.create("/a/b/c", Bytes::new(), CreateMode::Persistent, 0).unwrap();
		tree.create("/ab", Bytes::new(), CreateMode::Persistent, 0).unwrap();
		assert_eq!(tree.children("/"), vec!["a".to_string(), "ab".to_string()]);
		assert_eq!(tree.children("/a"), vec!["b".to_string()]);
	}
}

use std::time::Duration;

use zkreg::{PathError, ensure_exists};
use zkreg_runtime::Session;
use zkreg_runtime::protocol::{CreateMode, ErrorCode, OpCode};
use zkreg_runtime::testing::MemoryEnsemble;

async fn connect(ensemble: &MemoryEnsemble) -> Session {
	Session::connect(&ensemble.servers(), Duration::from_secs(5))
		.await
		.expect("session should connect")
}

#[tokio::test]
async fn deep_path_creates_every_prefix() {
	let ensemble = MemoryEnsemble::start().await.unwrap();
	let session = connect(&ensemble).await;

	ensure_exists(&session, "/a/b/c/d").await.unwrap();
	for path in ["/a", "/a/b", "/a/b/c", "/a/b/c/d"] {
		let stat = ensemble.stat(path).unwrap_or_else(|| panic!("{path} should exist"));
		assert!(!stat.is_ephemeral(), "{path} should be persistent");
		assert_eq!(ensemble.data(path).unwrap().len(), 0);
	}
}

#[tokio::test]
async fn second_call_is_a_no_op() {
	let ensemble = MemoryEnsemble::start().await.unwrap();
	let session = connect(&ensemble).await;

	ensure_exists(&session, "/rpcx/Arith").await.unwrap();
	ensemble.reset_op_counts();

	ensure_exists(&session, "/rpcx/Arith").await.unwrap();
	assert_eq!(ensemble.op_count(OpCode::Exists), 1);
	assert_eq!(ensemble.op_count(OpCode::Create), 0);
}

#[tokio::test]
async fn missing_leaf_under_existing_parent_takes_one_create() {
	let ensemble = MemoryEnsemble::start().await.unwrap();
	let session = connect(&ensemble).await;
	ensemble.seed("/rpcx", CreateMode::Persistent, 0).unwrap();
	ensemble.reset_op_counts();

	ensure_exists(&session, "/rpcx/Arith").await.unwrap();
	assert!(ensemble.exists("/rpcx/Arith"));
	assert_eq!(ensemble.op_count(OpCode::Create), 1);
}

#[tokio::test]
async fn malformed_paths_fail_without_network_calls() {
	let ensemble = MemoryEnsemble::start().await.unwrap();
	let session = connect(&ensemble).await;
	ensemble.reset_op_counts();

	assert!(matches!(ensure_exists(&session, "").await, Err(PathError::Empty)));
	assert!(matches!(
		ensure_exists(&session, "relative/path").await,
		Err(PathError::NotAbsolute(path)) if path == "relative/path"
	));
	assert!(matches!(ensure_exists(&session, "/a//b").await, Err(PathError::EmptySegment(_))));
	ensure_exists(&session, "/").await.unwrap();

	assert_eq!(ensemble.op_count(OpCode::Exists), 0);
	assert_eq!(ensemble.op_count(OpCode::Create), 0);
}

#[tokio::test]
async fn node_exists_while_walking_counts_as_created() {
	let ensemble = MemoryEnsemble::start().await.unwrap();
	let session = connect(&ensemble).await;
	// Direct create fails, then another client wins the race for the walk's create.
	ensemble.inject_error(OpCode::Create, ErrorCode::NoNode);
	ensemble.inject_error(OpCode::Create, ErrorCode::NodeExists);
	ensemble.reset_op_counts();

	ensure_exists(&session, "/raced").await.unwrap();
	assert_eq!(ensemble.op_count(OpCode::Create), 2);
}

#[tokio::test]
async fn other_walk_failures_abort_with_the_failing_prefix() {
	let ensemble = MemoryEnsemble::start().await.unwrap();
	let session = connect(&ensemble).await;
	ensemble.inject_error(OpCode::Create, ErrorCode::NoNode);
	ensemble.inject_error(OpCode::Create, ErrorCode::NoAuth);

	match ensure_exists(&session, "/locked/child").await {
		Err(PathError::Coordination { path, source }) => {
			assert_eq!(path, "/locked");
			assert_eq!(source.code(), Some(ErrorCode::NoAuth));
		}
		other => panic!("expected coordination error, got {other:?}"),
	}
	assert!(!ensemble.exists("/locked"));
	assert!(!ensemble.exists("/locked/child"));
}

#[tokio::test]
async fn closed_session_reports_not_connected() {
	let ensemble = MemoryEnsemble::start().await.unwrap();
	let session = connect(&ensemble).await;
	session.close().await;

	match ensure_exists(&session, "/after/close").await {
		Err(PathError::Coordination { source, .. }) => assert!(matches!(source, zkreg_runtime::Error::NotConnected)),
		other => panic!("expected not-connected, got {other:?}"),
	}
}

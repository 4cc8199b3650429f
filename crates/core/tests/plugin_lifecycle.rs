use std::time::Duration;

use zkreg::{ConnectError, RegisterError, RegisterPlugin, RegistryConfig, SessionState, ZooKeeperRegisterPlugin};
use zkreg_runtime::protocol::OpCode;
use zkreg_runtime::testing::MemoryEnsemble;

fn config(ensemble: &MemoryEnsemble) -> RegistryConfig {
	RegistryConfig::new("127.0.0.1:8972", ensemble.servers(), "/rpcx")
}

struct Arith;

#[tokio::test]
async fn start_register_unregister_close() {
	let ensemble = MemoryEnsemble::start().await.unwrap();
	let mut plugin = ZooKeeperRegisterPlugin::new(config(&ensemble));

	plugin.start().await.unwrap();
	let session_id = plugin.session().unwrap().session_id();
	assert_eq!(plugin.session().unwrap().negotiated_timeout(), Duration::from_secs(1));

	plugin.register("Arith", &Arith).await.unwrap();
	let stat = ensemble.stat("/rpcx/Arith/127.0.0.1:8972").expect("registration node");
	assert_eq!(stat.ephemeral_owner, session_id);

	plugin.unregister("Arith").await;
	assert!(!ensemble.exists("/rpcx/Arith/127.0.0.1:8972"));

	plugin.close().await;
	assert_eq!(plugin.session().unwrap().state(), SessionState::Closed);
	assert!(ensemble.session_ids().is_empty());

	let err = plugin.register("Arith", &Arith).await.unwrap_err();
	assert!(
		matches!(err.session_error(), Some(zkreg_runtime::Error::NotConnected)),
		"expected not-connected, got {err:?}"
	);
}

#[tokio::test]
async fn close_releases_registrations_immediately() {
	let ensemble = MemoryEnsemble::start().await.unwrap();
	let mut plugin = ZooKeeperRegisterPlugin::new(config(&ensemble));
	plugin.start().await.unwrap();
	plugin.register("Arith", &Arith).await.unwrap();
	plugin.register("Echo", &()).await.unwrap();

	plugin.close().await;
	assert!(ensemble.children("/rpcx/Arith").is_empty());
	assert!(ensemble.children("/rpcx/Echo").is_empty());
	assert_eq!(ensemble.op_count(OpCode::CloseSession), 1);

	// A second close neither fails nor talks to the server.
	plugin.close().await;
	assert_eq!(ensemble.op_count(OpCode::CloseSession), 1);
}

#[tokio::test]
async fn start_is_idempotent_while_connected() {
	let ensemble = MemoryEnsemble::start().await.unwrap();
	let mut plugin = ZooKeeperRegisterPlugin::new(config(&ensemble));

	plugin.start().await.unwrap();
	let first = plugin.session().unwrap().session_id();
	plugin.start().await.unwrap();
	assert_eq!(plugin.session().unwrap().session_id(), first);
	assert_eq!(ensemble.session_ids(), [first]);
}

#[tokio::test]
async fn restart_after_close_opens_a_new_session() {
	let ensemble = MemoryEnsemble::start().await.unwrap();
	let mut plugin = ZooKeeperRegisterPlugin::new(config(&ensemble));

	plugin.start().await.unwrap();
	let first = plugin.session().unwrap().session_id();
	plugin.close().await;

	plugin.start().await.unwrap();
	let second = plugin.session().unwrap().session_id();
	assert_ne!(first, second);
	plugin.register("Arith", &Arith).await.unwrap();
	assert_eq!(ensemble.stat("/rpcx/Arith/127.0.0.1:8972").unwrap().ephemeral_owner, second);
}

#[tokio::test]
async fn unreachable_servers_fail_start() {
	let listener = std::net::TcpListener::bind(("127.0.0.1", 0)).unwrap();
	let addr = listener.local_addr().unwrap().to_string();
	drop(listener);

	let mut plugin = ZooKeeperRegisterPlugin::new(RegistryConfig::new("127.0.0.1:8972", vec![addr.clone()], "/rpcx"));
	match plugin.start().await {
		Err(ConnectError::Session { servers, .. }) => assert_eq!(servers, addr),
		other => panic!("expected session error, got {other:?}"),
	}
	assert!(plugin.session().is_none());
	assert!(matches!(plugin.register("Arith", &Arith).await, Err(RegisterError::NotStarted)));
}

#[tokio::test]
async fn plugin_works_through_a_trait_object() {
	let ensemble = MemoryEnsemble::start().await.unwrap();
	let mut plugin: Box<dyn RegisterPlugin> = Box::new(ZooKeeperRegisterPlugin::new(config(&ensemble)));

	assert_eq!(plugin.name(), "ZooKeeperRegisterPlugin");
	plugin.start().await.unwrap();
	plugin.register("Arith", &Arith).await.unwrap();
	assert!(ensemble.exists("/rpcx/Arith/127.0.0.1:8972"));
	plugin.close().await;
	assert!(!ensemble.exists("/rpcx/Arith/127.0.0.1:8972"));
}

use std::io;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing_subscriber::EnvFilter;
use zkreg::register;
use zkreg_runtime::Session;
use zkreg_runtime::testing::MemoryEnsemble;

#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
	fn text(&self) -> String {
		String::from_utf8_lossy(&self.0.lock()).into_owned()
	}
}

impl io::Write for Captured {
	fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
		self.0.lock().extend_from_slice(buf);
		Ok(buf.len())
	}

	fn flush(&mut self) -> io::Result<()> {
		Ok(())
	}
}

/// Registers `Arith` with a subscriber filtered by `directives` and returns what it logged.
async fn register_logged(directives: &str) -> String {
	let captured = Captured::default();
	let writer = captured.clone();
	let subscriber = tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::new(directives))
		.with_writer(move || writer.clone())
		.with_ansi(false)
		.finish();
	let _guard = tracing::subscriber::set_default(subscriber);

	let ensemble = MemoryEnsemble::start().await.unwrap();
	let session = Session::connect(&ensemble.servers(), Duration::from_secs(5)).await.unwrap();
	register(&session, "/rpcx", "127.0.0.1:8972", "Arith").await.unwrap();
	session.close().await;
	captured.text()
}

#[tokio::test]
async fn dotted_target_selects_path_events_only() {
	let logged = register_logged("zkreg.path=debug").await;
	assert!(logged.contains("zkreg.path"), "{logged}");
	assert!(logged.contains("created namespace node"), "{logged}");
	assert!(!logged.contains("service registered"), "{logged}");
	assert!(!logged.contains("session closed"), "{logged}");
}

#[tokio::test]
async fn dotted_target_selects_registry_events_only() {
	let logged = register_logged("zkreg.registry=info").await;
	assert!(logged.contains("zkreg.registry"), "{logged}");
	assert!(logged.contains("service registered"), "{logged}");
	assert!(!logged.contains("created namespace node"), "{logged}");
}

#[tokio::test]
async fn crate_prefix_selects_every_dotted_target() {
	let logged = register_logged("zkreg=debug").await;
	assert!(logged.contains("created namespace node"), "{logged}");
	assert!(logged.contains("service registered"), "{logged}");
	assert!(logged.contains("session closed"), "{logged}");
	assert!(!logged.contains("target="), "{logged}");
}

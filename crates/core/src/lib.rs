//! Service registration for ZooKeeper-style coordination services.
//!
//! A service instance advertises itself as an ephemeral node at
//! `{base_path}/{service_name}/{service_address}`. Ancestors are created on
//! demand as persistent nodes; the registration node disappears when the
//! instance unregisters or its session ends.
//!
//! ```ignore
//! use zkreg::{RegisterPlugin, RegistryConfig, ZooKeeperRegisterPlugin};
//!
//! let config = RegistryConfig::new("127.0.0.1:8972", vec!["localhost:2181".into()], "/rpcx");
//! let mut plugin = ZooKeeperRegisterPlugin::new(config);
//! plugin.start().await?;
//! plugin.register("Arith", &()).await?;
//! // ... serve ...
//! plugin.unregister("Arith").await;
//! plugin.close().await;
//! ```

pub mod config;
pub mod error;
pub mod path;
pub mod plugin;
pub mod registry;

pub use config::{DEFAULT_SESSION_TIMEOUT_MS, RegistryConfig};
pub use error::{ConfigError, ConnectError, PathError, RegisterError};
pub use path::{NamespacePath, ensure_exists};
pub use plugin::{RegisterPlugin, ZooKeeperRegisterPlugin};
pub use registry::{register, registration_path, service_path, unregister};
pub use zkreg_runtime::{Session, SessionState};

//! DaemonBuilder - デーモンの構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）
//! - 共有状態（レジストリ・要求テーブル）はここで 1 つだけ作って注入する
//!
//! # 使用例
//! ```ignore
//! let daemon = DaemonBuilder::new(config)
//!     .register(Identity)?
//!     .register(Half)?
//!     .build(SBusTransport::bind(&path)?)?;
//! daemon.run().await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use crate::domain::StorletError;
use crate::ports::{IdGenerator, Storlet, SystemClock, Transport, UlidGenerator};
use crate::stream::{ObjectRequestTable, StreamBuilder};
use crate::task::{TaskContext, TaskFactory};

use super::config::{ConfigError, DaemonConfig};
use super::dispatch_loop::DispatchLoop;
use super::execution::{DEFAULT_GRACE_PERIOD, ExecutionManager};
use super::registry::{RegistryError, StorletRegistry};

/// BuildError はデーモン構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("storlet '{requested}' is not registered (available: {available:?})")]
    MissingStorlet {
        requested: String,
        available: Vec<String>,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

pub struct DaemonBuilder {
    config: DaemonConfig,
    registry: StorletRegistry,
    ids: Option<Arc<dyn IdGenerator>>,
    grace_period: Duration,
}

impl DaemonBuilder {
    pub fn new(config: DaemonConfig) -> Self {
        Self {
            config,
            registry: StorletRegistry::new(),
            ids: None,
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }

    pub fn register<S: Storlet + 'static>(mut self, storlet: S) -> Result<Self, BuildError> {
        self.registry.register(storlet)?;
        Ok(self)
    }

    /// Use a prepared registry instead of registering one by one.
    pub fn registry(mut self, registry: StorletRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Validate the configuration, resolve the storlet, and wire the loop.
    pub fn build<T: Transport>(self, transport: T) -> Result<Daemon<T>, BuildError> {
        self.config.validate()?;

        let storlet = self
            .registry
            .get(&self.config.storlet_name)
            .ok_or_else(|| BuildError::MissingStorlet {
                requested: self.config.storlet_name.clone(),
                available: self.registry.names(),
            })?;

        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(SystemClock)));
        let requests = Arc::new(ObjectRequestTable::new());
        let manager = Arc::new(
            ExecutionManager::new(self.config.pool_size, Arc::clone(&ids))
                .with_grace_period(self.grace_period),
        );

        let factory = TaskFactory::new(StreamBuilder::new(Arc::clone(&requests), ids));
        let ctx = TaskContext {
            manager,
            storlet,
            requests,
        };

        Ok(Daemon {
            dispatch_loop: DispatchLoop::new(
                transport,
                factory,
                ctx,
                self.config.failure_policy,
                self.config.container_id.clone(),
            ),
            config: self.config,
        })
    }
}

/// A wired daemon, ready to serve.
pub struct Daemon<T> {
    dispatch_loop: DispatchLoop<T>,
    config: DaemonConfig,
}

impl<T: Transport> Daemon<T> {
    pub fn config(&self) -> &DaemonConfig {
        &self.config
    }

    pub fn manager(&self) -> Arc<ExecutionManager> {
        Arc::clone(&self.dispatch_loop.context().manager)
    }

    pub fn requests(&self) -> Arc<ObjectRequestTable> {
        Arc::clone(&self.dispatch_loop.context().requests)
    }

    /// Serve until Halt or a fatal error.
    pub async fn run(self) -> Result<(), StorletError> {
        self.dispatch_loop.run().await
    }
}

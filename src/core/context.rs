//! 显式运行上下文
//!
//! 进程启动时构建一次，再把各组件按引用传给路由器、编排循环和 Worker。没有模块级的全局单例。

use std::sync::Arc;

use anyhow::Context as _;
use tokio_util::sync::CancellationToken;

use super::ShutdownManager;
use crate::config::{AppConfig, Backend};
use crate::dispatch::{MemoryWorkQueue, WorkQueue, Worker, WorkerPool};
use crate::llm::{create_oracle, Oracle};
use crate::notify::NotificationBus;
use crate::orchestrator::{Orchestrator, OrchestratorSettings};
use crate::router::IntentRouter;
use crate::store::{MemoryTaskStore, TaskStore};
use crate::tools::{builtin_registry, ToolRegistry};

#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn TaskStore>,
    pub queue: Arc<dyn WorkQueue>,
    pub oracle: Arc<dyn Oracle>,
    pub tools: Arc<ToolRegistry>,
    pub bus: Arc<NotificationBus>,
    pub shutdown: ShutdownManager,
}

impl AppContext {
    /// 按配置选择存储与队列后端
    pub async fn from_config(config: AppConfig) -> anyhow::Result<Self> {
        let oracle = create_oracle(&config.llm).context("Failed to create oracle")?;
        let store = open_store(&config).await?;
        let queue = open_queue(&config).await?;
        let tools = Arc::new(builtin_registry(&config.tools));

        tracing::info!(
            store = ?config.store.backend,
            dispatcher = ?config.dispatcher.backend,
            topic = %config.dispatcher.topic,
            "Context ready"
        );

        Ok(Self {
            bus: Arc::new(NotificationBus::new(config.notify.channel_capacity)),
            config: Arc::new(config),
            store,
            queue,
            oracle,
            tools,
            shutdown: ShutdownManager::new(),
        })
    }

    /// 全内存上下文，oracle 由调用方提供
    pub fn in_memory(config: AppConfig, oracle: Arc<dyn Oracle>) -> Self {
        Self {
            store: Arc::new(MemoryTaskStore::new()),
            queue: Arc::new(MemoryWorkQueue::new()),
            tools: Arc::new(builtin_registry(&config.tools)),
            bus: Arc::new(NotificationBus::new(config.notify.channel_capacity)),
            config: Arc::new(config),
            oracle,
            shutdown: ShutdownManager::new(),
        }
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = Arc::new(tools);
        self
    }

    pub fn orchestrator(&self) -> Orchestrator {
        Orchestrator::new(
            Arc::clone(&self.store),
            Arc::clone(&self.oracle),
            Arc::clone(&self.tools),
            OrchestratorSettings::from_config(&self.config),
        )
    }

    pub fn router(&self) -> anyhow::Result<IntentRouter> {
        IntentRouter::new(
            Arc::clone(&self.store),
            Arc::clone(&self.oracle),
            Arc::clone(&self.queue),
            self.config.dispatcher.topic.clone(),
        )
        .context("Failed to build intent router")
    }

    pub fn worker(&self) -> Worker {
        Worker::new(
            self.config.dispatcher.topic.clone(),
            Arc::clone(&self.queue),
            Arc::new(self.orchestrator()),
            Arc::clone(&self.bus),
        )
    }

    /// 按 [dispatcher] workers 启动 Worker 池，随关闭信号退出
    pub fn spawn_workers(&self) -> WorkerPool {
        self.spawn_workers_with(self.shutdown.child_token())
    }

    pub fn spawn_workers_with(&self, shutdown: CancellationToken) -> WorkerPool {
        let pool = WorkerPool::spawn(self.config.dispatcher.workers, self.worker(), shutdown);
        tracing::info!(workers = pool.len(), "Worker pool started");
        pool
    }
}

async fn open_store(config: &AppConfig) -> anyhow::Result<Arc<dyn TaskStore>> {
    match config.store.backend {
        Backend::Memory => Ok(Arc::new(MemoryTaskStore::new())),
        #[cfg(feature = "async-sqlite")]
        Backend::Sqlite => {
            let store = crate::store::SqliteTaskStore::open(&config.store.path)
                .await
                .with_context(|| format!("Failed to open task store at {}", config.store.path.display()))?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "async-sqlite"))]
        Backend::Sqlite => anyhow::bail!("SQLite store requires the `async-sqlite` feature"),
    }
}

async fn open_queue(config: &AppConfig) -> anyhow::Result<Arc<dyn WorkQueue>> {
    match config.dispatcher.backend {
        Backend::Memory => Ok(Arc::new(MemoryWorkQueue::new())),
        #[cfg(feature = "async-sqlite")]
        Backend::Sqlite => {
            let queue = crate::dispatch::SqliteWorkQueue::open(
                &config.store.path,
                config.dispatcher.poll_interval(),
            )
            .await
            .with_context(|| format!("Failed to open work queue at {}", config.store.path.display()))?;
            Ok(Arc::new(queue))
        }
        #[cfg(not(feature = "async-sqlite"))]
        Backend::Sqlite => anyhow::bail!("SQLite queue requires the `async-sqlite` feature"),
    }
}

use std::{future::Future, io, net::SocketAddr, sync::Arc};

use derive_more::Deref;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::{
    config::{AppConfig, WorkerConfig},
    database::DbManager,
    queue::TaskQueue,
    web,
    worker::WorkerPool,
    Result,
};

// ###################################
// ->  Structs
// ###################################
pub struct App {
    pub app_state: AppState,
    pub listener: TcpListener,
    pub worker_config: WorkerConfig,
}

impl App {
    pub fn new(app_state: AppState, listener: TcpListener, worker_config: WorkerConfig) -> Self {
        App {
            app_state,
            listener,
            worker_config,
        }
    }

    /// Connects to and migrates the database, builds the queue client and binds the listener.
    pub async fn build_from_config(config: &AppConfig) -> Result<Self> {
        let dm = DbManager::init(config).await?;
        dm.migrate().await?;
        let task_queue = TaskQueue::new(dm.db().clone(), config.worker_config.retry_policy());

        let app_state = AppState::new(dm, task_queue);

        let addr = SocketAddr::from((config.net_config.host, config.net_config.app_port));
        let listener = TcpListener::bind(addr).await?;
        let addr = listener.local_addr()?;
        info!("{:<20} - {}", "Listening on:", addr);

        let app = App::new(app_state, listener, config.worker_config.clone());
        Ok(app)
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serves HTTP and, unless `num_workers` is 0, runs the worker pool next to it.
    /// Once `shutdown_token` is cancelled the server drains, the workers finish their
    /// current task and the shared database pool gets closed.
    pub async fn run(self, shutdown_token: CancellationToken) -> Result<()> {
        let App {
            app_state,
            listener,
            worker_config,
        } = self;

        let worker_pool = (worker_config.num_workers > 0).then(|| {
            let pool = WorkerPool::new(app_state.task_queue.clone(), &worker_config)
                .with_shutdown_token(shutdown_token.child_token());
            tokio::spawn(pool.run())
        });

        let served = web::serve(listener, app_state.clone(), shutdown_token.clone()).await;

        // The server might have stopped on its own, make sure the workers follow.
        shutdown_token.cancel();
        if let Some(worker_pool) = worker_pool {
            worker_pool.await?;
        }
        app_state.database_mgr.close().await;

        served?;
        Ok(())
    }
}

pub struct InternalState {
    pub database_mgr: DbManager,
    pub task_queue: TaskQueue,
}

/// Application state containing all global data.
/// It implements `Deref` to easily access the fields on `InternalState`
/// Uses an `Arc` so it can be cloned around.
#[derive(Clone, Deref)]
pub struct AppState(Arc<InternalState>);

impl AppState {
    pub fn new(database_mgr: DbManager, task_queue: TaskQueue) -> Self {
        AppState(Arc::new(InternalState {
            database_mgr,
            task_queue,
        }))
    }
}

/// Cancels `shutdown_token` once `signal` fires.
/// If the signal can not be listened for, the token is never cancelled by this function.
pub async fn cancel_on_signal<F>(signal: F, shutdown_token: CancellationToken)
where
    F: Future<Output = io::Result<()>>,
{
    match signal.await {
        Ok(()) => {
            info!("Received shutdown signal, initiating graceful shutdown...");
            shutdown_token.cancel();
        }
        Err(e) => {
            error!("Failed to listen for the shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

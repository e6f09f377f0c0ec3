//! Runs only the worker pool, so consumers can be scaled apart from the HTTP intake.

use subscriber_intake::{
    app::cancel_on_signal, config::get_or_init_config, database::DbManager, queue::TaskQueue,
    worker::WorkerPool, Result,
};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    #[cfg(not(debug_assertions))]
    {
        subscriber_intake::init_production_tracing()
    }
    #[cfg(debug_assertions)]
    {
        subscriber_intake::init_dbg_tracing();
    }

    let config = get_or_init_config();
    let dm = DbManager::init(config).await?;
    dm.migrate().await?;
    let task_queue = TaskQueue::new(dm.db().clone(), config.worker_config.retry_policy());

    let worker_pool = WorkerPool::new(task_queue.clone(), &config.worker_config);
    let signal_shutdown = worker_pool.shutdown_token();
    tokio::spawn(cancel_on_signal(tokio::signal::ctrl_c(), signal_shutdown));

    worker_pool.run().await;
    task_queue.close().await;

    info!("Intake worker stopped");
    Ok(())
}

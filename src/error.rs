use crate::{config, database, queue, web, worker};

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("database error: {0}")]
    Database(#[from] database::Error),
    #[error("queue error: {0}")]
    Queue(#[from] queue::QueueError),
    #[error("worker error: {0}")]
    Worker(#[from] worker::WorkerError),
    #[error("web error: {0}")]
    Web(#[from] web::Error),

    #[error("tokio joining error: {0}")]
    TokioJoin(#[from] tokio::task::JoinError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

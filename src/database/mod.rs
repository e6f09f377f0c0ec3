use std::time::Duration;

use sqlx::{postgres::PgPoolOptions, Connection, PgConnection, PgPool};
use tracing::info;

use crate::config::{AppConfig, DbConfig};

#[derive(Clone, Debug)]
pub struct DbManager {
    db: PgPool,
}

impl DbManager {
    pub async fn init(config: &AppConfig) -> Result<Self> {
        info!("{:<20} - Initializing the DB pool", "init_db");
        let max_cons = if cfg!(test) { 1 } else { 10 };

        let con_opts = config.db_config.connection_options();

        let db_pool = PgPoolOptions::new()
            .max_connections(max_cons)
            .acquire_timeout(Duration::from_millis(2000))
            .connect_with(con_opts)
            .await
            .map_err(|ex| Error::FailToCreatePool(ex.to_string()))?;

        Ok(Self { db: db_pool })
    }

    /// Builds a manager whose pool only connects on first use.
    /// Handy when the database might not be reachable yet.
    pub fn init_lazy(db_config: &DbConfig) -> Self {
        let db_pool = PgPoolOptions::new()
            .acquire_timeout(Duration::from_millis(500))
            .connect_lazy_with(db_config.connection_options());

        Self { db: db_pool }
    }

    /// Runs all pending migrations from `./migrations`.
    pub async fn migrate(&self) -> Result<()> {
        info!("{:<20} - Running DB migrations", "migrate_db");
        sqlx::migrate!("./migrations").run(&self.db).await?;
        Ok(())
    }

    /// Creates the database named in `db_config` and migrates it.
    /// Used by the integration tests to get a fresh database per test.
    pub async fn configure_for_test(db_config: &DbConfig) -> Result<()> {
        let mut connection =
            PgConnection::connect_with(&db_config.connection_options_without_db()).await?;

        let sql = format!(r#"CREATE DATABASE "{}";"#, db_config.db_name);
        sqlx::query(&sql).execute(&mut connection).await?;

        // Create pool only used to migrate the DB
        let db_pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_millis(1000))
            .connect_with(db_config.connection_options())
            .await
            .map_err(|ex| Error::FailToCreatePool(format!("Test Config: {ex}")))?;
        sqlx::migrate!("./migrations").run(&db_pool).await?;
        db_pool.close().await;

        Ok(())
    }

    pub fn db(&self) -> &PgPool {
        &self.db
    }

    pub async fn close(&self) {
        info!("{:<20} - Closing the DB pool", "close_db");
        self.db.close().await;
    }
}

// ###################################
// ->   ERROR
// ###################################
pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to create db pool: {0}")]
    FailToCreatePool(String),
    #[error("sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("sqlx migration error: {0}")]
    SqlxMigrate(#[from] sqlx::migrate::MigrateError),
}

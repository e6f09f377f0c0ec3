use subscriber_intake::{app::cancel_on_signal, config::get_or_init_config, App, Result};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // We have a different logging mechanism for production
    #[cfg(not(debug_assertions))]
    {
        subscriber_intake::init_production_tracing()
    }
    #[cfg(debug_assertions)]
    {
        subscriber_intake::init_dbg_tracing();
    }

    let config = get_or_init_config();
    let app = App::build_from_config(config).await?;

    let shutdown_token = CancellationToken::new();
    let signal_shutdown = shutdown_token.clone();
    tokio::spawn(cancel_on_signal(tokio::signal::ctrl_c(), signal_shutdown));

    app.run(shutdown_token).await?;

    info!("Subscriber intake stopped");
    Ok(())
}

use anyhow::Context;
use mcp_testbed::configuration::get_configuration;
use mcp_testbed::startup::{run, AppState};
use mcp_testbed::telemetry::{get_subscriber, init_subscriber};
use std::net::TcpListener;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = get_subscriber("mcp-testbed".into(), "info".into(), std::io::stdout);
    init_subscriber(subscriber)?;

    let settings = get_configuration().context("Failed to read configuration")?;
    let state = AppState::build(&settings).context("Failed to initialise server state")?;

    let address = settings.address();
    tracing::info!(
        address = %address,
        environment = %settings.environment,
        data_dir = %settings.data_dir.display(),
        "Start server"
    );
    let listener =
        TcpListener::bind(&address).with_context(|| format!("failed to bind to {}", address))?;

    run(listener, state)?.await?;
    Ok(())
}

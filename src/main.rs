//! Quiz admin binary entrypoint: loads configuration, connects to the backend and prints
//! one listing.

use std::{env, sync::Arc};

use anyhow::{Context, bail};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use quiz_admin::{
    config::ClientConfig,
    gateway::http::{HttpGateway, HttpGatewayConfig},
    model::{EntityKind, Identity, ServerId},
    session::{Session, Transitioned},
    sync::{KeyPolicy, SyncEngine},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = ClientConfig::load();
    let gateway_config = HttpGatewayConfig::new(&config.base_url)
        .context("configuring backend URL")?
        .with_timeout(config.timeout);
    let gateway = HttpGateway::new(gateway_config).context("building HTTP client")?;
    let engine = SyncEngine::new(Arc::new(gateway), config.sync, KeyPolicy::default());
    let session = Session::new(engine);

    let mut args = env::args().skip(1);
    let command = args.next().unwrap_or_else(|| "kahoots".into());
    let entered = match command.as_str() {
        "kahoots" => session.start().await,
        "users" => session.select_kind(EntityKind::User).await?,
        "groups" => session.select_kind(EntityKind::Group).await?,
        "questions" => {
            let id = args
                .next()
                .context("usage: quiz-admin questions <kahoot-id>")?
                .parse::<i64>()
                .context("kahoot id must be an integer")?;
            report(session.start().await);
            session
                .select_entity(Identity::Server(ServerId::new(id)))
                .await?
        }
        other => bail!("unknown command `{other}`; expected kahoots, users, groups or questions"),
    };
    report(entered);

    for entity in session.contents().await {
        info!(
            identity = %entity.identity(),
            origin = ?entity.origin(),
            payload = %serde_json::to_string(entity.payload()).context("encoding row")?,
            "row"
        );
    }

    Ok(())
}

fn report(entered: Transitioned) {
    match entered.refresh_error {
        Some(err) => warn!(view = %entered.view, error = %err, "showing previous rows"),
        None => info!(view = %entered.view, "view loaded"),
    }
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

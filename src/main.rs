use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use telegate::config::{Config, WebhookConfig};
use telegate::{Client, InputFile};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,telegate=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let mut client = Client::from_config(&config).context("Failed to create client")?;

    let gateway = client.gateway();
    client.on("test", move |chat_id, _args| {
        let gateway = gateway.clone();
        async move {
            gateway.send_message(chat_id, "You passed").await?;
            anyhow::Ok(())
        }
    });

    let gateway = client.gateway();
    client.on("echo", move |chat_id, args| {
        let gateway = gateway.clone();
        async move {
            let text = if args.is_empty() {
                "Usage: /echo <text>".to_string()
            } else {
                args.join(" ")
            };
            gateway.send_message(chat_id, text).await?;
            anyhow::Ok(())
        }
    });

    // Ctrl-C stops polling or the webhook wait; the session guard cleans up
    let shutdown = client.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, shutting down");
            shutdown.cancel();
        }
    });

    let session = client.enter();
    let outcome = match &config.webhook {
        Some(webhook) => run_webhook(&client, webhook).await,
        None => {
            info!("Bot is starting in polling mode...");
            client.poll(config.polling.interval()).await;
            Ok(())
        }
    };
    session.close().await;

    outcome
}

async fn run_webhook(client: &Client, webhook: &WebhookConfig) -> Result<()> {
    info!("Bot is starting in webhook mode...");
    client
        .set_webhook(&webhook.url, InputFile::path(&webhook.certificate))
        .await
        .context("Failed to register webhook")?;

    let addr = client
        .run_server(&webhook.certificate, &webhook.key, webhook.port)
        .await
        .context("Failed to start webhook server")?;
    info!("Webhook server listening on {}", addr);

    client.run_forever().await;
    Ok(())
}

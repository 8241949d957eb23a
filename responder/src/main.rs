use std::sync::Arc;

use mimalloc::MiMalloc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use responder::agent::ResponderAgent;
use responder::config::AppConfig;
use responder::crm::salesforce::SalesforceClient;
use responder::email::{
    auth::GmailAuthenticator, client::EmailClient, intake::MessageIntake, outbound::ReplyDispatcher,
};
use responder::prompt::openai::OpenAiClient;
use responder::store::{checkpoint::CheckpointStore, conversations::ConversationBindingStore};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::Layer::default().with_ansi(false))
        .init();

    let cfg = AppConfig::load()?;

    let http_client = reqwest::ClientBuilder::new().use_rustls_tls().build()?;

    let authenticator = Arc::new(GmailAuthenticator::from_key_file(
        http_client.clone(),
        &cfg.gmail,
        &cfg.settings.mailbox_address,
    )?);
    let email_client = Arc::new(EmailClient::new(
        http_client.clone(),
        authenticator,
        &cfg.gmail,
        cfg.settings.mailbox_address.clone(),
    ));

    // Startup identity check: fail fast when the delegated credentials do not
    // resolve to the configured mailbox.
    let profile = email_client.get_profile().await?;
    tracing::info!(
        "Authenticated as {}",
        profile.email_address.as_deref().unwrap_or("<unknown>")
    );

    let intake = MessageIntake::new(
        email_client.clone(),
        CheckpointStore::new(&cfg.storage.checkpoint_file),
        cfg.settings.mailbox_address.clone(),
    );
    let dispatcher = Arc::new(ReplyDispatcher::new(email_client));
    let crm = Arc::new(SalesforceClient::new(http_client.clone(), cfg.crm.clone()));
    let ai = Arc::new(OpenAiClient::new(http_client, cfg.ai.clone()));
    let bindings = ConversationBindingStore::new(&cfg.storage.conversations_file);

    let responder = ResponderAgent::new(
        cfg.settings.clone(),
        intake,
        dispatcher,
        crm,
        ai,
        bindings,
    );

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    responder.run(shutdown).await;

    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            shutdown.cancel();
        },
        _ = terminate => {
            shutdown.cancel();
        },
    }
}

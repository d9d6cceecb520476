//! Pan-domain authentication issuer

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};

use panda_auth::{
    cli::{Cli, Command},
    config::Config,
    credential,
    gate::AuthorizationGate,
    http::{AppState, create_router},
    login::LoginFlow,
    oidc::OidcClient,
    settings::{KeyStore, PublicKeyStore, VerifierKeys},
    setup_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    let mut config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    let result = match cli.command {
        Some(Command::CheckSettings) => check_settings(&config).await,
        Some(Command::Verify { credential }) => verify(&config, &credential).await,
        Some(Command::Serve) | None => run_server(config).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Fetch, validate and summarize the settings blob
async fn check_settings(config: &Config) -> anyhow::Result<()> {
    let http = config.http.client()?;
    let source = config.settings.source(&http)?;
    let keys = KeyStore::stopped(Arc::clone(&source), config.settings.refresh_interval);

    let settings = keys.refresh().await?;
    info!(source = %source.describe(), "Settings blob is valid");
    println!("{}", serde_json::to_string_pretty(&settings.summary())?);
    Ok(())
}

/// Print the disposition of a credential as JSON
async fn verify(config: &Config, raw: &str) -> anyhow::Result<()> {
    let http = config.http.client()?;
    let source = config.settings.source(&http)?;
    let keys = PublicKeyStore::stopped("", source, config.settings.refresh_interval);
    let key = keys.verification_key().await?;

    let predicate = config.policy.predicate();
    let disposition = credential::verify(
        Some(raw),
        &key.public_key,
        credential::now_millis(),
        |user| predicate(user),
    );
    println!("{}", serde_json::to_string_pretty(&disposition)?);
    Ok(())
}

async fn run_server(config: Config) -> anyhow::Result<()> {
    config.validate_issuer()?;
    let addr = SocketAddr::new(config.server.host.parse()?, config.server.port);

    let http = config.http.client()?;
    let source = config.settings.source(&http)?;
    let keys = Arc::new(KeyStore::new(source, config.settings.refresh_interval));
    if let Err(e) = keys.settings().await {
        warn!(error = %e, "Settings not available yet, requests will fail until a fetch succeeds");
    }

    let oidc = Arc::new(OidcClient::new(http, Arc::clone(&keys), config.http.metadata_ttl));
    let predicate = config.policy.predicate();
    let login = Arc::new(LoginFlow::new(
        Arc::clone(&keys),
        oidc,
        config.issuer.clone(),
        Arc::clone(&predicate),
    ));
    let gate = Arc::new(AuthorizationGate::new(
        Arc::clone(&keys) as Arc<dyn VerifierKeys>,
        config.issuer.system.clone(),
        predicate,
    ));

    let app = create_router(Arc::new(AppState { gate, login }));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %listener.local_addr()?,
        system = %config.issuer.system,
        "Starting pan-domain issuer"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    keys.stop();
    info!("Issuer shutdown complete");
    Ok(())
}

/// Shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}

//! Headless sync agent.
//!
//! Connects to the backend from `SWAPSYNC__*` configuration, optionally
//! signs in with `SWAPSYNC_EMAIL`/`SWAPSYNC_PASSWORD`, and keeps the
//! realtime bridge and notification center running until Ctrl-C.

use std::env;
use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use swapsync::adapters::headless::{AutoConfirm, StaticPushTokens};
use swapsync::adapters::supabase;
use swapsync::application::AppContext;
use swapsync::config::{AppConfig, LoggingConfig};
use swapsync::ports::Credentials;

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_new(logging.directives())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("swapsync: {}", e);
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&config.logging);

    if let Err(e) = config.validate() {
        error!(error = %e, "invalid configuration");
        return ExitCode::FAILURE;
    }

    // No interactive shell: destructive prompts are declined and push stays off.
    let services = match supabase::connect(
        config.supabase(),
        config.realtime_settings(),
        config.sync_settings(),
        Arc::new(AutoConfirm(false)),
        Arc::new(StaticPushTokens::denied()),
    ) {
        Ok(services) => services,
        Err(e) => {
            error!(error = %e, "failed to build backend client");
            return ExitCode::FAILURE;
        }
    };

    let context = AppContext::new(services);
    context.start();

    let credentials = (env::var("SWAPSYNC_EMAIL"), env::var("SWAPSYNC_PASSWORD"));
    if let (Ok(email), Ok(password)) = credentials {
        match context
            .services()
            .auth
            .sign_in(&Credentials::new(email, password))
            .await
        {
            Ok(session) => info!(user = %session.user_id, "agent signed in"),
            Err(e) => warn!(error = %e, "sign-in failed, running signed out"),
        }
    }

    info!(url = %config.backend.url, "swapsync agent running");
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
    }

    info!(
        unread = context.notifications().unread_count(),
        "shutting down"
    );
    context.shutdown().await;
    ExitCode::SUCCESS
}

use clap::Parser;

use smartpantry_client::commands::{self, Cli};
use smartpantry_client::{logging, AppConfig};

fn main() -> std::process::ExitCode {
    // Initialize Sentry before anything else so panics during startup are captured.
    // Returns a no-op guard when SENTRY_DSN is absent (local dev).
    let _sentry_guard = sentry::init(sentry_options());

    let cli = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to start runtime: {e}");
            return std::process::ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("error: {e}");
            std::process::ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), smartpantry_client::AppError> {
    let mut config = AppConfig::load(cli.config.as_deref())?;
    cli.apply_to(&mut config)?;

    let _log_guard = logging::init(config.log_dir.as_deref());
    if let Some(dir) = &config.log_dir {
        logging::install_crash_hook(dir);
    }
    tracing::info!(
        base_url = %config.base_url,
        notifier = ?config.notifier,
        "Starting smartpantry v{}",
        env!("CARGO_PKG_VERSION")
    );

    commands::run(cli, config).await
}

fn sentry_options() -> sentry::ClientOptions {
    sentry::ClientOptions {
        dsn: option_env!("SENTRY_DSN").and_then(|s| s.parse().ok()),
        release: Some(env!("CARGO_PKG_VERSION").into()),
        traces_sample_rate: 0.0,
        send_default_pii: false,
        before_send: Some(std::sync::Arc::new(|mut event| {
            if let Some(ref mut user) = event.user {
                user.email = None;
                user.ip_address = None;
                user.username = None;
            }
            if let Some(ref mut request) = event.request {
                request.data = None;
            }
            Some(event)
        })),
        ..Default::default()
    }
}

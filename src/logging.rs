use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Global crash log directory, set during init.
static CRASH_LOG_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Initialize tracing with stderr, optional rolling file, and Sentry layers.
///
/// - Stderr: compact, human-readable (stdout is left to the transcript)
/// - File: daily rolling `smartpantry.log` under `log_dir` when given
/// - Sentry: captures ERROR events as issues, WARN as breadcrumbs
/// - Default level: INFO, override via RUST_LOG env
///
/// The returned guard must be held for the life of the process so buffered
/// file output is flushed.
pub fn init(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,smartpantry_client=debug"));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .compact();

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "smartpantry.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false).json();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    // No-op when Sentry DSN is not configured.
    let sentry_layer = sentry_tracing::layer().event_filter(|meta| match *meta.level() {
        tracing::Level::ERROR => sentry_tracing::EventFilter::Event,
        tracing::Level::WARN => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    });

    let result = tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .with(sentry_layer)
        .try_init();

    if let Err(e) = result {
        eprintln!("tracing already initialized: {e}");
    }

    tracing::debug!("Tracing initialized");
    guard
}

/// Install a panic hook that writes crash details to `<dir>/crash_logs` before
/// handing over to the previous hook.
pub fn install_crash_hook(data_dir: &Path) {
    let crash_dir = data_dir.join("crash_logs");
    if let Err(e) = std::fs::create_dir_all(&crash_dir) {
        tracing::warn!("Could not create crash log directory: {}", e);
        return;
    }
    CRASH_LOG_DIR.set(crash_dir).ok();

    let prev_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        if let Some(dir) = CRASH_LOG_DIR.get() {
            let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
            let path = dir.join(format!("crash_{}.log", timestamp));

            let mut report = format!(
                "=== SMARTPANTRY CLIENT CRASH REPORT ===\nTime: {}\nVersion: {}\n\n",
                chrono::Local::now().to_rfc3339(),
                env!("CARGO_PKG_VERSION"),
            );

            if let Some(msg) = info.payload().downcast_ref::<&str>() {
                report.push_str(&format!("Panic: {}\n", msg));
            } else if let Some(msg) = info.payload().downcast_ref::<String>() {
                report.push_str(&format!("Panic: {}\n", msg));
            } else {
                report.push_str("Panic: <unknown payload>\n");
            }

            if let Some(loc) = info.location() {
                report.push_str(&format!(
                    "Location: {}:{}:{}\n",
                    loc.file(),
                    loc.line(),
                    loc.column()
                ));
            }

            report.push_str(&format!(
                "\nBacktrace:\n{}\n",
                std::backtrace::Backtrace::force_capture()
            ));

            let _ = std::fs::write(&path, &report);
            eprintln!("[CRASH] Report written to: {}", path.display());
        }

        prev_hook(info);
    }));

    tracing::debug!("Crash hook installed");
}

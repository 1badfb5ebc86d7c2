use std::sync::OnceLock;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::core::config::AppPaths;

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Installs the global subscriber: stdout plus a daily-rolling file under
/// `{data_dir}/logs`. `RUST_LOG` overrides the default `info` filter.
///
/// Returns `false` when a global subscriber was already installed; the
/// existing one stays in place.
pub fn init(paths: &AppPaths) -> bool {
    let log_dir = &paths.log_dir;
    if let Err(err) = std::fs::create_dir_all(log_dir) {
        eprintln!("failed to create {}: {}", log_dir.display(), err);
    }

    let file_appender = tracing_appender::rolling::daily(log_dir, "server.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=debug"));

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(false);
    let file_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_ansi(false)
        .with_writer(non_blocking);

    match tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
    {
        Ok(()) => true,
        Err(err) => {
            tracing::debug!("Logging already initialized: {}", err);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_keeps_existing_subscriber() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = AppPaths::with_data_dir(tmp.path().to_path_buf(), tmp.path().join("data"));

        init(&paths);
        assert!(!init(&paths));
        assert!(paths.log_dir.is_dir());
    }
}

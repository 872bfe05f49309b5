use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

const LOG_FILE_PREFIX: &str = "hearthkeep.log";

/// Installs the JSON tracing subscriber and bridges `log` records (sqlx) into it.
///
/// Output goes to stderr, plus a daily rolling file when `config.log_dir` is
/// set. Keep the returned guard alive for as long as file logging should
/// flush. Calling this twice is harmless; the first subscriber stays.
pub fn init(config: &Config) -> anyhow::Result<Option<WorkerGuard>> {
    let _ = tracing_log::LogTracer::init();
    let filter = EnvFilter::try_new(&config.log_filter)
        .with_context(|| format!("parse log filter {:?}", config.log_filter))?;

    match &config.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (file_writer, guard) = tracing_appender::non_blocking(appender);
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .json()
                .with_target(true)
                .with_timer(UtcTime::rfc_3339())
                .with_writer(std::io::stderr.and(file_writer))
                .try_init();
            Ok(Some(guard))
        }
        None => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .json()
                .with_target(true)
                .with_timer(UtcTime::rfc_3339())
                .with_writer(std::io::stderr)
                .try_init();
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn rejects_unparseable_filter() {
        let config = Config {
            db_path: PathBuf::from("unused.sqlite3"),
            log_filter: "hearthkeep=loud".into(),
            log_dir: None,
            feed_capacity: 8,
        };
        assert!(init(&config).is_err());
    }
}

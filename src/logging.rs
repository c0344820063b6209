//! Tracing setup for embedders of the bridge.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::error::BridgeResult;

/// Initialise the global tracing subscriber. The filter comes from the
/// environment (`RUST_LOG`) with an `info` fallback; when a log file path is
/// configured, output goes there (parent directories are created) instead of
/// stderr. Calling this more than once is harmless.
pub fn init(log_file_path: Option<&Path>) -> BridgeResult<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match log_file_path {
        Some(path) => {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            let _ = tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(Arc::new(file))
                .with_ansi(false)
                .try_init();
        }
        None => {
            let _ = tracing_subscriber::fmt().with_env_filter(env_filter).try_init();
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_parent_directories_for_the_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs/nested/bridge.log");
        init(Some(&path)).unwrap();
        assert!(path.parent().unwrap().is_dir());
        // Re-initialisation is a no-op, not an error.
        init(None).unwrap();
    }
}

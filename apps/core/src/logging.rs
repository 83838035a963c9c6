use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::{Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::error;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

const MAX_LOG_BYTES: u64 = 1_000_000;
const MAX_ARCHIVES: usize = 5;
pub const LOG_ENV: &str = "WLAUNCH_LOG";

static PANIC_HOOK_INSTALLED: OnceLock<()> = OnceLock::new();

/// Installs a file-backed subscriber at `<logs_dir>/<component>.log`.
pub fn init(config: &Config, component: &str) -> Result<(), std::io::Error> {
    let log_dir = config.logs_dir();
    fs::create_dir_all(&log_dir)?;
    let log_path = log_dir.join(format!("{component}.log"));
    rotate_if_needed(&log_path, &log_dir, component)?;

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_target(true)
        .with_writer(Mutex::new(file))
        .try_init();
    if installed.is_err() {
        // Another subscriber (tests, embedding host) is already active.
        return Ok(());
    }

    install_panic_hook();
    Ok(())
}

fn rotate_if_needed(log_path: &Path, log_dir: &Path, component: &str) -> Result<(), std::io::Error> {
    let meta = match fs::metadata(log_path) {
        Ok(meta) => meta,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(err),
    };

    if meta.len() < MAX_LOG_BYTES {
        return Ok(());
    }

    let archived = log_dir.join(format!("{component}-{}.log", now_secs()));
    fs::rename(log_path, archived)?;
    prune_old_archives(log_dir, component)
}

fn prune_old_archives(log_dir: &Path, component: &str) -> Result<(), std::io::Error> {
    let prefix = format!("{component}-");
    let mut archives = fs::read_dir(log_dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(&prefix) && n.ends_with(".log"))
        })
        .collect::<Vec<_>>();

    archives.sort();
    while archives.len() > MAX_ARCHIVES {
        let oldest = archives.remove(0);
        let _ = fs::remove_file(oldest);
    }
    Ok(())
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn install_panic_hook() {
    let _ = PANIC_HOOK_INSTALLED.get_or_init(|| {
        let prior = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |panic_info| {
            let location = panic_info
                .location()
                .map(|l| format!("{}:{}", l.file(), l.line()))
                .unwrap_or_else(|| "unknown".to_string());
            let payload = panic_info
                .payload()
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| panic_info.payload().downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "panic payload unavailable".to_string());
            error!(target: "wlaunch::panic", "panic at {location}: {payload}");
            prior(panic_info);
        }));
    });
}

use anyhow::Context;
use handin_core::config::{MonitorConfig, StoreBackend};
use handin_core::io::ensure_dir;
use handin_core::monitor::Monitor;
use handin_core::notify::Mailer;
use handin_core::store::{LocalStore, RemoteStore, SubmissionStore};
use std::path::Path;
use tracing::{info, warn};

pub fn run(config_path: &Path) -> anyhow::Result<()> {
    info!("loading configuration from: {}", config_path.display());
    let config = MonitorConfig::load(config_path).context("failed to load configuration")?;
    for warning in config.validate() {
        warn!("{}", warning.message);
    }

    ensure_dir(&config.db_dir).context("unable to create ledger directory")?;
    ensure_dir(&config.log_dir).context("unable to create log directory")?;
    ensure_dir(&config.website.path).context("unable to create website directory")?;

    let notifier = Mailer::new(&config.course, &config.mail_domain);

    match config.store.clone() {
        StoreBackend::Local => run_pass(config, LocalStore, &notifier),
        StoreBackend::Remote {
            host,
            username,
            key_file,
        } => {
            info!("connecting to server: {username}@{host}");
            let store =
                RemoteStore::new(host, username, key_file).context("remote store setup failed")?;
            run_pass(config, store, &notifier)
        }
    }
}

fn run_pass<S: SubmissionStore>(
    config: MonitorConfig,
    store: S,
    notifier: &Mailer,
) -> anyhow::Result<()> {
    let mut monitor = Monitor::new(config, store, notifier);
    monitor.run().context("monitoring pass failed")?;
    Ok(())
}

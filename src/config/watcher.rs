//! Configuration file watcher for hot reload.
//!
//! A changed file is loaded, validated and run through an optional build
//! check before it is sent on. Anything rejected is reported here and the
//! running configuration stays in place.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::ProxyConfig;
use crate::error::ProxyResult;

type BuildCheck = Arc<dyn Fn(&ProxyConfig) -> ProxyResult<()> + Send + Sync>;

/// Watches the configuration file and forwards accepted updates.
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<ProxyConfig>,
    check: Option<BuildCheck>,
}

impl ConfigWatcher {
    /// Returns the watcher and a receiver for accepted configuration updates.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<ProxyConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                update_tx,
                check: None,
            },
            update_rx,
        )
    }

    /// Reject updates that validate but would not build.
    pub fn with_check(
        mut self,
        check: impl Fn(&ProxyConfig) -> ProxyResult<()> + Send + Sync + 'static,
    ) -> Self {
        self.check = Some(Arc::new(check));
        self
    }

    /// Load the file once and forward it if accepted. Returns whether it was sent.
    pub fn reload(&self) -> bool {
        reload(&self.path, self.check.as_ref(), &self.update_tx)
    }

    /// Start watching the file. The returned watcher must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let Self {
            path,
            update_tx,
            check,
        } = self;
        let watched = path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    tracing::info!(path = ?path, "Config file change detected, reloading");
                    reload(&path, check.as_ref(), &update_tx);
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = ?e, "Watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&watched, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?watched, "Config watcher started");
        Ok(watcher)
    }
}

fn reload(
    path: &Path,
    check: Option<&BuildCheck>,
    tx: &mpsc::UnboundedSender<ProxyConfig>,
) -> bool {
    let config = match load_config(path) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(path = ?path, error = %e, "Config reload rejected, keeping current configuration");
            return false;
        }
    };

    if let Some(check) = check {
        if let Err(e) = check(&config) {
            tracing::error!(path = ?path, error = %e, "Config does not build, keeping current configuration");
            return false;
        }
    }

    tx.send(config).is_ok()
}

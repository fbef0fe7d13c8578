use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use log::{error, info};
use rusqlite::Connection;
use tokio::sync::oneshot;

use super::migrations::run_migrations;

type DbTask = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum DbCommand {
    Execute(DbTask),
    Shutdown,
}

struct DatabaseInner {
    sender: mpsc::Sender<DbCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for DatabaseInner {
    fn drop(&mut self) {
        let mut guard = match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(handle) = guard.take() {
            if let Err(err) = self.sender.send(DbCommand::Shutdown) {
                error!("Failed to send shutdown to store thread: {err}");
            }
            if let Err(join_err) = handle.join() {
                error!("Failed to join store thread: {join_err:?}");
            }
        }
    }
}

/// Handle to the key/value store.
///
/// All statements run on one dedicated thread in submission order, so a task
/// passed to [`Database::execute`] sees and writes a consistent view.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
    db_path: Option<Arc<PathBuf>>,
}

impl Database {
    pub fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create store directory {}", parent.display())
            })?;
        }

        let path_for_thread = db_path.clone();
        let inner = Self::spawn_worker(move || {
            Connection::open(&path_for_thread).context("failed to open SQLite store")
        })?;

        info!("Store initialized at {}", db_path.display());

        Ok(Self {
            inner: Arc::new(inner),
            db_path: Some(Arc::new(db_path)),
        })
    }

    /// Private store that lives as long as the handle.
    pub fn in_memory() -> Result<Self> {
        let inner = Self::spawn_worker(|| {
            Connection::open_in_memory().context("failed to open in-memory SQLite store")
        })?;

        Ok(Self {
            inner: Arc::new(inner),
            db_path: None,
        })
    }

    fn spawn_worker<F>(open: F) -> Result<DatabaseInner>
    where
        F: FnOnce() -> Result<Connection> + Send + 'static,
    {
        let (command_tx, command_rx) = mpsc::channel::<DbCommand>();
        let (ready_tx, ready_rx) = mpsc::channel();

        let worker = thread::Builder::new()
            .name("tabtime-store".into())
            .spawn(move || {
                let mut conn = match open() {
                    Ok(connection) => connection,
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };

                if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
                    error!("Failed to enable WAL mode: {err}");
                }

                let init_result =
                    run_migrations(&mut conn).context("failed to run store migrations");
                if ready_tx.send(init_result).is_err() {
                    error!("Store initialization receiver dropped before ready signal");
                    return;
                }

                while let Ok(command) = command_rx.recv() {
                    match command {
                        DbCommand::Execute(task) => task(&mut conn),
                        DbCommand::Shutdown => break,
                    }
                }

                info!("Store thread shutting down");
            })
            .context("failed to spawn store worker thread")?;

        ready_rx
            .recv()
            .context("store worker exited before signaling readiness")??;

        Ok(DatabaseInner {
            sender: command_tx,
            worker: Mutex::new(Some(worker)),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref().map(PathBuf::as_path)
    }

    pub async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();

        let command = DbCommand::Execute(Box::new(move |conn| {
            let result = task(conn);
            if reply_tx.send(result).is_err() {
                error!("Store caller dropped before receiving result");
            }
        }));

        self.inner
            .sender
            .send(command)
            .map_err(|err| anyhow!("failed to send command to store thread: {err}"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("store thread terminated unexpectedly"))?
    }
}

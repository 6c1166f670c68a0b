use std::{
    path::Path,
    sync::Arc,
    time::{Duration, Instant},
};

use futures::future::join_all;
use tokio::{fs::File, sync::Semaphore};
use tokio_util::sync::CancellationToken;

use crate::{
    error::Error,
    storage::{BlobStore, PutBlob},
    upload::{
        content_type,
        report::{Printer, Report, UploadResult},
        task::UploadTask,
        walker,
    },
};

pub struct Dispatcher<S> {
    store: Arc<S>,
    container: String,
    overwrite: bool,
    concurrency: Option<usize>,
    timeout: Option<Duration>,
    shutdown: CancellationToken,
    printer: Printer,
}

impl<S: BlobStore + Send + Sync + 'static> Dispatcher<S> {
    pub fn new(store: S, container: impl Into<String>) -> Self {
        Self {
            store: Arc::new(store),
            container: container.into(),
            overwrite: true,
            concurrency: None,
            timeout: None,
            shutdown: CancellationToken::new(),
            printer: Printer::default(),
        }
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Bound the number of uploads in flight. Unbounded when `None`.
    pub fn concurrency(mut self, limit: Option<usize>) -> Self {
        self.concurrency = limit;
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn printer(mut self, printer: Printer) -> Self {
        self.printer = printer;
        self
    }

    #[cfg(test)]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Walk `root` and build one task per file. Any unreadable directory or
    /// unusable file name fails the whole plan.
    pub async fn plan(&self, root: &Path) -> Result<Vec<UploadTask>, Error> {
        let walked_root = root.to_owned();
        let container = self.container.clone();
        let overwrite = self.overwrite;
        tokio::task::spawn_blocking(move || -> Result<Vec<UploadTask>, Error> {
            walker::check_root(&walked_root)?;
            walker::walk(&walked_root)
                .map(|path| UploadTask::new(&walked_root, path?, &container, overwrite))
                .collect()
        })
        .await
        .map_err(|err| Error::DirectoryUnreadable {
            path: root.to_owned(),
            reason: err.to_string(),
        })?
    }

    /// Upload every file under `root` and wait for all of them to settle.
    pub async fn run(&self, root: &Path) -> Result<Report, Error> {
        let start = Instant::now();
        let tasks = self.plan(root).await?;
        log::info!("{} files to upload from {}", tasks.len(), root.display());
        let results = self.dispatch(tasks).await;
        Ok(Report {
            results,
            elapsed: start.elapsed(),
            interrupted: self.shutdown.is_cancelled(),
        })
    }

    /// Launch every task concurrently, then collect one result per task in the
    /// order the tasks were given.
    pub async fn dispatch(&self, tasks: Vec<UploadTask>) -> Vec<UploadResult> {
        let limiter = self
            .concurrency
            .map(|n| Arc::new(Semaphore::new(n.min(Semaphore::MAX_PERMITS))));
        let mut handles = Vec::with_capacity(tasks.len());
        let mut pending = Vec::with_capacity(tasks.len());
        for task in tasks {
            let identity = (task.destination_key.clone(), task.local_path.clone());
            if self.shutdown.is_cancelled() {
                pending.push((identity, None));
                continue;
            }

            let store = self.store.clone();
            let limiter = limiter.clone();
            let shutdown = self.shutdown.clone();
            let timeout = self.timeout;
            let printer = self.printer;
            handles.push(tokio::spawn(async move {
                let _permit = match limiter {
                    Some(limiter) => tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => return Err(Error::Cancelled),
                        permit = limiter.acquire_owned() => Some(permit.map_err(|_| Error::Cancelled)?),
                    },
                    None => None,
                };
                upload(store.as_ref(), &task, timeout, printer).await
            }));
            pending.push((identity, Some(handles.len() - 1)));
        }

        let mut outcomes = join_all(handles)
            .await
            .into_iter()
            .map(Some)
            .collect::<Vec<_>>();
        pending
            .into_iter()
            .map(|((destination_key, local_path), slot)| {
                let outcome = match slot.and_then(|i| outcomes[i].take()) {
                    Some(Ok(outcome)) => outcome,
                    Some(Err(err)) => Err(Error::UploadFailed {
                        key: destination_key.clone(),
                        reason: format!("upload task aborted: {}", err),
                    }),
                    None => Err(Error::Cancelled),
                };
                UploadResult {
                    destination_key,
                    local_path,
                    outcome,
                }
            })
            .collect()
    }
}

async fn upload<S: BlobStore + ?Sized>(
    store: &S,
    task: &UploadTask,
    timeout: Option<Duration>,
    printer: Printer,
) -> Result<u64, Error> {
    let content_type = content_type::guess(&task.local_path);
    let body = File::open(&task.local_path)
        .await
        .map_err(|source| Error::FileUnreadable {
            path: task.local_path.clone(),
            source,
        })?;
    let size = body
        .metadata()
        .await
        .map_err(|source| Error::FileUnreadable {
            path: task.local_path.clone(),
            source,
        })?
        .len();

    printer.uploading(&task.local_path, content_type.as_deref());
    let put = store.upload(PutBlob {
        container: &task.container,
        key: &task.destination_key,
        content_type: content_type.as_deref(),
        overwrite: task.overwrite,
        size,
        body,
    });
    match timeout {
        Some(after) => tokio::time::timeout(after, put)
            .await
            .map_err(|_| Error::Timeout {
                key: task.destination_key.clone(),
                after,
            })??,
        None => put.await?,
    }
    printer.uploaded(&task.local_path);
    log::debug!("{} uploaded ({} bytes)", task.destination_key, size);
    Ok(size)
}

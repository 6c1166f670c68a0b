use std::{
    future::{self, Future},
    io,
    time::Instant,
};

use crossterm::style::Stylize;
use tokio_util::sync::CancellationToken;

use crate::{
    options::Options,
    storage::AzureStore,
    upload::{Dispatcher, Printer},
};

mod credentials;
mod error;
mod misc;
mod options;
mod storage;
mod upload;

// Exit status when at least one upload failed or was cancelled.
const UPLOAD_FAILURE_CODE: i32 = 2;

/// Cancel `shutdown` on the first interrupt and resolve on the second one.
/// Never resolves if the signal source fails.
async fn second_interrupt<F, Fut>(mut interrupt: F, shutdown: CancellationToken)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<()>>,
{
    while interrupt().await.is_ok() {
        if shutdown.is_cancelled() {
            return;
        }
        log::warn!("interrupted, no new upload will be started");
        eprintln!("Interrupted: waiting for in-flight uploads to finish (Ctrl-C again to abort).");
        shutdown.cancel();
    }
    future::pending().await
}

async fn abort_on_interrupt(shutdown: CancellationToken) {
    second_interrupt(tokio::signal::ctrl_c, shutdown).await;
    eprintln!("{}", "Interrupted again: abandoning in-flight uploads.".red());
    std::process::exit(UPLOAD_FAILURE_CODE);
}

#[tokio::main]
async fn main() {
    let options = Options::parse();
    env_logger::Builder::new().filter_level(options.log_level()).init();
    if let Some(path) = options.config_path() {
        log::info!("configuration loaded from {}", path.display());
    }

    let start = Instant::now();
    if options.connection_string.is_none() {
        println!("Searching for credentials in {} ...", options.filename.display());
    }
    let connection = credentials::load(options.connection_string.as_deref(), &options.filename)
        .await
        .unwrap_or_else(|err| exit_error!("{}", err));
    let store = AzureStore::new(connection)
        .unwrap_or_else(|err| exit_error!("{}", err));

    let shutdown = CancellationToken::new();
    tokio::spawn(abort_on_interrupt(shutdown.clone()));

    let printer = Printer {
        quiet: options.quiet,
    };
    let dispatcher = Dispatcher::new(store, options.container.clone())
        .overwrite(options.overwrite())
        .concurrency(options.concurrency)
        .timeout(options.timeout())
        .shutdown(shutdown)
        .printer(printer);
    log::info!(
        "uploading {} to container {}",
        options.directory.display(),
        options.container
    );
    let mut report = dispatcher
        .run(&options.directory)
        .await
        .unwrap_or_else(|err| exit_error!("{}", err));

    report.elapsed = start.elapsed();
    printer.summary(&report);
    if !report.is_success() {
        std::process::exit(UPLOAD_FAILURE_CODE);
    }
}

use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use worker_logger::{Status, WaitableSignal, Worker, WorkerConfig};

const LINES: usize = 10;

fn main() -> ExitCode {
    let (writer, _guard) = tracing_appender::non_blocking(std::io::stdout());
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(writer)
        .with_thread_names(true)
        .init();

    let mut config = WorkerConfig::default();
    if let Some(path) = env::args().nth(1) {
        config = config.with_log_path(path);
    }

    let worker = match Worker::spawn(config) {
        Ok(worker) => worker,
        Err(err) => {
            error!(error = %err, "failed to start logger");
            return ExitCode::FAILURE;
        }
    };

    for i in 0..LINES {
        if let Err(err) = worker.write(format!("Log line {i}")) {
            error!(error = %err, "write failed");
            return ExitCode::FAILURE;
        }
    }

    // Any tick queued from here on flushes every line written above.
    let flushed = Arc::new(WaitableSignal::new());
    let signal = flushed.clone();
    worker.set_status_callback(move |status| {
        info!(%status, "logger status");
        if status == Status::FlushSuccess {
            signal.signal();
        }
    });

    let timings = worker.flush_observers().add(|elapsed| {
        info!(elapsed_us = elapsed.as_micros() as u64, "flush completed");
    });

    let deadline = worker.config().flush_interval * 2;
    let ok = flushed.wait(deadline);
    if !ok {
        error!(timeout_ms = deadline.as_millis() as u64, "no flush observed");
    }

    let pending = worker.invoke(|buffer| buffer.len(), Duration::from_millis(100));
    info!(?pending, path = %worker.config().log_path.display(), "done");

    worker.flush_observers().remove(timings);
    worker.clear_status_callback();
    worker.shutdown();

    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

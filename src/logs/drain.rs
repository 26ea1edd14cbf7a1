//! Drain task: copies one child pipe into its sink.
//!
//! The loop selects between the pipe and the sink's next time boundary, so
//! time-based rotation happens even while the child is silent. It ends on
//! EOF (pipe closed) or a read error, closing the sink either way.

use std::time::Duration;

use chrono::Local;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::events::{Event, EventKind};

use super::archive::ArchiveJob;
use super::{Reporter, StreamSink};

const READ_CHUNK: usize = 8 * 1024;

pub(crate) async fn drain<R>(mut pipe: R, mut sink: StreamSink)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        let boundary = sink
            .next_boundary()
            .map(|at| (at - Local::now()).to_std().unwrap_or(Duration::ZERO));

        tokio::select! {
            read = pipe.read(&mut buf) => match read {
                Ok(0) => break,
                Ok(n) => {
                    if let Some(job) = sink.write(&buf[..n], Local::now()) {
                        spawn_archive(job, sink.reporter().clone());
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        service = %sink.reporter().service(),
                        stream = %sink.stream(),
                        error = %e,
                        "pipe read failed"
                    );
                    break;
                }
            },
            _ = sleep_opt(boundary) => {
                if let Some(job) = sink.maybe_rotate(Local::now()) {
                    spawn_archive(job, sink.reporter().clone());
                }
            }
        }
    }
    sink.close();
}

async fn sleep_opt(wait: Option<Duration>) {
    match wait {
        Some(wait) => tokio::time::sleep(wait).await,
        None => std::future::pending().await,
    }
}

/// Runs archival on a blocking thread and reports each archive.
pub(crate) fn spawn_archive(job: ArchiveJob, reporter: Reporter) {
    tokio::spawn(async move {
        let stream = job.stream();
        let outcomes = match tokio::task::spawn_blocking(move || job.run()).await {
            Ok(outcomes) => outcomes,
            Err(e) => {
                tracing::warn!(service = %reporter.service(), %stream, error = %e, "archive task failed");
                return;
            }
        };

        for outcome in outcomes {
            match outcome.result {
                Ok(files) => {
                    tracing::info!(
                        service = %reporter.service(),
                        %stream,
                        archive = %outcome.archive.display(),
                        files,
                        "log files archived"
                    );
                    reporter.publish(
                        Event::new(EventKind::LogArchived)
                            .with_stream(stream)
                            .with_path(outcome.archive)
                            .with_reason(format!("files={files}")),
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        service = %reporter.service(),
                        %stream,
                        archive = %outcome.archive.display(),
                        error = %e,
                        "log archive failed"
                    );
                    reporter.publish(
                        Event::new(EventKind::LogWriteFailed)
                            .with_stream(stream)
                            .with_path(outcome.archive)
                            .with_reason(e.to_string()),
                    );
                }
            }
        }
    });
}

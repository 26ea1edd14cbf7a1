//! # Log rotation engine.
//!
//! Persists the child's two output streams into files, one [`RotationPolicy`]
//! for both. Each stream has its own sink; after a spawn the engine is split
//! and each sink moves into the drain task reading that stream's pipe.
//!
//! ```text
//! child stdout ──► drain(out) ──► StreamSink(out) ──► svc.out.log (+ rotated files)
//! child stderr ──► drain(err) ──► StreamSink(err) ──► svc.err.log (+ rotated files)
//!                                      │
//!                                      └─► ArchiveJob ──► spawn_blocking ──► *.zip
//! ```
//!
//! Only [`LogEngine::open`] reports errors to the caller. Everything on the
//! write path degrades to `tracing` warnings and `LogWriteFailed` events.
//!
//! [`RotationPolicy`]: crate::RotationPolicy

mod archive;
mod drain;
pub(crate) mod naming;
mod sink;

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Local};

use crate::config::LogConfig;
use crate::error::LogError;
use crate::events::{Bus, Event};

pub use archive::{ArchiveJob, ArchiveOutcome};
pub(crate) use drain::drain;
pub(crate) use sink::StreamSink;

use naming::LogPaths;

/// Output stream of the child.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stream {
    /// Standard output.
    Out,
    /// Standard error.
    Err,
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stream::Out => "stdout",
            Stream::Err => "stderr",
        })
    }
}

/// Publishes log events on behalf of one service.
#[derive(Clone, Debug)]
pub(crate) struct Reporter {
    bus: Option<Bus>,
    service: Arc<str>,
}

impl Reporter {
    pub(crate) fn new(bus: Bus, service: Arc<str>) -> Self {
        Self {
            bus: Some(bus),
            service,
        }
    }

    /// Reporter without a bus: events are dropped, tracing still applies.
    pub(crate) fn detached(service: &str) -> Self {
        Self {
            bus: None,
            service: Arc::from(service),
        }
    }

    pub(crate) fn service(&self) -> &str {
        &self.service
    }

    pub(crate) fn publish(&self, ev: Event) {
        if let Some(bus) = &self.bus {
            bus.publish(ev.with_service(Arc::clone(&self.service)));
        }
    }
}

/// The pair of stream sinks of one running child.
///
/// # Example
/// ```
/// use chrono::Local;
/// use servicevisor::{LogEngine, ServiceConfig, Stream};
///
/// let dir = std::env::temp_dir().join("servicevisor-doc-engine");
/// let cfg = ServiceConfig::new("demo", "app").with_log_directory(&dir);
///
/// let mut engine = LogEngine::open(&cfg.resolved_log(), Local::now()).unwrap();
/// engine.write(Stream::Out, b"hello\n", Local::now());
/// engine.close();
///
/// assert!(dir.join("demo.out.log").exists());
/// # std::fs::remove_dir_all(&dir).ok();
/// ```
#[derive(Debug)]
pub struct LogEngine {
    out: StreamSink,
    err: StreamSink,
}

impl LogEngine {
    /// Creates the log directory and opens both live files.
    ///
    /// Plain and size policies write to `<dir>/<name><pattern>`, dated policies
    /// to `<dir>/<name>.<date><pattern>`. `Reset` truncates; everything else
    /// appends. A disabled stream or the `None` policy opens nothing.
    pub fn open(log: &LogConfig, now: DateTime<Local>) -> Result<Self, LogError> {
        Self::open_reporting(log, now, Reporter::detached(&log.name))
    }

    pub(crate) fn open_reporting(
        log: &LogConfig,
        now: DateTime<Local>,
        reporter: Reporter,
    ) -> Result<Self, LogError> {
        let open = |stream: Stream, pattern: &str, disabled: bool| {
            if disabled {
                return Ok(StreamSink::discard(stream, reporter.clone()));
            }
            StreamSink::open(
                stream,
                LogPaths::new(&log.directory, log.name.as_str(), pattern),
                &log.policy,
                now,
                reporter.clone(),
            )
        };

        Ok(Self {
            out: open(Stream::Out, &log.out_pattern, log.out_disabled)?,
            err: open(Stream::Err, &log.err_pattern, log.err_disabled)?,
        })
    }

    /// Appends one record to `stream`; returns archival work to run off the write path.
    pub fn write(&mut self, stream: Stream, bytes: &[u8], now: DateTime<Local>) -> Option<ArchiveJob> {
        self.sink_mut(stream).write(bytes, now)
    }

    /// Applies time-driven rotation to both streams.
    pub fn maybe_rotate(&mut self, now: DateTime<Local>) -> Vec<ArchiveJob> {
        [self.out.maybe_rotate(now), self.err.maybe_rotate(now)]
            .into_iter()
            .flatten()
            .collect()
    }

    /// Current live file of `stream`, `None` when discarded or closed.
    pub fn live_path(&self, stream: Stream) -> Option<&Path> {
        match stream {
            Stream::Out => self.out.live_path(),
            Stream::Err => self.err.live_path(),
        }
    }

    /// Releases both handles. Idempotent; later writes are discarded.
    pub fn close(&mut self) {
        self.out.close();
        self.err.close();
    }

    pub(crate) fn into_sinks(self) -> (StreamSink, StreamSink) {
        (self.out, self.err)
    }

    fn sink_mut(&mut self, stream: Stream) -> &mut StreamSink {
        match stream {
            Stream::Out => &mut self.out,
            Stream::Err => &mut self.err,
        }
    }
}

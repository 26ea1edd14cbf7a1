//! # Per-stream log sink.
//!
//! A [`StreamSink`] owns one output stream's file handle and rotation state.
//! It is moved into that stream's drain task, so the two sinks of a child
//! never contend.
//!
//! ## Rollers
//! ```text
//! Append / Reset  never rotate (Reset truncates once, at open)
//! Size            written ≥ threshold ─► shift <base>.<n> generations, keep N
//! Time            now ≥ period end    ─► new live file named after the new period
//! SizeTime        now ≥ daily roll_at ─► live → <base>.<date>.<n>, new dated live,
//!                                        scan for archive candidates
//!                 written ≥ threshold ─► live → <base>.<date>.<n>
//! ```
//!
//! ## Failure handling
//! I/O errors never propagate past the sink: they are logged, published as
//! `LogWriteFailed`, the handle is dropped and reopened on the next write.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Days, Local, NaiveDate, NaiveTime};

use crate::error::LogError;
use crate::events::{Event, EventKind};
use crate::policies::RotationPolicy;

use super::archive::ArchiveJob;
use super::naming::{self, LogPaths};
use super::{Reporter, Stream};

/// Where a stream's bytes go.
#[derive(Debug)]
enum Target {
    Discard,
    File(FileSink),
}

#[derive(Debug)]
enum Roller {
    Never,
    Size {
        threshold: u64,
        keep: u32,
    },
    Time {
        fmt: String,
        period_days: u32,
        period_start: NaiveDate,
    },
    SizeTime {
        threshold: u64,
        fmt: String,
        roll_at: NaiveTime,
        zip: Option<ZipRule>,
    },
}

/// Rotation decided by `maybe_rotate`.
enum Due {
    Nothing,
    Generations(u32),
    DatedGeneration,
    Period,
    Daily,
}

#[derive(Debug)]
struct ZipRule {
    older_than: Duration,
    fmt: String,
}

#[derive(Debug)]
struct FileSink {
    paths: LogPaths,
    roller: Roller,
    live: PathBuf,
    live_date: String,
    file: Option<File>,
    written: u64,
    next_boundary: Option<DateTime<Local>>,
}

/// One stream's sink: discard, or a file with its rotation state.
#[derive(Debug)]
pub(crate) struct StreamSink {
    stream: Stream,
    target: Target,
    reporter: Reporter,
}

impl StreamSink {
    /// Sink that reads nothing to disk.
    pub(crate) fn discard(stream: Stream, reporter: Reporter) -> Self {
        Self {
            stream,
            target: Target::Discard,
            reporter,
        }
    }

    /// Resolves the live path, creates the directory and opens the file.
    pub(crate) fn open(
        stream: Stream,
        paths: LogPaths,
        policy: &RotationPolicy,
        now: DateTime<Local>,
        reporter: Reporter,
    ) -> Result<Self, LogError> {
        let roller = match policy {
            RotationPolicy::None => return Ok(Self::discard(stream, reporter)),
            RotationPolicy::Append | RotationPolicy::Reset => Roller::Never,
            RotationPolicy::RollBySize {
                size_threshold,
                files_to_keep,
            } => Roller::Size {
                threshold: *size_threshold,
                keep: *files_to_keep,
            },
            RotationPolicy::RollByTime {
                pattern,
                period_days,
            } => Roller::Time {
                fmt: date_format(pattern)?,
                period_days: (*period_days).max(1),
                period_start: now.date_naive(),
            },
            RotationPolicy::RollBySizeAndTime {
                size_threshold,
                pattern,
                roll_at,
                zip_older_than_days,
                zip_date_format,
            } => Roller::SizeTime {
                threshold: *size_threshold,
                fmt: date_format(pattern)?,
                roll_at: *roll_at,
                zip: match zip_older_than_days {
                    Some(days) => Some(ZipRule {
                        older_than: Duration::from_secs(u64::from(*days) * 86_400),
                        fmt: date_format(zip_date_format)?,
                    }),
                    None => None,
                },
            },
        };

        fs::create_dir_all(paths.dir()).map_err(|e| LogError::io(paths.dir(), e))?;

        let mut sink = FileSink {
            paths,
            roller,
            live: PathBuf::new(),
            live_date: String::new(),
            file: None,
            written: 0,
            next_boundary: None,
        };
        sink.select_live(now);
        if matches!(sink.roller, Roller::SizeTime { .. }) {
            sink.settle_stale_lives(stream, &reporter);
        }

        let file = open_file(&sink.live, matches!(policy, RotationPolicy::Reset))
            .map_err(|e| LogError::io(&sink.live, e))?;
        sink.written = file.metadata().map(|m| m.len()).unwrap_or(0);
        sink.file = Some(file);

        Ok(Self {
            stream,
            target: Target::File(sink),
            reporter,
        })
    }

    #[inline]
    pub(crate) fn stream(&self) -> Stream {
        self.stream
    }

    #[inline]
    pub(crate) fn reporter(&self) -> &Reporter {
        &self.reporter
    }

    /// Current live file, or `None` when output is discarded.
    pub(crate) fn live_path(&self) -> Option<&Path> {
        match &self.target {
            Target::File(f) => Some(&f.live),
            Target::Discard => None,
        }
    }

    /// Next time-driven rotation, if the policy has one.
    pub(crate) fn next_boundary(&self) -> Option<DateTime<Local>> {
        match &self.target {
            Target::File(f) => f.next_boundary,
            Target::Discard => None,
        }
    }

    /// Appends one record, then applies the rotation rule.
    pub(crate) fn write(&mut self, bytes: &[u8], now: DateTime<Local>) -> Option<ArchiveJob> {
        // A crossed time boundary rolls before the record lands in the old file.
        let pending = if self.next_boundary().is_some_and(|at| now >= at) {
            self.maybe_rotate(now)
        } else {
            None
        };

        let Target::File(sink) = &mut self.target else {
            return pending;
        };

        if sink.file.is_none() {
            match open_file(&sink.live, false) {
                Ok(file) => sink.file = Some(file),
                Err(e) => {
                    self.reporter.write_failed(self.stream, &sink.live, &e);
                    return pending;
                }
            }
        }

        if let Some(file) = sink.file.as_mut() {
            if let Err(e) = file.write_all(bytes) {
                sink.file = None;
                self.reporter.write_failed(self.stream, &sink.live, &e);
                return pending;
            }
            sink.written += bytes.len() as u64;
        }

        self.maybe_rotate(now).or(pending)
    }

    /// Rotates when the size threshold or a time boundary has been reached.
    pub(crate) fn maybe_rotate(&mut self, now: DateTime<Local>) -> Option<ArchiveJob> {
        let Target::File(sink) = &mut self.target else {
            return None;
        };
        let stream = self.stream;
        let reporter = &self.reporter;

        let time_due = sink.next_boundary.is_some_and(|at| now >= at);
        let due = match sink.roller {
            Roller::Never => Due::Nothing,
            Roller::Size { threshold, keep } if sink.written >= threshold => Due::Generations(keep),
            Roller::Time { .. } if time_due => Due::Period,
            Roller::SizeTime { .. } if time_due => Due::Daily,
            Roller::SizeTime { threshold, .. } if sink.written >= threshold => Due::DatedGeneration,
            _ => Due::Nothing,
        };

        match due {
            Due::Nothing => None,
            Due::Generations(keep) => {
                sink.file = None;
                let result = sink.shift_generations(keep);
                sink.after_roll(result, stream, reporter);
                None
            }
            Due::DatedGeneration => {
                sink.file = None;
                let result = sink.rename_to_free_generation(&sink.live, &sink.live_date);
                sink.after_roll(result, stream, reporter);
                None
            }
            Due::Period => {
                sink.roll_period(now, stream, reporter);
                None
            }
            Due::Daily => sink.roll_daily(now, stream, reporter),
        }
    }

    /// Releases the handle; later writes are discarded. Idempotent.
    pub(crate) fn close(&mut self) {
        if let Target::File(sink) = &mut self.target {
            if let Some(mut file) = sink.file.take() {
                if let Err(e) = file.flush() {
                    self.reporter.write_failed(self.stream, &sink.live, &e);
                }
            }
        }
        self.target = Target::Discard;
    }
}

impl FileSink {
    /// Picks the live file name and the next time boundary for `now`.
    fn select_live(&mut self, now: DateTime<Local>) {
        match &self.roller {
            Roller::Never | Roller::Size { .. } => {
                self.live = self.paths.live();
            }
            Roller::Time {
                fmt,
                period_days,
                period_start,
            } => {
                let start = local_at(*period_start, NaiveTime::MIN).unwrap_or(now);
                self.live_date = format_date(&start, fmt);
                self.live = self.paths.dated(&self.live_date);
                self.next_boundary = period_start
                    .checked_add_days(Days::new(u64::from(*period_days)))
                    .and_then(|end| local_at(end, NaiveTime::MIN));
            }
            Roller::SizeTime { fmt, roll_at, .. } => {
                self.live_date = format_date(&now, fmt);
                self.live = self.paths.dated(&self.live_date);
                self.next_boundary = next_daily(&now, *roll_at);
            }
        }
    }

    /// `roll-by-size`: live → `.1`, `.n` → `.n+1`, oldest beyond `keep` deleted.
    fn shift_generations(&self, keep: u32) -> io::Result<PathBuf> {
        if keep == 0 {
            remove_if_exists(&self.live)?;
            return Ok(self.live.clone());
        }
        remove_if_exists(&self.paths.numbered(keep))?;
        for n in (1..keep).rev() {
            let from = self.paths.numbered(n);
            if from.exists() {
                fs::rename(&from, self.paths.numbered(n + 1))?;
            }
        }
        let first = self.paths.numbered(1);
        fs::rename(&self.live, &first)?;
        Ok(first)
    }

    /// `roll-by-time`: a new live file for the period containing `now`.
    fn roll_period(&mut self, now: DateTime<Local>, stream: Stream, reporter: &Reporter) {
        let Roller::Time {
            period_days,
            period_start,
            ..
        } = &mut self.roller
        else {
            return;
        };
        let step = Days::new(u64::from(*period_days));
        while let Some(end) = period_start.checked_add_days(step) {
            match local_at(end, NaiveTime::MIN) {
                Some(at) if at <= now => *period_start = end,
                _ => break,
            }
        }

        let previous = self.live.clone();
        self.file = None;
        self.select_live(now);
        self.after_roll(Ok(previous), stream, reporter);
    }

    /// `roll-by-size-and-time` daily trigger.
    fn roll_daily(
        &mut self,
        now: DateTime<Local>,
        stream: Stream,
        reporter: &Reporter,
    ) -> Option<ArchiveJob> {
        self.file = None;
        if self.written > 0 {
            match self.rename_to_free_generation(&self.live, &self.live_date) {
                Ok(path) => reporter.publish(
                    Event::new(EventKind::LogRotated)
                        .with_stream(stream)
                        .with_path(path),
                ),
                Err(e) => reporter.write_failed(stream, &self.live, &e),
            }
        } else if let Err(e) = remove_if_exists(&self.live) {
            reporter.write_failed(stream, &self.live, &e);
        }

        self.select_live(now);
        self.reopen(stream, reporter);
        self.archive_candidates(now, stream, reporter)
    }

    /// Renames `from` to the first unused `<base>.<date>.<n><pattern>`.
    fn rename_to_free_generation(&self, from: &Path, date: &str) -> io::Result<PathBuf> {
        let mut n = 1;
        let target = loop {
            let candidate = self.paths.dated_numbered(date, n);
            if !candidate.exists() {
                break candidate;
            }
            n += 1;
        };
        fs::rename(from, &target)?;
        Ok(target)
    }

    /// Dated live files of other dates, left by an earlier run, become
    /// generations of their own date. Empty ones are removed.
    fn settle_stale_lives(&self, stream: Stream, reporter: &Reporter) {
        let Roller::SizeTime { fmt, .. } = &self.roller else {
            return;
        };
        let entries = match fs::read_dir(self.paths.dir()) {
            Ok(entries) => entries,
            Err(e) => {
                reporter.write_failed(stream, self.paths.dir(), &e);
                return;
            }
        };

        for entry in entries.flatten() {
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            let Some(date) = self.paths.dated_live_date(&file_name, fmt) else {
                continue;
            };
            if date == self.live_date {
                continue;
            }

            let path = entry.path();
            let empty = entry.metadata().map(|m| m.len() == 0).unwrap_or(false);
            if empty {
                if let Err(e) = remove_if_exists(&path) {
                    reporter.write_failed(stream, &path, &e);
                }
                continue;
            }
            match self.rename_to_free_generation(&path, date) {
                Ok(target) => reporter.publish(
                    Event::new(EventKind::LogRotated)
                        .with_stream(stream)
                        .with_path(target),
                ),
                Err(e) => reporter.write_failed(stream, &path, &e),
            }
        }
    }

    fn after_roll(&mut self, result: io::Result<PathBuf>, stream: Stream, reporter: &Reporter) {
        match result {
            Ok(path) => {
                tracing::debug!(%stream, path = %path.display(), "log rotated");
                reporter.publish(
                    Event::new(EventKind::LogRotated)
                        .with_stream(stream)
                        .with_path(path),
                );
            }
            Err(e) => reporter.write_failed(stream, &self.live, &e),
        }
        self.reopen(stream, reporter);
    }

    fn reopen(&mut self, stream: Stream, reporter: &Reporter) {
        match open_file(&self.live, false) {
            Ok(file) => {
                self.written = file.metadata().map(|m| m.len()).unwrap_or(0);
                self.file = Some(file);
            }
            Err(e) => {
                self.written = 0;
                reporter.write_failed(stream, &self.live, &e);
            }
        }
    }

    /// Rotated dated files older than the zip rule, grouped by archive.
    fn archive_candidates(
        &self,
        now: DateTime<Local>,
        stream: Stream,
        reporter: &Reporter,
    ) -> Option<ArchiveJob> {
        let Roller::SizeTime { zip: Some(rule), .. } = &self.roller else {
            return None;
        };

        let entries = match fs::read_dir(self.paths.dir()) {
            Ok(entries) => entries,
            Err(e) => {
                reporter.write_failed(stream, self.paths.dir(), &e);
                return None;
            }
        };

        let now = SystemTime::from(now);
        let mut groups: BTreeMap<PathBuf, Vec<PathBuf>> = BTreeMap::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path == self.live {
                continue;
            }
            let name = entry.file_name();
            if !self.paths.is_dated_generation(&name.to_string_lossy()) {
                continue;
            }
            let Ok(modified) = entry.metadata().and_then(|m| m.modified()) else {
                continue;
            };
            let age = now.duration_since(modified).unwrap_or_default();
            if age <= rule.older_than {
                continue;
            }
            let zip_date = format_date(&DateTime::<Local>::from(modified), &rule.fmt);
            groups
                .entry(self.paths.archive(&zip_date))
                .or_default()
                .push(path);
        }

        for files in groups.values_mut() {
            files.sort();
        }
        ArchiveJob::new(stream, groups.into_iter().collect())
    }
}

impl Reporter {
    fn write_failed(&self, stream: Stream, path: &Path, e: &io::Error) {
        tracing::warn!(
            service = %self.service(),
            %stream,
            path = %path.display(),
            error = %e,
            "log write failed"
        );
        self.publish(
            Event::new(EventKind::LogWriteFailed)
                .with_stream(stream)
                .with_path(path)
                .with_reason(e.to_string()),
        );
    }
}

fn open_file(path: &Path, truncate: bool) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.create(true);
    if truncate {
        options.write(true).truncate(true);
    } else {
        options.append(true);
    }
    options.open(path)
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

fn date_format(pattern: &str) -> Result<String, LogError> {
    Ok(naming::strftime(pattern)?)
}

fn format_date(at: &DateTime<Local>, fmt: &str) -> String {
    let mut out = String::new();
    if write!(out, "{}", at.format(fmt)).is_err() {
        out.clear();
        out.push_str(&at.format("%Y%m%d").to_string());
    }
    out
}

/// Local instant of `time` on `date`; an instant skipped by a DST change
/// resolves one hour later.
fn local_at(date: NaiveDate, time: NaiveTime) -> Option<DateTime<Local>> {
    let naive = date.and_time(time);
    naive
        .and_local_timezone(Local)
        .earliest()
        .or_else(|| {
            (naive + chrono::Duration::hours(1))
                .and_local_timezone(Local)
                .earliest()
        })
}

/// First local occurrence of `at` strictly after `now`.
fn next_daily(now: &DateTime<Local>, at: NaiveTime) -> Option<DateTime<Local>> {
    let today = now.date_naive();
    match local_at(today, at) {
        Some(candidate) if candidate > *now => Some(candidate),
        _ => local_at(today.succ_opt()?, at),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn files(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    fn size_sink(dir: &Path, threshold: u64, keep: u32) -> StreamSink {
        StreamSink::open(
            Stream::Out,
            LogPaths::new(dir, "svc", ".out.log"),
            &RotationPolicy::RollBySize {
                size_threshold: threshold,
                files_to_keep: keep,
            },
            Local::now(),
            Reporter::detached("svc"),
        )
        .unwrap()
    }

    #[test]
    fn test_size_rotation_once_for_2000_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = size_sink(dir.path(), 1024, 2);

        for _ in 0..20 {
            sink.write(&[b'x'; 100], Local::now());
        }

        assert_eq!(files(dir.path()), vec!["svc.1.out.log", "svc.out.log"]);
        assert_eq!(fs::metadata(dir.path().join("svc.1.out.log")).unwrap().len(), 1100);
        assert_eq!(fs::metadata(dir.path().join("svc.out.log")).unwrap().len(), 900);
    }

    #[test]
    fn test_size_rotation_keeps_newest_generations() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = size_sink(dir.path(), 1024, 2);

        for generation in [b'a', b'b', b'c'] {
            sink.write(&[generation; 1024], Local::now());
        }

        assert_eq!(
            files(dir.path()),
            vec!["svc.1.out.log", "svc.2.out.log", "svc.out.log"]
        );
        assert_eq!(fs::read(dir.path().join("svc.1.out.log")).unwrap()[0], b'c');
        assert_eq!(fs::read(dir.path().join("svc.2.out.log")).unwrap()[0], b'b');
        assert_eq!(fs::metadata(dir.path().join("svc.out.log")).unwrap().len(), 0);
    }

    #[test]
    fn test_size_counter_starts_from_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("svc.out.log"), vec![b'x'; 1000]).unwrap();

        let mut sink = size_sink(dir.path(), 1024, 2);
        sink.write(&[b'y'; 30], Local::now());

        assert!(dir.path().join("svc.1.out.log").exists());
    }

    #[test]
    fn test_record_is_never_split() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = size_sink(dir.path(), 10, 1);
        sink.write(b"a long record that crosses the threshold", Local::now());

        assert_eq!(
            fs::read_to_string(dir.path().join("svc.1.out.log")).unwrap(),
            "a long record that crosses the threshold"
        );
    }

    #[test]
    fn test_time_rotation_once_per_period() {
        let dir = tempfile::tempdir().unwrap();
        let t0 = at(2024, 6, 10, 12, 0);
        let mut sink = StreamSink::open(
            Stream::Out,
            LogPaths::new(dir.path(), "svc", ".out.log"),
            &RotationPolicy::RollByTime {
                pattern: "yyyyMMdd".into(),
                period_days: 1,
            },
            t0,
            Reporter::detached("svc"),
        )
        .unwrap();

        assert_eq!(sink.next_boundary(), Some(at(2024, 6, 11, 0, 0)));

        // Volume alone never rotates.
        for _ in 0..100 {
            sink.write(&[b'x'; 1024], at(2024, 6, 10, 18, 0));
        }
        assert_eq!(files(dir.path()), vec!["svc.20240610.out.log"]);

        sink.write(b"next day", at(2024, 6, 11, 0, 30));
        sink.write(b"day after", at(2024, 6, 12, 9, 0));
        assert_eq!(
            files(dir.path()),
            vec![
                "svc.20240610.out.log",
                "svc.20240611.out.log",
                "svc.20240612.out.log"
            ]
        );
        assert_eq!(
            fs::read_to_string(dir.path().join("svc.20240611.out.log")).unwrap(),
            "next day"
        );
    }

    #[test]
    fn test_time_rotation_multi_day_period() {
        let dir = tempfile::tempdir().unwrap();
        let t0 = at(2024, 6, 10, 12, 0);
        let mut sink = StreamSink::open(
            Stream::Out,
            LogPaths::new(dir.path(), "svc", ".out.log"),
            &RotationPolicy::RollByTime {
                pattern: "yyyyMMdd".into(),
                period_days: 3,
            },
            t0,
            Reporter::detached("svc"),
        )
        .unwrap();

        sink.write(b"a", at(2024, 6, 12, 23, 0));
        sink.write(b"b", at(2024, 6, 17, 1, 0));

        assert_eq!(
            files(dir.path()),
            vec!["svc.20240610.out.log", "svc.20240616.out.log"]
        );
        assert_eq!(sink.next_boundary(), Some(at(2024, 6, 19, 0, 0)));
    }

    #[test]
    fn test_size_and_time_rotation() {
        let dir = tempfile::tempdir().unwrap();
        let t0 = at(2024, 6, 10, 12, 0);
        let mut sink = StreamSink::open(
            Stream::Err,
            LogPaths::new(dir.path(), "svc", ".err.log"),
            &RotationPolicy::RollBySizeAndTime {
                size_threshold: 100,
                pattern: "yyyyMMdd".into(),
                roll_at: NaiveTime::from_hms_opt(3, 0, 0).unwrap(),
                zip_older_than_days: None,
                zip_date_format: "yyyyMM".into(),
            },
            t0,
            Reporter::detached("svc"),
        )
        .unwrap();
        assert_eq!(sink.next_boundary(), Some(at(2024, 6, 11, 3, 0)));

        sink.write(&[b'x'; 150], at(2024, 6, 10, 13, 0));
        sink.write(&[b'y'; 150], at(2024, 6, 10, 14, 0));
        sink.write(b"tail", at(2024, 6, 10, 15, 0));
        sink.write(b"new day", at(2024, 6, 11, 3, 30));

        assert_eq!(
            files(dir.path()),
            vec![
                "svc.20240610.1.err.log",
                "svc.20240610.2.err.log",
                "svc.20240610.3.err.log",
                "svc.20240611.err.log",
            ]
        );
        assert_eq!(
            fs::read_to_string(dir.path().join("svc.20240610.3.err.log")).unwrap(),
            "tail"
        );
    }

    #[test]
    fn test_daily_roll_collects_archive_candidates() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("svc.20240101.1.out.log"), b"old").unwrap();
        fs::write(dir.path().join("svc.20240101.1.err.log"), b"other stream").unwrap();

        let now = Local::now();
        let mut sink = StreamSink::open(
            Stream::Out,
            LogPaths::new(dir.path(), "svc", ".out.log"),
            &RotationPolicy::RollBySizeAndTime {
                size_threshold: 1024,
                pattern: "yyyyMMdd".into(),
                roll_at: NaiveTime::MIN,
                zip_older_than_days: Some(2),
                zip_date_format: "yyyyMM".into(),
            },
            now,
            Reporter::detached("svc"),
        )
        .unwrap();

        let later = now + chrono::Duration::days(5);
        let job = sink.maybe_rotate(later).expect("archive job");

        assert_eq!(job.stream(), Stream::Out);
        let groups = job.groups();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].1, vec![dir.path().join("svc.20240101.1.out.log")]);
    }

    fn size_time(dir: &Path, threshold: u64, pattern: &str, zip: Option<u32>, now: DateTime<Local>) -> StreamSink {
        StreamSink::open(
            Stream::Out,
            LogPaths::new(dir, "svc", ".out.log"),
            &RotationPolicy::RollBySizeAndTime {
                size_threshold: threshold,
                pattern: pattern.into(),
                roll_at: NaiveTime::MIN,
                zip_older_than_days: zip,
                zip_date_format: "yyyyMM".into(),
            },
            now,
            Reporter::detached("svc"),
        )
        .unwrap()
    }

    #[test]
    fn test_earlier_dated_live_files_become_generations() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("svc.20240101.out.log"), b"left over").unwrap();
        fs::write(dir.path().join("svc.20240101.1.out.log"), b"rotated").unwrap();
        fs::write(dir.path().join("svc.20240102.out.log"), b"").unwrap();
        fs::write(dir.path().join("svc.20240102.err.log"), b"other stream").unwrap();

        let _sink = size_time(dir.path(), 1024, "yyyyMMdd", None, at(2024, 6, 10, 12, 0));

        assert_eq!(
            files(dir.path()),
            vec![
                "svc.20240101.1.out.log",
                "svc.20240101.2.out.log",
                "svc.20240102.err.log",
                "svc.20240610.out.log",
            ]
        );
        assert_eq!(
            fs::read_to_string(dir.path().join("svc.20240101.2.out.log")).unwrap(),
            "left over"
        );
    }

    #[test]
    fn test_silent_day_leaves_no_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = size_time(dir.path(), 1024, "yyyyMMdd", None, at(2024, 6, 10, 12, 0));

        assert!(sink.maybe_rotate(at(2024, 6, 11, 0, 30)).is_none());
        assert_eq!(files(dir.path()), vec!["svc.20240611.out.log"]);
    }

    #[test]
    fn test_reused_generation_is_archived_without_loss() {
        let dir = tempfile::tempdir().unwrap();
        let t0 = Local::now();
        // A pattern without date tokens keeps the same generation names every day.
        let mut sink = size_time(dir.path(), 5, "logs", Some(0), t0);
        let gen1 = dir.path().join("svc.logs.1.out.log");

        sink.write(b"FIRST", t0);
        assert!(gen1.exists());
        let job = sink.maybe_rotate(t0 + chrono::Duration::days(1)).expect("first archive");
        let archive = job.groups()[0].0.clone();
        assert!(job.run().iter().all(|o| o.result.is_ok()));
        assert!(!gen1.exists());

        sink.write(b"SECOND", t0 + chrono::Duration::days(1));
        assert!(gen1.exists());
        let job = sink.maybe_rotate(t0 + chrono::Duration::days(2)).expect("second archive");
        assert!(job.run().iter().all(|o| o.result.is_ok()));
        assert!(!gen1.exists());

        let mut zip = zip::ZipArchive::new(File::open(&archive).unwrap()).unwrap();
        let mut contents: Vec<String> = (0..zip.len())
            .map(|i| {
                let mut s = String::new();
                io::Read::read_to_string(&mut zip.by_index(i).unwrap(), &mut s).unwrap();
                s
            })
            .collect();
        contents.sort();
        assert_eq!(contents, vec!["FIRST", "SECOND"]);
    }

    #[test]
    fn test_reset_truncates_and_append_keeps() {
        let dir = tempfile::tempdir().unwrap();
        let live = dir.path().join("svc.out.log");
        fs::write(&live, b"previous run\n").unwrap();

        let open = |policy: RotationPolicy| {
            StreamSink::open(
                Stream::Out,
                LogPaths::new(dir.path(), "svc", ".out.log"),
                &policy,
                Local::now(),
                Reporter::detached("svc"),
            )
            .unwrap()
        };

        let mut sink = open(RotationPolicy::Append);
        sink.write(b"second run\n", Local::now());
        sink.close();
        assert_eq!(fs::read_to_string(&live).unwrap(), "previous run\nsecond run\n");

        let mut sink = open(RotationPolicy::Reset);
        sink.write(b"third run\n", Local::now());
        sink.close();
        assert_eq!(fs::read_to_string(&live).unwrap(), "third run\n");
    }

    #[test]
    fn test_close_is_idempotent_and_discards_later_writes() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = size_sink(dir.path(), 1024, 2);
        sink.write(b"kept", Local::now());
        sink.close();
        sink.close();
        assert!(sink.write(b"dropped", Local::now()).is_none());
        assert!(sink.live_path().is_none());
        assert_eq!(
            fs::read_to_string(dir.path().join("svc.out.log")).unwrap(),
            "kept"
        );
    }

    #[test]
    fn test_none_policy_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = StreamSink::open(
            Stream::Out,
            LogPaths::new(dir.path().join("logs"), "svc", ".out.log"),
            &RotationPolicy::None,
            Local::now(),
            Reporter::detached("svc"),
        )
        .unwrap();
        sink.write(b"gone", Local::now());
        assert!(!dir.path().join("logs").exists());
    }

    #[test]
    fn test_open_fails_on_inaccessible_directory() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, b"").unwrap();

        let err = StreamSink::open(
            Stream::Out,
            LogPaths::new(blocker.join("logs"), "svc", ".out.log"),
            &RotationPolicy::Append,
            Local::now(),
            Reporter::detached("svc"),
        )
        .unwrap_err();
        assert_eq!(err.as_label(), "log_io");
    }
}

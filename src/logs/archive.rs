//! Compression of old rotated files.
//!
//! An [`ArchiveJob`] is computed on the write path (directory scan only) and
//! executed off it, inside `spawn_blocking`. Originals are removed only after
//! the archive has been written completely. Every file becomes its own entry:
//! a name already present in the archive gets a `~<n>` suffix.

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::LogError;

use super::Stream;

/// Rotated files of one stream grouped by destination archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveJob {
    stream: Stream,
    groups: Vec<(PathBuf, Vec<PathBuf>)>,
}

/// Result of archiving one group.
#[derive(Debug)]
pub struct ArchiveOutcome {
    /// Destination archive.
    pub archive: PathBuf,
    /// Number of files moved into the archive.
    pub result: Result<usize, LogError>,
}

impl ArchiveJob {
    pub(crate) fn new(stream: Stream, groups: Vec<(PathBuf, Vec<PathBuf>)>) -> Option<Self> {
        if groups.iter().all(|(_, files)| files.is_empty()) {
            return None;
        }
        Some(Self { stream, groups })
    }

    /// Stream whose files are archived.
    pub fn stream(&self) -> Stream {
        self.stream
    }

    /// Destination archives and the files each receives.
    pub fn groups(&self) -> &[(PathBuf, Vec<PathBuf>)] {
        &self.groups
    }

    /// Writes every archive, then deletes the originals of each successful one.
    ///
    /// Blocking; run it on a blocking thread.
    pub fn run(self) -> Vec<ArchiveOutcome> {
        self.groups
            .into_iter()
            .filter(|(_, files)| !files.is_empty())
            .map(|(archive, files)| {
                let result = append_files(&archive, &files)
                    .map_err(|e| LogError::io(&archive, e))
                    .map(|()| {
                        for file in &files {
                            if let Err(e) = fs::remove_file(file) {
                                tracing::warn!(path = %file.display(), error = %e, "archived log file not removed");
                            }
                        }
                        files.len()
                    });
                ArchiveOutcome { archive, result }
            })
            .collect()
    }
}

fn append_files(archive: &Path, files: &[PathBuf]) -> io::Result<()> {
    let (mut writer, mut existing) = if archive.exists() {
        let file = OpenOptions::new().read(true).write(true).open(archive)?;
        let existing: HashSet<String> = ZipArchive::new(&file)
            .map_err(zip_error)?
            .file_names()
            .map(str::to_string)
            .collect();
        (ZipWriter::new_append(file).map_err(zip_error)?, existing)
    } else {
        (ZipWriter::new(File::create(archive)?), HashSet::new())
    };

    for path in files {
        let name = entry_name(path, &existing)?;
        let options =
            SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        writer.start_file(name.as_str(), options).map_err(zip_error)?;
        let mut src = File::open(path)?;
        io::copy(&mut src, &mut writer)?;
        existing.insert(name);
    }

    writer.finish().map_err(zip_error)?;
    Ok(())
}

/// File name of `path`, suffixed with `~<n>` when the archive already holds
/// an entry of that name (generation numbers are reused once archived).
fn entry_name(path: &Path, existing: &HashSet<String>) -> io::Result<String> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "log path has no file name"))?;
    if !existing.contains(&name) {
        return Ok(name);
    }
    let mut n = 2u32;
    loop {
        let candidate = format!("{name}~{n}");
        if !existing.contains(&candidate) {
            return Ok(candidate);
        }
        n += 1;
    }
}

fn zip_error(e: zip::result::ZipError) -> io::Error {
    io::Error::new(io::ErrorKind::Other, e)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_archives_and_removes_originals() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("svc.20240101.1.out.log");
        let b = dir.path().join("svc.20240102.1.out.log");
        fs::write(&a, b"first").unwrap();
        fs::write(&b, b"second").unwrap();
        let zip_path = dir.path().join("svc.202401.out.log.zip");

        let job = ArchiveJob::new(Stream::Out, vec![(zip_path.clone(), vec![a.clone()])]).unwrap();
        let outcomes = job.run();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].result.as_ref().unwrap(), &1);

        // Appending a second file keeps the first entry.
        let job = ArchiveJob::new(Stream::Out, vec![(zip_path.clone(), vec![b.clone()])]).unwrap();
        assert!(job.run()[0].result.is_ok());

        assert!(!a.exists());
        assert!(!b.exists());

        let mut zip = ZipArchive::new(File::open(&zip_path).unwrap()).unwrap();
        assert_eq!(zip.len(), 2);
        let mut content = String::new();
        zip.by_name("svc.20240102.1.out.log")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "second");
    }

    #[test]
    fn test_failure_keeps_originals() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("svc.20240101.1.out.log");
        fs::write(&a, b"data").unwrap();
        let zip_path = dir.path().join("missing-dir").join("svc.202401.out.log.zip");

        let job = ArchiveJob::new(Stream::Out, vec![(zip_path, vec![a.clone()])]).unwrap();
        assert!(job.run()[0].result.is_err());
        assert!(a.exists());
    }

    #[test]
    fn test_reused_file_name_gets_its_own_entry() {
        let dir = tempfile::tempdir().unwrap();
        let gen1 = dir.path().join("svc.20240101.1.out.log");
        let zip_path = dir.path().join("svc.202401.out.log.zip");

        for content in ["first", "second", "third"] {
            fs::write(&gen1, content).unwrap();
            let job = ArchiveJob::new(Stream::Out, vec![(zip_path.clone(), vec![gen1.clone()])]).unwrap();
            assert_eq!(job.run()[0].result.as_ref().unwrap(), &1);
            assert!(!gen1.exists());
        }

        let mut zip = ZipArchive::new(File::open(&zip_path).unwrap()).unwrap();
        assert_eq!(zip.len(), 3);
        for (entry, expected) in [
            ("svc.20240101.1.out.log", "first"),
            ("svc.20240101.1.out.log~2", "second"),
            ("svc.20240101.1.out.log~3", "third"),
        ] {
            let mut content = String::new();
            zip.by_name(entry).unwrap().read_to_string(&mut content).unwrap();
            assert_eq!(content, expected);
        }
    }

    #[test]
    fn test_empty_job_is_none() {
        assert!(ArchiveJob::new(Stream::Err, Vec::new()).is_none());
    }
}

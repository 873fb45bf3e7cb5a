//! Output sinks for reconstructed files.
//!
//! The decoder never touches the filesystem directly.  It asks an
//! [`OutputSink`] to open one handle per extracted file, appends bytes to it
//! and hands it back on close.  At most one handle is open at a time.
//!
//! * [`FsSink`]     — writes files below an output directory.
//! * [`MemorySink`] — keeps files in memory and counts handle traffic.

use std::fs::{self, File, FileTimes};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use crate::options::ExtractOptions;
use crate::timestamp::VmsTime;

/// Everything a sink needs to create one output file.
#[derive(Debug, Clone, Copy)]
pub struct OpenRequest<'a> {
    /// Full OpenVMS file specification, e.g. `[DIR.SUB]NAME.EXT;3`.
    pub name:     &'a str,
    pub created:  VmsTime,
    pub modified: VmsTime,
}

pub trait OutputSink {
    type Handle;

    fn open(&mut self, request: &OpenRequest<'_>) -> io::Result<Self::Handle>;
    fn write(&mut self, handle: &mut Self::Handle, data: &[u8]) -> io::Result<()>;
    /// Release the handle.  Recorded timestamps are applied here.
    fn close(&mut self, handle: Self::Handle) -> io::Result<()>;
}

impl<S: OutputSink + ?Sized> OutputSink for &mut S {
    type Handle = S::Handle;

    fn open(&mut self, request: &OpenRequest<'_>) -> io::Result<Self::Handle> {
        (**self).open(request)
    }

    fn write(&mut self, handle: &mut Self::Handle, data: &[u8]) -> io::Result<()> {
        (**self).write(handle, data)
    }

    fn close(&mut self, handle: Self::Handle) -> io::Result<()> {
        (**self).close(handle)
    }
}

// ── Name mapping ─────────────────────────────────────────────────────────────

/// Split `[A.B]NAME.EXT;V` into its directory stack and file part.
pub fn split_vms_path(spec: &str) -> (Vec<&str>, &str) {
    match (spec.find('['), spec.find(']')) {
        (Some(open), Some(close)) if open < close => {
            let dirs = spec[open + 1..close].split('.').filter(|d| !d.is_empty()).collect();
            (dirs, &spec[close + 1..])
        }
        _ => (Vec::new(), spec),
    }
}

/// Drop the `;V` suffix, if any.
pub fn strip_version(name: &str) -> &str {
    name.split_once(';').map_or(name, |(base, _)| base)
}

/// Map one path component onto the portable filename set plus `;` and `$`.
/// Anything else becomes `_`; a component made only of dots is defused.
pub fn sanitize_component(component: &str) -> String {
    let cleaned: String = component
        .chars()
        .map(|c| match c {
            'A'..='Z' | 'a'..='z' | '0'..='9' | '.' | '_' | '-' | ';' | '$' => c,
            _ => '_',
        })
        .collect();
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        "_".repeat(cleaned.len().max(1))
    } else {
        cleaned
    }
}

// ── Filesystem sink ──────────────────────────────────────────────────────────

/// Writes extracted files below `root`.
#[derive(Debug, Clone)]
pub struct FsSink {
    root:            PathBuf,
    with_folders:    bool,
    with_version:    bool,
    with_timestamps: bool,
}

pub struct FsHandle {
    writer:   BufWriter<File>,
    path:     PathBuf,
    modified: Option<SystemTime>,
}

impl FsSink {
    pub fn new<P: Into<PathBuf>>(root: P, options: &ExtractOptions) -> Self {
        Self {
            root:            root.into(),
            with_folders:    options.with_folders,
            with_version:    options.with_version,
            with_timestamps: options.with_timestamps,
        }
    }

    /// Host path an OpenVMS specification is written to.
    pub fn target_path(&self, spec: &str) -> PathBuf {
        let (dirs, file) = split_vms_path(spec);
        let file = if self.with_version { file } else { strip_version(file) };
        let mut path = self.root.clone();
        if self.with_folders {
            path.extend(dirs.iter().map(|d| sanitize_component(d)));
        }
        path.push(sanitize_component(file));
        path
    }
}

fn system_time(t: VmsTime) -> Option<SystemTime> {
    let secs = t.to_datetime()?.timestamp();
    if secs >= 0 {
        SystemTime::UNIX_EPOCH.checked_add(Duration::from_secs(secs.unsigned_abs()))
    } else {
        SystemTime::UNIX_EPOCH.checked_sub(Duration::from_secs(secs.unsigned_abs()))
    }
}

impl OutputSink for FsSink {
    type Handle = FsHandle;

    fn open(&mut self, request: &OpenRequest<'_>) -> io::Result<FsHandle> {
        let path = self.target_path(request.name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(&path)?;
        let modified = if self.with_timestamps { system_time(request.modified) } else { None };
        Ok(FsHandle { writer: BufWriter::new(file), path, modified })
    }

    fn write(&mut self, handle: &mut FsHandle, data: &[u8]) -> io::Result<()> {
        handle.writer.write_all(data)
    }

    fn close(&mut self, handle: FsHandle) -> io::Result<()> {
        let FsHandle { writer, path, modified } = handle;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        if let Some(when) = modified {
            file.set_times(FileTimes::new().set_modified(when).set_accessed(when))?;
            tracing::trace!(path = %path.display(), "applied revision date");
        }
        Ok(())
    }
}

// ── In-memory sink ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryFile {
    pub name:     String,
    pub data:     Vec<u8>,
    pub created:  VmsTime,
    pub modified: VmsTime,
}

/// Collects extracted files in memory.  Also records how many handles were
/// opened and closed, and the most that were ever open at once.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub files:    Vec<MemoryFile>,
    pub opens:    usize,
    pub closes:   usize,
    pub max_open: usize,
    open_now:     usize,
}

#[derive(Debug)]
pub struct MemoryHandle {
    index: usize,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handles currently open.
    pub fn open_now(&self) -> usize {
        self.open_now
    }

    /// Contents of the most recently opened file called `name`.
    pub fn file(&self, name: &str) -> Option<&[u8]> {
        self.files.iter().rev().find(|f| f.name == name).map(|f| f.data.as_slice())
    }
}

impl OutputSink for MemorySink {
    type Handle = MemoryHandle;

    fn open(&mut self, request: &OpenRequest<'_>) -> io::Result<MemoryHandle> {
        self.opens += 1;
        self.open_now += 1;
        self.max_open = self.max_open.max(self.open_now);
        self.files.push(MemoryFile {
            name:     request.name.to_string(),
            data:     Vec::new(),
            created:  request.created,
            modified: request.modified,
        });
        Ok(MemoryHandle { index: self.files.len() - 1 })
    }

    fn write(&mut self, handle: &mut MemoryHandle, data: &[u8]) -> io::Result<()> {
        match self.files.get_mut(handle.index) {
            Some(f) => {
                f.data.extend_from_slice(data);
                Ok(())
            }
            None => Err(io::Error::new(io::ErrorKind::NotFound, "stale memory handle")),
        }
    }

    fn close(&mut self, _handle: MemoryHandle) -> io::Result<()> {
        self.closes += 1;
        self.open_now = self.open_now.saturating_sub(1);
        Ok(())
    }
}

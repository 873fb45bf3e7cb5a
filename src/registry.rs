//! Per-file bookkeeping across passes.
//!
//! The registry answers one question for every File record: is this file a
//! target?  It tracks the highest version seen for each base name (the
//! specification without `;V`) and owns one [`ExtractionTarget`] per full
//! specification.  Version knowledge persists across passes; reconstruction
//! state is reset before each pass, except the content mode resolved by
//! sniffing.

use std::collections::HashMap;

use globset::{GlobBuilder, GlobMatcher};

use crate::header::{FileAttributes, RecordFormat};
use crate::options::{ExtractMode, ExtractOptions, OptionsError, VersionSelector};
use crate::vbn::text::TextState;

/// Split `NAME;V` into base name and version.  A missing or unreadable
/// version is 0.
pub fn split_version(spec: &str) -> (&str, i32) {
    match spec.split_once(';') {
        Some((base, ver)) => {
            let version = ver.trim().parse().unwrap_or_else(|_| {
                tracing::debug!(spec, "unreadable version suffix, using 0");
                0
            });
            (base, version)
        }
        None => (spec, 0),
    }
}

/// OpenVMS directory brackets would read as character classes, and braces
/// as alternations; neither means anything in a VMS name.
fn remap_brackets(s: &str) -> String {
    s.replace('[', "<").replace(']', ">")
}

fn compile_mask(mask: &str) -> Result<GlobMatcher, OptionsError> {
    let pattern = remap_brackets(mask).replace('{', "[{]").replace('}', "[}]");
    GlobBuilder::new(&pattern)
        .case_insensitive(true)
        .backslash_escape(false)
        .build()
        .map(|g| g.compile_matcher())
        .map_err(|_| OptionsError::InvalidMask(mask.to_string()))
}

// ── Continuation state ───────────────────────────────────────────────────────

/// Where a variable-length record stream stopped at the end of a payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Continuation {
    /// Bytes at the head of the next payload that belong to no record data
    /// (alignment pad, spilled VFC control bytes).
    pub pending_start:  usize,
    /// Record data still owed by the record in flight.
    pub pending_length: u64,
    /// A record is in flight; its terminator has not been emitted.
    pub in_record:      bool,
    /// Low byte of a length word split across payloads.
    pub split_prefix:   Option<u8>,
}

// ── ExtractionTarget ─────────────────────────────────────────────────────────

/// One file of the save set, keyed by its full specification.
#[derive(Debug)]
pub struct ExtractionTarget<H> {
    pub name:         String,
    pub version:      i32,
    pub is_target:    bool,
    pub file_size:    u64,
    pub format:       RecordFormat,
    /// Content mode; `Smart` until sniffing or opening resolves it.
    pub mode:         ExtractMode,
    /// On-disk bytes of the file consumed so far in this pass.
    pub file_pointer: u64,
    /// Skip further VBN data for the rest of the pass.
    pub ignore_vbn:   bool,
    pub continuation: Continuation,
    /// Offset of the next payload within this file's VBN stream.
    pub stream_offset: u64,
    pub text:         TextState,
    pub handle:       Option<H>,
}

impl<H> ExtractionTarget<H> {
    pub(crate) fn new(name: String, version: i32, attrs: &FileAttributes, mode: ExtractMode) -> Self {
        Self {
            name,
            version,
            is_target:     false,
            file_size:     attrs.file_size_bytes(),
            format:        attrs.record_format(),
            mode,
            file_pointer:  0,
            ignore_vbn:    false,
            continuation:  Continuation::default(),
            stream_offset: 0,
            text:          TextState::default(),
            handle:        None,
        }
    }

    /// Forget everything learned while walking the VBN stream.  The resolved
    /// content mode survives.
    pub fn reset_stream(&mut self) {
        self.file_pointer = 0;
        self.ignore_vbn = false;
        self.continuation = Continuation::default();
        self.stream_offset = 0;
        self.text = TextState::default();
    }

    pub fn is_complete(&self) -> bool {
        self.file_pointer == self.file_size
    }
}

// ── Registry ─────────────────────────────────────────────────────────────────

/// Outcome of registering one File record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDecision {
    /// Full specification; the key of the target.
    pub key:       String,
    pub version:   i32,
    /// The base name matched the extraction mask.
    pub matched:   bool,
    /// The version is selected as well.
    pub is_target: bool,
}

pub struct ExtractionRegistry<H> {
    matcher:  GlobMatcher,
    selector: VersionSelector,
    mode:     ExtractMode,
    versions: HashMap<String, i32>,
    targets:  HashMap<String, ExtractionTarget<H>>,
}

impl<H> ExtractionRegistry<H> {
    pub fn new(options: &ExtractOptions) -> Result<Self, OptionsError> {
        Ok(Self {
            matcher:  compile_mask(&options.mask)?,
            selector: options.version,
            mode:     options.mode,
            versions: HashMap::new(),
            targets:  HashMap::new(),
        })
    }

    /// Whether `base` (a specification without version) matches the mask.
    pub fn matches(&self, base: &str) -> bool {
        self.matcher.is_match(remap_brackets(base))
    }

    /// Record a File record and decide whether it is a target.  The
    /// decision uses the highest version seen so far, so it is provisional
    /// until a full traversal has completed.
    pub fn register_file(&mut self, attrs: &FileAttributes) -> TargetDecision {
        let key = attrs.filename();
        let (base, version) = split_version(&key);
        let matched = self.matches(base);

        let is_target = matched && {
            let highest = self.versions.entry(base.to_string()).or_insert(version);
            *highest = (*highest).max(version);
            self.selector.selects(version, *highest)
        };

        let mode = self.mode;
        let target = self
            .targets
            .entry(key.clone())
            .or_insert_with(|| ExtractionTarget::new(key.clone(), version, attrs, mode));
        target.is_target = is_target;

        TargetDecision { key, version, matched, is_target }
    }

    pub fn highest_version(&self, base: &str) -> Option<i32> {
        self.versions.get(base).copied()
    }

    pub fn target(&self, key: &str) -> Option<&ExtractionTarget<H>> {
        self.targets.get(key)
    }

    pub fn target_mut(&mut self, key: &str) -> Option<&mut ExtractionTarget<H>> {
        self.targets.get_mut(key)
    }

    pub fn targets(&self) -> impl Iterator<Item = &ExtractionTarget<H>> {
        self.targets.values()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Prepare every target for a new traversal.  Handles must already be
    /// closed; any left over are dropped.
    pub fn reset_for_pass(&mut self) {
        for target in self.targets.values_mut() {
            if target.handle.take().is_some() {
                tracing::debug!(name = %target.name, "dropping handle left open across passes");
            }
            target.reset_stream();
        }
    }
}

//! Run configuration.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// What is printed per matched file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputType {
    Suppress,
    #[default]
    Brief,
    Full,
    Csv,
}

/// How file content is interpreted on extraction.
///
/// * `Smart`  — classify each file as ASCII or binary by sniffing it first.
/// * `Ascii`  — normalise line terminators to the host convention.
/// * `Binary` — copy data, stripping variable-record length fields only.
/// * `Raw`    — copy data with no interpretation at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtractMode {
    #[default]
    Smart,
    Ascii,
    Binary,
    Raw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum DebugLevel {
    #[default]
    None,
    Basic,
    Enhanced,
}

/// Which versions of a matching file are selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionSelector {
    /// Every version (`;*`).
    All,
    /// Exactly this version (`;5`).
    Exact(u32),
    /// Offset from the latest version: `0` latest, `-1` the one before, ...
    Relative(i32),
}

impl Default for VersionSelector {
    fn default() -> Self {
        VersionSelector::Relative(0)
    }
}

impl VersionSelector {
    /// Whether `version` of a file whose highest known version is `highest`
    /// is selected.
    pub fn selects(self, version: i32, highest: i32) -> bool {
        match self {
            VersionSelector::All          => true,
            VersionSelector::Exact(v)     => i64::from(v) == i64::from(version),
            VersionSelector::Relative(r)  => i64::from(highest) + i64::from(r) == i64::from(version),
        }
    }

    /// Only a relative selection depends on versions seen later in the save set.
    pub fn needs_full_scan(self) -> bool {
        matches!(self, VersionSelector::Relative(_))
    }
}

impl fmt::Display for VersionSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionSelector::All         => f.write_str("*"),
            VersionSelector::Exact(v)    => write!(f, "{v}"),
            VersionSelector::Relative(r) => write!(f, "{r}"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OptionsError {
    #[error("invalid version selector '{0}'")]
    InvalidVersion(String),
    #[error("invalid mask '{0}'")]
    InvalidMask(String),
}

impl FromStr for VersionSelector {
    type Err = OptionsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == "*" {
            return Ok(VersionSelector::All);
        }
        let v: i64 = s.parse().map_err(|_| OptionsError::InvalidVersion(s.to_string()))?;
        if v > 0 {
            u32::try_from(v)
                .map(VersionSelector::Exact)
                .map_err(|_| OptionsError::InvalidVersion(s.to_string()))
        } else {
            i32::try_from(v)
                .map(VersionSelector::Relative)
                .map_err(|_| OptionsError::InvalidVersion(s.to_string()))
        }
    }
}

/// Default extraction mask.
pub const DEFAULT_MASK: &str = "*.*";

/// Configuration for [`crate::controller::SaveSetReader`].
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub output:          OutputType,
    pub extract:         bool,
    pub mode:            ExtractMode,
    /// Glob over the file specification without its version.
    pub mask:            String,
    pub version:         VersionSelector,
    /// Recreate the `[A.B]` directory stack below the output root.
    pub with_folders:    bool,
    /// Keep `;N` in extracted file names.
    pub with_version:    bool,
    /// Apply the recorded revision date to extracted files.
    pub with_timestamps: bool,
    /// Load the whole save set into memory before decoding.
    pub ram_cache:       bool,
    pub debug:           DebugLevel,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            output:          OutputType::Brief,
            extract:         true,
            mode:            ExtractMode::Smart,
            mask:            DEFAULT_MASK.to_string(),
            version:         VersionSelector::default(),
            with_folders:    false,
            with_version:    false,
            with_timestamps: false,
            ram_cache:       false,
            debug:           DebugLevel::None,
        }
    }
}

impl ExtractOptions {
    /// Apply a `NAME` or `NAME;VER` mask.  On error the options are left
    /// unchanged.
    pub fn set_mask(&mut self, mask: &str) -> Result<(), OptionsError> {
        let mut parts = mask.split(';');
        let name = parts.next().unwrap_or_default();
        match (parts.next(), parts.next()) {
            (None, _) => {
                self.mask = name.to_string();
            }
            (Some(ver), None) => {
                self.version = ver.parse()?;
                self.mask = name.to_string();
            }
            (Some(_), Some(_)) => return Err(OptionsError::InvalidMask(mask.to_string())),
        }
        Ok(())
    }

    /// A second traversal is needed when content must be sniffed before any
    /// byte is written, or when "latest" is only known after a full scan.
    pub fn needs_two_passes(&self) -> bool {
        (self.extract && self.mode == ExtractMode::Smart) || self.version.needs_full_scan()
    }
}

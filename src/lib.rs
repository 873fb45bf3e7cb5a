pub mod error;
pub mod header;
pub mod timestamp;
pub mod options;
pub mod source;
pub mod sink;
pub mod registry;
pub mod vbn;
pub mod walker;
pub mod controller;
pub mod listing;

pub use error::BackupError;
pub use header::{BlockHeader, FileAttributes, RecordFormat, RecordHeader, RecordType};
pub use options::{DebugLevel, ExtractMode, ExtractOptions, OutputType, VersionSelector};
pub use source::{open_path, ByteSource, StreamSource};
pub use sink::{FsSink, MemorySink, OutputSink};
pub use controller::{Pass, RunSummary, SaveSetReader};
pub use listing::FileEntry;
pub use timestamp::VmsTime;

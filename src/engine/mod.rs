pub mod committer;
pub mod file_source;
pub mod mapper;
pub mod types;

pub use committer::{CheckpointCommitter, RecordCommitter};
pub use file_source::{JsonLinesSource, SourceBatch};
pub use mapper::{DestinationMapper, IdentityMapper, PrefixMapper};
pub use types::*;

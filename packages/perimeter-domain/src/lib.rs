pub mod chunk;
pub mod perimeter;
pub mod record;
pub mod scope;
pub mod status;

mod error;

pub use chunk::{ChunkRecord, EmbeddedChunk, ScoredChunk};
pub use error::{Error, Result};
pub use perimeter::Perimeter;
pub use record::{Document, Job, NewDocument, SharedGroup};
pub use scope::{ChunkFilter, RetrievalScope};
pub use status::{DocumentStatus, JobStatus, JobType};

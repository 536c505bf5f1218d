//! Chapter pipeline built from external collaborators

pub mod chapter;
pub mod collaborators;
pub mod discovery;
pub mod writer;

pub use chapter::ChapterPipeline;
pub use collaborators::{ChapterOutcome, FetchedChapter, Fetcher, Transformer, Writer};
pub use discovery::FetcherDiscovery;
pub use writer::FileWriter;

pub mod domain;
pub mod index;
pub mod ports;
pub mod retrieval;
pub mod splitter;

pub use domain::{AuthSession, ChatAnswer, Chunk, ChunkMetadata, IngestReport, PageText, UserAccount};
pub use index::{IndexError, ScoredChunk, VectorIndex};
pub use ports::{AccountStore, EmbeddingService, PdfTextExtractor, PortError, PortResult,
    QuestionAnsweringService};
pub use retrieval::{RetrievalQa, SearchParams};
pub use splitter::RecursiveCharacterSplitter;

pub mod accounts;
pub mod embeddings;
pub mod pdf;
pub mod qa_llm;

pub use accounts::JsonAccountStore;
pub use embeddings::OpenAiEmbeddingAdapter;
pub use pdf::LopdfExtractor;
pub use qa_llm::OpenAiQaAdapter;

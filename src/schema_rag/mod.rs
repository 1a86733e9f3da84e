pub mod embedder;
pub mod index;
pub mod retriever;
pub mod semantics;
pub mod vector_store;

pub use embedder::*;
pub use index::*;
pub use retriever::*;
pub use semantics::*;
pub use vector_store::*;

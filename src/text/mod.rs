pub mod segments;
pub mod sentences;

pub use segments::segment;
pub use sentences::{SentenceDecoder, split_sentences};

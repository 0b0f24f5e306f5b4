pub mod accumulator;
pub mod decoder;
pub mod repair;
pub mod session;
pub mod sse;

pub use accumulator::{Completion, ContentAccumulator};
pub use decoder::{DecodedChunk, decode_line, decode_stream};
pub use session::{SessionStatus, StreamSession};
pub use sse::SseLineBuffer;

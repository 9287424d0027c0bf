pub mod session;
pub mod source;

pub use session::{SessionOptions, SessionReport, SessionRunner};
pub use source::{FileSource, InlineSource, MessageBatch, MessageSource};

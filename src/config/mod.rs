pub mod settings;

pub use settings::{Config, InputSource, ParityConfig};

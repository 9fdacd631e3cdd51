mod options;
mod runtime;

pub use options::{EngineOptions, RenderMode};
pub use runtime::RuntimeConfig;

pub mod caps;
pub mod config;
pub mod diag;
pub mod error;
pub mod format;
pub mod handle;
pub mod logging;
pub mod sync;

pub use caps::DeviceCaps;
pub use config::EngineConfig;
pub use diag::{Diagnostic, DiagnosticSeverity, DiagnosticSink};
pub use error::CoreError;
pub use format::{Format, FormatInfo, IndexType};
pub use handle::{Handle, HandleAllocator, ResourceType};
pub use sync::{AccessFlags, PipelineStages};

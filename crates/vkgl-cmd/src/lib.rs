pub mod command_buffer;
pub mod mapped;
pub mod opcode;
pub mod queue;

pub use command_buffer::{
    CommandBuffer, CommandBufferInheritance, CommandBufferLevel, CommandBufferUsage,
};
pub use opcode::{ClearTarget, Opcode, TargetClear};
pub use queue::{Queue, SubmitError, SubmitInfo};

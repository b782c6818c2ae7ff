//! Mapped-buffer synchronization registry.
//!
//! One entry per distinct buffer identity whose upload opcode sits in the
//! command list. Each entry holds the buffer's shared liveness flag;
//! destroying the buffer retracts the opcode at the next purge so replay
//! never synchronizes against a freed identity.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;
use vkgl_core::handle::Handle;

use crate::opcode::Opcode;

pub struct MappedBufferEntry {
    pub buffer: Handle,
    /// Index of the buffer's upload opcode in the command list
    pub opcode_index: usize,
    alive: Arc<AtomicBool>,
}

impl MappedBufferEntry {
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub fn liveness(&self) -> Arc<AtomicBool> {
        self.alive.clone()
    }
}

#[derive(Default)]
pub struct MappedBufferRegistry {
    entries: Vec<MappedBufferEntry>,
}

impl MappedBufferRegistry {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn contains(&self, buffer: Handle) -> bool {
        self.entries.iter().any(|e| e.buffer == buffer)
    }

    pub fn register(&mut self, buffer: Handle, opcode_index: usize, alive: Arc<AtomicBool>) {
        self.entries.push(MappedBufferEntry {
            buffer,
            opcode_index,
            alive,
        });
    }

    pub fn entries(&self) -> &[MappedBufferEntry] {
        &self.entries
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Retract the upload opcodes of entries whose buffer has been
    /// destroyed. Removing an opcode shifts every later entry's index down
    /// by one.
    pub fn purge(&mut self, ops: &mut Vec<Opcode>) {
        let mut i = 0;
        while i < self.entries.len() {
            if self.entries[i].is_alive() {
                i += 1;
                continue;
            }
            let entry = self.entries.remove(i);
            debug!(buffer = ?entry.buffer, "retracting sync opcode for destroyed buffer");
            ops.remove(entry.opcode_index);
            for later in &mut self.entries {
                if later.opcode_index > entry.opcode_index {
                    later.opcode_index -= 1;
                }
            }
        }
    }

    /// Inline another registry's entries, rebasing their opcode indices by
    /// `offset` (secondary command-buffer concatenation).
    pub fn append_rebased(&mut self, other: &MappedBufferRegistry, offset: usize) {
        for entry in &other.entries {
            self.entries.push(MappedBufferEntry {
                buffer: entry.buffer,
                opcode_index: entry.opcode_index + offset,
                alive: entry.liveness(),
            });
        }
    }
}

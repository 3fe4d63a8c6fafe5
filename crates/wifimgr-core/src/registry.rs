//! Command sender registry.
//!
//! One slot per [`CommandId`]. A command may only run while its slot is set;
//! handlers open and close slots as their role changes state, so the set of
//! registered commands always mirrors what the device can currently do.
//!
//! The registry has no lock of its own. It lives inside the manager core and
//! is only touched while the core lock is held.

use crate::command::CommandId;

/// Commands registered when the manager starts.
pub const DEFAULT_COMMANDS: [CommandId; 8] = [
    CommandId::SetStaConfig,
    CommandId::SetApConfig,
    CommandId::GetStaConfig,
    CommandId::GetApConfig,
    CommandId::GetStaStatus,
    CommandId::GetApStatus,
    CommandId::OpenSta,
    CommandId::OpenAp,
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRegistry {
    slots: [bool; CommandId::COUNT],
}

impl Default for CommandRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.reset();
        registry
    }
}

impl CommandRegistry {
    /// Registry with the start-up command set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every slot cleared.
    pub fn empty() -> Self {
        Self {
            slots: [false; CommandId::COUNT],
        }
    }

    /// Open the slot for `id`. Registering twice is harmless.
    pub fn register(&mut self, id: CommandId) {
        if !self.slots[id.slot()] {
            tracing::trace!(command = %id, "command registered");
        }
        self.slots[id.slot()] = true;
    }

    /// Close the slot for `id`.
    pub fn unregister(&mut self, id: CommandId) {
        if self.slots[id.slot()] {
            tracing::trace!(command = %id, "command unregistered");
        }
        self.slots[id.slot()] = false;
    }

    pub fn register_all(&mut self, ids: &[CommandId]) {
        for &id in ids {
            self.register(id);
        }
    }

    pub fn unregister_all(&mut self, ids: &[CommandId]) {
        for &id in ids {
            self.unregister(id);
        }
    }

    pub fn is_registered(&self, id: CommandId) -> bool {
        self.slots[id.slot()]
    }

    /// Registered commands in slot order.
    pub fn registered(&self) -> Vec<CommandId> {
        CommandId::ALL
            .into_iter()
            .filter(|id| self.slots[id.slot()])
            .collect()
    }

    /// Return to the start-up command set.
    pub fn reset(&mut self) {
        self.clear();
        self.register_all(&DEFAULT_COMMANDS);
    }

    pub fn clear(&mut self) {
        self.slots = [false; CommandId::COUNT];
    }
}

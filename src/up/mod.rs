use std::sync::atomic::{AtomicU32, Ordering};

pub(crate) mod pinentry;
pub(crate) mod prompt;

pub use self::pinentry::PinentryPresence;
pub use self::prompt::PresencePrompt;
pub(crate) use self::prompt::{authenticate_prompt, register_prompt};

/// Source of the "touch" a token waits for before answering.
///
/// Answers immediately: `false` means the user has not (yet) confirmed and
/// the token reports presence-required, leaving the retry to the caller.
pub trait PresenceCheck: Send + Sync {
    fn confirm(&self, prompt: &PresencePrompt) -> bool;
}

/// Every request is treated as touched.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysPresent;

impl PresenceCheck for AlwaysPresent {
    fn confirm(&self, _prompt: &PresencePrompt) -> bool {
        true
    }
}

/// Reports absence for the first `n` requests, then presence.
#[derive(Debug)]
pub struct AbsentFor {
    remaining: AtomicU32,
}

impl AbsentFor {
    pub fn new(n: u32) -> Self {
        Self {
            remaining: AtomicU32::new(n),
        }
    }

    pub fn remaining(&self) -> u32 {
        self.remaining.load(Ordering::SeqCst)
    }
}

impl PresenceCheck for AbsentFor {
    fn confirm(&self, _prompt: &PresencePrompt) -> bool {
        self.remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_err()
    }
}

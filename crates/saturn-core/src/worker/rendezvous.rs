use parking_lot::{Condvar, Mutex};

#[derive(Default)]
struct Flags {
    /// The processing thread is (about to be) waiting.
    armed: bool,
    /// A release arrived for the armed wait.
    released: bool,
}

/// One-shot handshake between the processing thread and the controller.
///
/// Uses its own lock, independent of the worker state lock. A release that
/// arrives while nothing is armed is discarded, so stray releases cannot
/// satisfy a later wait.
#[derive(Default)]
pub(crate) struct Rendezvous {
    flags: Mutex<Flags>,
    cond: Condvar,
}

impl Rendezvous {
    /// Prepare for a wait. Releases from now on are kept.
    pub fn arm(&self) {
        let mut flags = self.flags.lock();
        flags.armed = true;
        flags.released = false;
    }

    /// Release an armed wait. Returns `false` if nothing was armed.
    pub fn release(&self) -> bool {
        let mut flags = self.flags.lock();
        if !flags.armed {
            return false;
        }
        flags.released = true;
        self.cond.notify_all();
        true
    }

    /// Block until released, then disarm.
    pub fn wait(&self) {
        let mut flags = self.flags.lock();
        while !flags.released {
            self.cond.wait(&mut flags);
        }
        flags.armed = false;
        flags.released = false;
    }

    pub fn disarm(&self) {
        let mut flags = self.flags.lock();
        flags.armed = false;
        flags.released = false;
    }

    #[cfg(test)]
    pub fn is_armed(&self) -> bool {
        self.flags.lock().armed
    }
}

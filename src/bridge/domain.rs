use std::cell::Cell;
use std::fmt;

/// Which runtime currently owns the call stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    Host,
    Interpreter,
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Domain::Host => write!(f, "host"),
            Domain::Interpreter => write!(f, "interpreter"),
        }
    }
}

#[derive(Debug)]
pub struct DomainTracker {
    current: Cell<Domain>,
    transitions: Cell<u64>,
}

impl Default for DomainTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl DomainTracker {
    pub fn new() -> Self {
        Self {
            current: Cell::new(Domain::Host),
            transitions: Cell::new(0),
        }
    }

    pub fn get(&self) -> Domain {
        self.current.get()
    }

    pub fn set_domain(&self, new: Domain) -> Domain {
        self.transitions.set(self.transitions.get() + 1);
        self.current.replace(new)
    }

    /// Switches to `new` until the returned guard is restored or dropped.
    pub fn enter(&self, new: Domain) -> DomainGuard<'_> {
        let saved = self.set_domain(new);
        DomainGuard {
            tracker: self,
            entered: new,
            saved,
            restored: false,
        }
    }

    pub fn transitions(&self) -> u64 {
        self.transitions.get()
    }
}

/// Puts the previous domain back on every exit path.
#[must_use = "dropping the guard immediately restores the previous domain"]
pub struct DomainGuard<'a> {
    tracker: &'a DomainTracker,
    entered: Domain,
    saved: Domain,
    restored: bool,
}

impl DomainGuard<'_> {
    pub fn entered(&self) -> Domain {
        self.entered
    }

    /// Restores the saved domain and returns the one that was current on exit.
    pub fn restore(mut self) -> Domain {
        self.restored = true;
        self.tracker.set_domain(self.saved)
    }
}

impl Drop for DomainGuard<'_> {
    fn drop(&mut self) {
        if !self.restored {
            self.tracker.set_domain(self.saved);
        }
    }
}

use std::collections::HashMap;

use tracing::debug;

use crate::{
    bridge::error::BridgeError,
    cache::function::FuncHandle,
    host::{CallbackId, RegionId, SiteId},
    runtime::{leak_detector, vm::Thread},
};

/// Cached state of one call site.
#[derive(Debug)]
pub struct Activation {
    pub func: Option<FuncHandle>,
    /// Region whose release destroys this activation.
    pub site_region: RegionId,
    thread: ThreadSlot,
    /// Reset callback registered on the result-set scope while a thread is active.
    reset: Option<(RegionId, CallbackId)>,
}

/// Where a set-returning call's thread currently is.
#[derive(Debug, Default)]
enum ThreadSlot {
    #[default]
    Empty,
    Parked(Box<Thread>),
    /// Checked out by a resume that is running right now.
    Running,
}

impl Activation {
    pub fn has_thread(&self) -> bool {
        !matches!(self.thread, ThreadSlot::Empty)
    }

    pub fn thread(&self) -> Option<&Thread> {
        match &self.thread {
            ThreadSlot::Parked(thread) => Some(thread),
            _ => None,
        }
    }

    pub fn thread_running(&self) -> bool {
        matches!(self.thread, ThreadSlot::Running)
    }

    pub fn reset_registration(&self) -> Option<(RegionId, CallbackId)> {
        self.reset
    }
}

#[derive(Debug, Default)]
pub struct ActivationTable {
    acts: HashMap<SiteId, Activation>,
}

impl ActivationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, site: SiteId) -> Option<&Activation> {
        self.acts.get(&site)
    }

    pub fn contains(&self, site: SiteId) -> bool {
        self.acts.contains_key(&site)
    }

    pub fn len(&self) -> usize {
        self.acts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.acts.is_empty()
    }

    pub fn function(&self, site: SiteId) -> Option<FuncHandle> {
        self.acts.get(&site).and_then(|act| act.func)
    }

    /// Creates an empty activation for `site`. Returns `true` if it is new,
    /// in which case the caller registers its destroy callback.
    pub fn get_or_create(&mut self, site: SiteId, site_region: RegionId) -> bool {
        if self.acts.contains_key(&site) {
            return false;
        }
        self.acts.insert(
            site,
            Activation {
                func: None,
                site_region,
                thread: ThreadSlot::Empty,
                reset: None,
            },
        );
        leak_detector::record_activation();
        true
    }

    /// Points the activation at `func`, returning the previous binding.
    ///
    /// Rebinding while a thread is active would change the function under
    /// live frames, so it is refused.
    pub fn set_function(
        &mut self,
        site: SiteId,
        func: FuncHandle,
    ) -> Result<Option<FuncHandle>, BridgeError> {
        let act = self.acts.get_mut(&site).ok_or_else(|| {
            BridgeError::ProtocolViolation(format!("no activation for call site {}", site.0))
        })?;
        if act.func == Some(func) {
            return Ok(None);
        }
        if act.has_thread() {
            return Err(BridgeError::ProtocolViolation(format!(
                "rebinding call site {} while its thread is active",
                site.0
            )));
        }
        Ok(act.func.replace(func))
    }

    /// Attaches a freshly started thread and its reset registration.
    pub fn activate_thread(&mut self, site: SiteId, thread: Thread, reset: (RegionId, CallbackId)) {
        if let Some(act) = self.acts.get_mut(&site) {
            act.thread = ThreadSlot::Parked(Box::new(thread));
            act.reset = Some(reset);
        }
    }

    /// Checks the parked thread out for a resume.
    pub fn take_thread(&mut self, site: SiteId) -> Option<Box<Thread>> {
        let act = self.acts.get_mut(&site)?;
        match std::mem::replace(&mut act.thread, ThreadSlot::Running) {
            ThreadSlot::Parked(thread) => Some(thread),
            other => {
                act.thread = other;
                None
            }
        }
    }

    /// Parks a thread after a resume, unless the activation was reset or
    /// destroyed meanwhile.
    pub fn park_thread(&mut self, site: SiteId, thread: Box<Thread>) -> bool {
        match self.acts.get_mut(&site) {
            Some(act) if act.thread_running() => {
                act.thread = ThreadSlot::Parked(thread);
                true
            }
            _ => false,
        }
    }

    /// Forgets the thread. Returns the reset registration to unregister.
    pub fn deactivate(&mut self, site: SiteId) -> Option<(RegionId, CallbackId)> {
        let act = self.acts.get_mut(&site)?;
        act.thread = ThreadSlot::Empty;
        act.reset.take()
    }

    /// The result-set scope ended: drop the thread, keep the binding.
    pub fn reset(&mut self, site: SiteId) {
        if let Some(act) = self.acts.get_mut(&site) {
            debug!(site = site.0, "resetting activation");
            act.thread = ThreadSlot::Empty;
            act.reset = None;
        }
    }

    /// Removes the activation, returning the function it referenced.
    pub fn destroy(&mut self, site: SiteId) -> Option<Activation> {
        let act = self.acts.remove(&site)?;
        debug!(site = site.0, "destroying activation");
        leak_detector::record_activation_destroyed();
        Some(act)
    }

    pub fn sites(&self) -> Vec<SiteId> {
        let mut sites: Vec<_> = self.acts.keys().copied().collect();
        sites.sort();
        sites
    }
}

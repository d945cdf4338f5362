use std::fmt;

use thiserror::Error;

use crate::cache::function::FuncHandle;
use crate::host::Principal;

/// Stable handle to a region in the [`RegionTree`].
///
/// Ids are never reused, so a handle to a released region stays invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionId(pub(crate) u32);

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "region#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(u32);

/// Identifies one call site's cached state (the host's per-call-site extra slot).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SiteId(pub u32);

/// Work queued on a region, run by the engine when the region is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeCallback {
    /// The call site's region went away: drop its activation entirely.
    DestroyActivation { principal: Principal, site: SiteId },
    /// The expression scope ended: forget the activation's running thread.
    ResetActivation { principal: Principal, site: SiteId },
    /// The compiled function's own region went away.
    DropFunction {
        principal: Principal,
        handle: FuncHandle,
    },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegionError {
    #[error("{0} does not exist or was already released")]
    NotFound(RegionId),
    #[error("cannot release the top-level region")]
    Root,
    #[error("{region} would exceed its {cap} byte limit")]
    CapExceeded { region: RegionId, cap: usize },
    #[error("cannot make {0} a child of its own descendant")]
    Cycle(RegionId),
}

#[derive(Debug)]
struct RegionEntry {
    name: String,
    parent: Option<RegionId>,
    children: Vec<RegionId>,
    callbacks: Vec<(CallbackId, ScopeCallback)>,
    cap: Option<usize>,
    used: usize,
}

/// Hierarchical lifetime scopes owned by the host.
///
/// Releasing a region releases its whole subtree. Callbacks run children
/// first, and within one region in reverse registration order. Each callback
/// is handed out exactly once, because releasing removes it.
pub struct RegionTree {
    entries: Vec<Option<RegionEntry>>,
    current: RegionId,
    next_callback: u32,
    total_released: usize,
}

impl Default for RegionTree {
    fn default() -> Self {
        Self::new()
    }
}

impl RegionTree {
    pub fn new() -> Self {
        let top = RegionEntry {
            name: "TopRegion".to_string(),
            parent: None,
            children: Vec::new(),
            callbacks: Vec::new(),
            cap: None,
            used: 0,
        };
        Self {
            entries: vec![Some(top)],
            current: RegionId(0),
            next_callback: 0,
            total_released: 0,
        }
    }

    pub fn root(&self) -> RegionId {
        RegionId(0)
    }

    pub fn current(&self) -> RegionId {
        self.current
    }

    /// Makes `id` the current region and returns the previous one.
    pub fn switch_to(&mut self, id: RegionId) -> RegionId {
        std::mem::replace(&mut self.current, id)
    }

    pub fn create(&mut self, name: &str, parent: RegionId) -> Result<RegionId, RegionError> {
        self.create_entry(name, parent, None)
    }

    /// Creates a region whose reservations may never exceed `cap` bytes.
    pub fn create_capped(
        &mut self,
        name: &str,
        parent: RegionId,
        cap: usize,
    ) -> Result<RegionId, RegionError> {
        self.create_entry(name, parent, Some(cap))
    }

    fn create_entry(
        &mut self,
        name: &str,
        parent: RegionId,
        cap: Option<usize>,
    ) -> Result<RegionId, RegionError> {
        let id = RegionId(self.entries.len() as u32);
        self.entry_mut(parent)?.children.push(id);
        self.entries.push(Some(RegionEntry {
            name: name.to_string(),
            parent: Some(parent),
            children: Vec::new(),
            callbacks: Vec::new(),
            cap,
            used: 0,
        }));
        Ok(id)
    }

    pub fn is_live(&self, id: RegionId) -> bool {
        self.entry(id).is_ok()
    }

    pub fn name(&self, id: RegionId) -> Result<&str, RegionError> {
        Ok(self.entry(id)?.name.as_str())
    }

    pub fn parent(&self, id: RegionId) -> Result<Option<RegionId>, RegionError> {
        Ok(self.entry(id)?.parent)
    }

    pub fn children(&self, id: RegionId) -> Result<&[RegionId], RegionError> {
        Ok(&self.entry(id)?.children)
    }

    pub fn live_count(&self) -> usize {
        self.entries.iter().filter(|entry| entry.is_some()).count()
    }

    pub fn total_released(&self) -> usize {
        self.total_released
    }

    pub fn set_parent(&mut self, id: RegionId, new_parent: RegionId) -> Result<(), RegionError> {
        if id == self.root() {
            return Err(RegionError::Root);
        }
        self.entry(new_parent)?;
        let mut cursor = Some(new_parent);
        while let Some(ancestor) = cursor {
            if ancestor == id {
                return Err(RegionError::Cycle(id));
            }
            cursor = self.entry(ancestor)?.parent;
        }

        let old_parent = self.entry(id)?.parent;
        if let Some(old) = old_parent {
            self.entry_mut(old)?.children.retain(|child| *child != id);
        }
        self.entry_mut(new_parent)?.children.push(id);
        self.entry_mut(id)?.parent = Some(new_parent);
        Ok(())
    }

    pub fn register_callback(
        &mut self,
        id: RegionId,
        callback: ScopeCallback,
    ) -> Result<CallbackId, RegionError> {
        let callback_id = CallbackId(self.next_callback);
        self.entry_mut(id)?.callbacks.push((callback_id, callback));
        self.next_callback += 1;
        Ok(callback_id)
    }

    /// Returns `false` when the callback was not registered on `id`.
    pub fn unregister_callback(
        &mut self,
        id: RegionId,
        callback: CallbackId,
    ) -> Result<bool, RegionError> {
        let callbacks = &mut self.entry_mut(id)?.callbacks;
        let before = callbacks.len();
        callbacks.retain(|(registered, _)| *registered != callback);
        Ok(callbacks.len() != before)
    }

    pub fn pending_callbacks(&self, id: RegionId) -> Result<Vec<ScopeCallback>, RegionError> {
        Ok(self
            .entry(id)?
            .callbacks
            .iter()
            .map(|(_, callback)| *callback)
            .collect())
    }

    pub fn reserve(&mut self, id: RegionId, bytes: usize) -> Result<(), RegionError> {
        let entry = self.entry_mut(id)?;
        if let Some(cap) = entry.cap
            && entry.used + bytes > cap
        {
            return Err(RegionError::CapExceeded { region: id, cap });
        }
        entry.used += bytes;
        Ok(())
    }

    pub fn reset_usage(&mut self, id: RegionId) -> Result<(), RegionError> {
        self.entry_mut(id)?.used = 0;
        Ok(())
    }

    pub fn used(&self, id: RegionId) -> Result<usize, RegionError> {
        Ok(self.entry(id)?.used)
    }

    /// Releases `id` and its descendants, returning the callbacks to run.
    pub fn release(&mut self, id: RegionId) -> Result<Vec<ScopeCallback>, RegionError> {
        if id == self.root() {
            return Err(RegionError::Root);
        }
        let parent = self.entry(id)?.parent;
        if let Some(parent) = parent {
            self.entry_mut(parent)?.children.retain(|child| *child != id);
        }

        let mut fired = Vec::new();
        self.release_subtree(id, &mut fired);

        if !self.is_live(self.current) {
            self.current = parent.unwrap_or(RegionId(0));
        }
        Ok(fired)
    }

    fn release_subtree(&mut self, id: RegionId, fired: &mut Vec<ScopeCallback>) {
        let Some(entry) = self.entries.get_mut(id.0 as usize).and_then(Option::take) else {
            return;
        };
        for child in entry.children {
            self.release_subtree(child, fired);
        }
        fired.extend(entry.callbacks.into_iter().rev().map(|(_, callback)| callback));
        self.total_released += 1;
    }

    fn entry(&self, id: RegionId) -> Result<&RegionEntry, RegionError> {
        self.entries
            .get(id.0 as usize)
            .and_then(Option::as_ref)
            .ok_or(RegionError::NotFound(id))
    }

    fn entry_mut(&mut self, id: RegionId) -> Result<&mut RegionEntry, RegionError> {
        self.entries
            .get_mut(id.0 as usize)
            .and_then(Option::as_mut)
            .ok_or(RegionError::NotFound(id))
    }
}

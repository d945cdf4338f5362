use std::collections::HashMap;
use std::rc::Rc;

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::{
    bridge::error::Thrown,
    host::{ProcDefinition, ProcId, RegionId, VersionStamp},
    runtime::{ExecContext, closure::Closure, leak_detector},
};

/// Index of a compiled function object inside its [`FunctionStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FuncHandle(pub(crate) u32);

/// What a call needs to know about the procedure it runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionMeta {
    pub proc_id: ProcId,
    pub name: String,
    pub stamp: VersionStamp,
    pub nargs: usize,
    pub retset: bool,
    pub readonly: bool,
    /// sha256 of the wrapped source, hex encoded.
    pub digest: String,
}

/// One compiled version of a procedure.
#[derive(Debug)]
pub struct FunctionObject {
    pub meta: FunctionMeta,
    /// Long-lived region the object is owned by; releasing it drops the object.
    pub region: RegionId,
    use_count: usize,
    act_refs: usize,
    interned: bool,
    leaked: bool,
}

impl FunctionObject {
    pub fn use_count(&self) -> usize {
        self.use_count
    }

    pub fn activation_refs(&self) -> usize {
        self.act_refs
    }

    pub fn is_interned(&self) -> bool {
        self.interned
    }

    /// Nothing but running code holds it any more.
    fn unreachable(&self) -> bool {
        !self.interned && self.act_refs == 0
    }
}

/// Outcome of [`FunctionStore::intern`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interned {
    Inserted,
    /// Another object for the same procedure got there first.
    Superseded(FuncHandle),
}

/// Compiled function objects of one interpreter and the cache table over them.
///
/// The closure for each object lives in `members`, next to the object rather
/// than inside it, so that the object can be looked up and counted without
/// touching script values.
#[derive(Debug, Default)]
pub struct FunctionStore {
    objects: HashMap<FuncHandle, FunctionObject>,
    members: HashMap<FuncHandle, Rc<Closure>>,
    table: HashMap<ProcId, FuncHandle>,
    next_handle: u32,
}

impl FunctionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, meta: FunctionMeta, region: RegionId, closure: Rc<Closure>) -> FuncHandle {
        let handle = FuncHandle(self.next_handle);
        self.next_handle += 1;
        self.objects.insert(
            handle,
            FunctionObject {
                meta,
                region,
                use_count: 0,
                act_refs: 0,
                interned: false,
                leaked: false,
            },
        );
        self.members.insert(handle, closure);
        leak_detector::record_function_object();
        handle
    }

    pub fn get(&self, handle: FuncHandle) -> Option<&FunctionObject> {
        self.objects.get(&handle)
    }

    pub fn meta(&self, handle: FuncHandle) -> Option<&FunctionMeta> {
        self.get(handle).map(|object| &object.meta)
    }

    pub fn closure(&self, handle: FuncHandle) -> Option<Rc<Closure>> {
        self.members.get(&handle).cloned()
    }

    pub fn stamp(&self, handle: FuncHandle) -> Option<VersionStamp> {
        self.meta(handle).map(|meta| meta.stamp)
    }

    pub fn lookup(&self, proc_id: ProcId) -> Option<FuncHandle> {
        self.table.get(&proc_id).copied()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Live objects compiled for `proc_id`, interned or not.
    pub fn count_for(&self, proc_id: ProcId) -> usize {
        self.objects
            .values()
            .filter(|object| object.meta.proc_id == proc_id && !object.leaked)
            .count()
    }

    /// Enters `handle` into the cache table unless an entry for its procedure
    /// is already present.
    pub fn intern(&mut self, handle: FuncHandle) -> Interned {
        let Some(object) = self.objects.get_mut(&handle) else {
            return Interned::Inserted;
        };
        let proc_id = object.meta.proc_id;
        if let Some(existing) = self.table.get(&proc_id).copied()
            && existing != handle
        {
            return Interned::Superseded(existing);
        }
        object.interned = true;
        self.table.insert(proc_id, handle);
        Interned::Inserted
    }

    /// Removes `handle` from the cache table. Returns the region to release
    /// when nothing else keeps the object alive.
    pub fn unintern(&mut self, handle: FuncHandle) -> Option<RegionId> {
        let object = self.objects.get_mut(&handle)?;
        if object.interned {
            object.interned = false;
            if self.table.get(&object.meta.proc_id) == Some(&handle) {
                self.table.remove(&object.meta.proc_id);
            }
        }
        self.free_if_unused(handle)
    }

    pub fn acquire(&mut self, handle: FuncHandle) -> bool {
        match self.objects.get_mut(&handle) {
            Some(object) => {
                object.use_count += 1;
                true
            }
            None => false,
        }
    }

    pub fn release(&mut self, handle: FuncHandle) -> Option<RegionId> {
        let object = self.objects.get_mut(&handle)?;
        object.use_count = object.use_count.saturating_sub(1);
        self.free_if_unused(handle)
    }

    pub fn add_activation_ref(&mut self, handle: FuncHandle) {
        if let Some(object) = self.objects.get_mut(&handle) {
            object.act_refs += 1;
        }
    }

    pub fn drop_activation_ref(&mut self, handle: FuncHandle) -> Option<RegionId> {
        let object = self.objects.get_mut(&handle)?;
        object.act_refs = object.act_refs.saturating_sub(1);
        self.free_if_unused(handle)
    }

    /// Gives up on a freshly compiled object that lost the race to the table.
    pub fn discard(&self, handle: FuncHandle) -> Option<RegionId> {
        self.free_if_unused(handle)
    }

    fn free_if_unused(&self, handle: FuncHandle) -> Option<RegionId> {
        let object = self.objects.get(&handle)?;
        (object.unreachable() && object.use_count == 0 && !object.leaked).then_some(object.region)
    }

    /// Forgets `handle`; called when its region is released.
    pub fn drop_object(&mut self, handle: FuncHandle) {
        let Some(object) = self.objects.remove(&handle) else {
            return;
        };
        self.members.remove(&handle);
        if object.interned && self.table.get(&object.meta.proc_id) == Some(&handle) {
            self.table.remove(&object.meta.proc_id);
        }
        if object.leaked {
            return;
        }
        debug!(function = %object.meta.name, handle = handle.0, "function object dropped");
        leak_detector::record_function_object_freed();
    }

    /// Sweeps unreachable objects. Idle ones are returned for freeing; ones a
    /// running call still uses are leaked rather than freed under it.
    pub fn collect(&mut self) -> Vec<RegionId> {
        let mut regions = Vec::new();
        for (handle, object) in self.objects.iter_mut() {
            if object.leaked || !object.unreachable() {
                continue;
            }
            if object.use_count == 0 {
                regions.push(object.region);
            } else {
                object.leaked = true;
                warn!(
                    function = %object.meta.name,
                    handle = handle.0,
                    uses = object.use_count,
                    "leaking function object still in use"
                );
                leak_detector::record_function_object_leaked();
            }
        }
        regions.sort();
        regions
    }
}

/// Keeps a function object's use count raised while a call runs.
pub struct FunctionUse<'a> {
    cx: ExecContext<'a>,
    handle: FuncHandle,
}

impl<'a> FunctionUse<'a> {
    pub fn acquire(cx: &ExecContext<'a>, handle: FuncHandle) -> Result<Self, Thrown> {
        if !cx.interp.functions.borrow_mut().acquire(handle) {
            return Err(Thrown::message("function object is gone"));
        }
        Ok(Self { cx: *cx, handle })
    }

    pub fn handle(&self) -> FuncHandle {
        self.handle
    }

    pub fn closure(&self) -> Result<Rc<Closure>, Thrown> {
        self.cx
            .interp
            .functions
            .borrow()
            .closure(self.handle)
            .ok_or_else(|| Thrown::message("function object is gone"))
    }

    pub fn meta(&self) -> Result<FunctionMeta, Thrown> {
        self.cx
            .interp
            .functions
            .borrow()
            .meta(self.handle)
            .cloned()
            .ok_or_else(|| Thrown::message("function object is gone"))
    }
}

impl Drop for FunctionUse<'_> {
    fn drop(&mut self) {
        let freed = self.cx.interp.functions.borrow_mut().release(self.handle);
        if let Some(region) = freed {
            self.cx.engine.release_region_quietly(region);
        }
    }
}

/// Name the wrapper gives the function; falls back when the stored name is
/// not a usable identifier.
pub fn wrapper_name(def: &ProcDefinition) -> String {
    if crate::syntax::token_type::is_identifier(&def.name) {
        def.name.clone()
    } else {
        "f".to_string()
    }
}

/// Wraps the stored body in a chunk that defines and returns the function.
pub fn wrap_source(def: &ProcDefinition) -> String {
    let name = wrapper_name(def);
    let args = def
        .arg_names
        .iter()
        .enumerate()
        .map(|(i, arg)| match arg {
            Some(arg) if crate::syntax::token_type::is_identifier(arg) => arg.clone(),
            _ => format!("_{}", i + 1),
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "local function {name}({args}) {body} end return {name}",
        name = name,
        args = args,
        body = def.source
    )
}

pub fn source_digest(source: &str) -> String {
    let digest = Sha256::digest(source.as_bytes());
    digest.iter().map(|byte| format!("{:02x}", byte)).collect()
}

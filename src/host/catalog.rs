use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use thiserror::Error;

use crate::host::{ProcId, StorageLocation, VersionStamp};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("cache lookup failed for function {0}")]
    NotFound(ProcId),
}

/// Stored definition of one procedure, as the catalog hands it out.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcDefinition {
    pub id: ProcId,
    pub name: String,
    pub source: String,
    pub stamp: VersionStamp,
    /// Declared argument names; unnamed arguments are `None`.
    pub arg_names: Vec<Option<String>>,
    pub retset: bool,
    pub readonly: bool,
    pub trusted: bool,
}

impl ProcDefinition {
    /// A trusted, non-set-returning definition with no arguments.
    /// The id and stamp are assigned when the definition is stored.
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            id: ProcId(0),
            name: name.into(),
            source: source.into(),
            stamp: VersionStamp {
                xmin: 0,
                tid: StorageLocation {
                    block: 0,
                    offset: 0,
                },
            },
            arg_names: Vec::new(),
            retset: false,
            readonly: false,
            trusted: true,
        }
    }

    pub fn with_args<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.arg_names = names
            .into_iter()
            .map(|name| {
                let name = name.into();
                (!name.is_empty()).then_some(name)
            })
            .collect();
        self
    }

    pub fn returns_set(mut self) -> Self {
        self.retset = true;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.readonly = true;
        self
    }

    pub fn untrusted(mut self) -> Self {
        self.trusted = false;
        self
    }

    pub fn nargs(&self) -> usize {
        self.arg_names.len()
    }
}

pub trait Catalog {
    fn get_definition(&self, id: ProcId) -> Result<ProcDefinition, CatalogError>;
}

/// Catalog kept in memory. Every write produces a fresh version stamp.
#[derive(Debug)]
pub struct MemoryCatalog {
    procs: RefCell<HashMap<ProcId, ProcDefinition>>,
    next_id: Cell<u32>,
    next_xmin: Cell<u64>,
    lookups: Cell<usize>,
}

impl Default for MemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self {
            procs: RefCell::new(HashMap::new()),
            next_id: Cell::new(16384),
            next_xmin: Cell::new(700),
            lookups: Cell::new(0),
        }
    }

    pub fn define(&self, mut def: ProcDefinition) -> ProcId {
        let id = ProcId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        def.id = id;
        def.stamp = self.next_stamp(id, 1);
        self.procs.borrow_mut().insert(id, def);
        id
    }

    /// Stores new source text for `id`.
    pub fn replace_source(
        &self,
        id: ProcId,
        source: impl Into<String>,
    ) -> Result<VersionStamp, CatalogError> {
        let source = source.into();
        self.update(id, move |def| def.source = source)
    }

    /// Rewrites the row without changing its content.
    pub fn touch(&self, id: ProcId) -> Result<VersionStamp, CatalogError> {
        self.update(id, |_| {})
    }

    pub fn update(
        &self,
        id: ProcId,
        change: impl FnOnce(&mut ProcDefinition),
    ) -> Result<VersionStamp, CatalogError> {
        let mut procs = self.procs.borrow_mut();
        let def = procs.get_mut(&id).ok_or(CatalogError::NotFound(id))?;
        change(def);
        def.stamp = self.next_stamp(id, def.stamp.tid.offset + 1);
        Ok(def.stamp)
    }

    pub fn drop_definition(&self, id: ProcId) -> Result<(), CatalogError> {
        self.procs
            .borrow_mut()
            .remove(&id)
            .map(|_| ())
            .ok_or(CatalogError::NotFound(id))
    }

    /// Number of definition lookups served so far.
    pub fn lookups(&self) -> usize {
        self.lookups.get()
    }

    fn next_stamp(&self, id: ProcId, offset: u16) -> VersionStamp {
        let xmin = self.next_xmin.get();
        self.next_xmin.set(xmin + 1);
        VersionStamp {
            xmin,
            tid: StorageLocation {
                block: id.0,
                offset,
            },
        }
    }
}

impl Catalog for MemoryCatalog {
    fn get_definition(&self, id: ProcId) -> Result<ProcDefinition, CatalogError> {
        self.lookups.set(self.lookups.get() + 1);
        self.procs
            .borrow()
            .get(&id)
            .cloned()
            .ok_or(CatalogError::NotFound(id))
    }
}

//! The Element Registry (spec §4.1, component C1).
//!
//! A mapping `id -> element`, a case-insensitive `name -> id` index, and a
//! type multi-index preserving insertion order. The registry is the sole
//! owner of element state; every other component resolves an `ElementId`
//! through it rather than holding a direct reference (see `DESIGN.md`).
//!
//! Lock order (spec §5): this registry's monitor is acquired first, before
//! any per-element serialization monitor, any controller-session monitor,
//! or the loader's class lock. Methods that touch more than one element's
//! own lock take that order as a precondition of the caller, not something
//! the registry itself can enforce.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::elements::{ElementBase, ElementKind, ElementRecord, ElementType, InstrumentData};
use crate::error::{PoolError, PoolResult};
use crate::ids::{ElementId, IdAllocator, IdSpace};

/// A registered element plus the lock guarding its mutable fields. Cloning
/// an `Arc` out of the registry and dropping the registry's own lock is how
/// callers avoid holding the registry monitor while they work an element
/// (spec §4.1: "iteration returns snapshots").
pub type ElementHandle = Arc<RwLock<ElementRecord>>;

#[derive(Default)]
struct RegistryInner {
    elements: HashMap<ElementId, ElementHandle>,
    by_name: HashMap<String, ElementId>,
    by_type: HashMap<ElementType, Vec<ElementId>>,
}

/// The process-wide element table. A single instance is expected to exist
/// for the lifetime of the process (spec §4.1); this type does not enforce
/// that itself, the daemon's composition root does (`crate::lib` docs).
pub struct Registry {
    inner: RwLock<RegistryInner>,
    allocator: IdAllocator,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Registry {
            inner: RwLock::new(RegistryInner::default()),
            allocator: IdAllocator::new(),
        }
    }

    /// Allocate a fresh id in `space` without registering anything.
    pub fn allocate_id(&self, space: IdSpace) -> ElementId {
        self.allocator.allocate(space)
    }

    /// Lock a specific id into `space`'s counter, so a persisted id is never
    /// handed back out by a later `allocate_id` (spec §4.1).
    pub fn reserve_id(&self, space: IdSpace, id: ElementId) {
        self.allocator.reserve(space, id.raw());
    }

    /// Insert a new element. Fails if the id or the name is already taken.
    pub fn register(&self, record: ElementRecord) -> PoolResult<()> {
        let mut inner = self.inner.write();
        if inner.elements.contains_key(&record.base.id) {
            return Err(PoolError::ElementIDExists(record.base.id));
        }
        let key = record.base.name.to_ascii_lowercase();
        if inner.by_name.contains_key(&key) {
            return Err(PoolError::ElementExists(record.base.name.clone()));
        }
        let id = record.base.id;
        let ty = record.element_type();
        inner.by_name.insert(key, id);
        inner.by_type.entry(ty).or_default().push(id);
        inner.elements.insert(id, Arc::new(RwLock::new(record)));
        log::debug!("registered element {id} as {ty}");
        Ok(())
    }

    /// Add an instrument node under `parent_path` (spec §6: "Parent
    /// instruments must exist before a child is added"). `parent_path` is
    /// `"/"` for a root-level instrument, otherwise the path of an
    /// already-registered instrument.
    pub fn add_instrument(
        &self,
        parent_path: &str,
        leaf: &str,
        instrument_type: &str,
    ) -> PoolResult<ElementId> {
        crate::naming::validate_instrument_name(parent_path)?;
        let parent_id = if parent_path == "/" {
            None
        } else {
            let handle = self
                .get_by_name(parent_path)
                .map_err(|_| PoolError::ParentInstrumentMissing(parent_path.to_string()))?;
            let record = handle.read();
            if !matches!(record.kind, ElementKind::Instrument(_)) {
                return Err(PoolError::ParentInstrumentMissing(parent_path.to_string()));
            }
            Some(record.base.id)
        };

        let path = if parent_path == "/" {
            format!("/{leaf}")
        } else {
            format!("{parent_path}/{leaf}")
        };
        let full_name = crate::naming::instrument_full_name(parent_path, leaf, instrument_type)?;
        let id = self.allocate_id(IdSpace::Public);
        self.register(ElementRecord {
            base: ElementBase::new(id, path, full_name),
            kind: ElementKind::Instrument(InstrumentData {
                parent_id,
                class_name: instrument_type.to_string(),
            }),
        })?;
        Ok(id)
    }

    /// Delete an element, refusing if anything still references it (spec
    /// §3: "removed on explicit delete when no dependent references
    /// remain (a motor referenced by any pseudo-motor or group refuses
    /// deletion)"). This is the only path normal element deletion should
    /// go through; `unregister` itself performs no such check and exists
    /// for callers (hot-reload's rollback, tests) that already know the
    /// element is unreferenced.
    pub fn delete_element(&self, id: ElementId) -> PoolResult<ElementRecord> {
        if !self.get_motor_groups_containing_elt(id).is_empty()
            || !self.get_pseudo_motors_containing_elt(id).is_empty()
        {
            return Err(PoolError::ElementInUse(id));
        }
        self.unregister(id)
    }

    /// Remove an element entirely with no containment check. Callers are
    /// responsible for having already checked `ElementInUse`/`BusyMoving`
    /// (spec §7); the registry itself does not know about motion state.
    /// Prefer `delete_element` unless the check has already been made.
    pub fn unregister(&self, id: ElementId) -> PoolResult<ElementRecord> {
        let mut inner = self.inner.write();
        let handle = inner
            .elements
            .remove(&id)
            .ok_or(PoolError::NotFound(id))?;
        let record = Arc::try_unwrap(handle)
            .unwrap_or_else(|arc| RwLock::new(arc.read().clone_shallow()))
            .into_inner();
        let key = record.base.name.to_ascii_lowercase();
        inner.by_name.remove(&key);
        if let Some(ids) = inner.by_type.get_mut(&record.element_type()) {
            ids.retain(|&x| x != id);
        }
        log::debug!("unregistered element {id}");
        Ok(record)
    }

    /// Look up an element by id without a type check.
    pub fn get(&self, id: ElementId) -> PoolResult<ElementHandle> {
        self.inner
            .read()
            .elements
            .get(&id)
            .cloned()
            .ok_or(PoolError::NotFound(id))
    }

    /// Look up an element by name, case-insensitively.
    pub fn get_by_name(&self, name: &str) -> PoolResult<ElementHandle> {
        let key = name.to_ascii_lowercase();
        let id = {
            let inner = self.inner.read();
            *inner
                .by_name
                .get(&key)
                .ok_or_else(|| PoolError::NotFoundByName(name.to_string()))?
        };
        self.get(id)
    }

    /// Look up an element by id and assert its type, as the typed
    /// accessors (`get_motor`, `get_motor_group`, ...) do (spec §4.1).
    pub fn expect_type(&self, id: ElementId, expected: ElementType) -> PoolResult<ElementHandle> {
        let handle = self.get(id)?;
        let actual = handle.read().element_type();
        if actual != expected {
            return Err(PoolError::WrongType {
                id,
                expected,
                actual,
            });
        }
        Ok(handle)
    }

    /// A stable snapshot of every id currently registered under `ty`, in
    /// insertion order. Callers iterate this after dropping the registry
    /// lock (spec §4.1).
    pub fn list_by_type(&self, ty: ElementType) -> Vec<ElementId> {
        self.inner
            .read()
            .by_type
            .get(&ty)
            .cloned()
            .unwrap_or_default()
    }

    /// Every motor group whose user set or transitive sub-group/pseudo-motor
    /// closure contains `elem_id`. A linear scan over all motor groups, as
    /// specified (spec §4.1: "Containment queries ... are linear scans").
    pub fn get_motor_groups_containing_elt(&self, elem_id: ElementId) -> Vec<ElementId> {
        let mut out = Vec::new();
        for group_id in self.list_by_type(ElementType::MotorGroup) {
            if self.is_member_of_motor_group(group_id, elem_id).unwrap_or(false) {
                out.push(group_id);
            }
        }
        out
    }

    /// Every pseudo-motor whose motor-role closure contains `elem_id`.
    pub fn get_pseudo_motors_containing_elt(&self, elem_id: ElementId) -> Vec<ElementId> {
        let mut out = Vec::new();
        for pm_id in self.list_by_type(ElementType::PseudoMotor) {
            let Ok(handle) = self.get(pm_id) else { continue };
            let record = handle.read();
            if let ElementKind::PseudoMotor(data) = &record.kind {
                if data.motor_roles.contains(&elem_id) {
                    out.push(pm_id);
                }
            }
        }
        out
    }

    /// `true` if `elem_id` is in `group_id`'s user set, or transitively
    /// reachable through a contained pseudo-motor or sub-motor-group (spec
    /// §4.1 `is_member`).
    pub fn is_member_of_motor_group(
        &self,
        group_id: ElementId,
        elem_id: ElementId,
    ) -> PoolResult<bool> {
        let handle = self.expect_type(group_id, ElementType::MotorGroup)?;
        let record = handle.read();
        let ElementKind::MotorGroup(data) = &record.kind else {
            unreachable!("expect_type guarantees MotorGroup");
        };
        if data.user_elements.contains(&elem_id) {
            return Ok(true);
        }
        for &member in &data.user_elements {
            if member == elem_id {
                return Ok(true);
            }
            if let Ok(sub) = self.get(member) {
                let sub_record = sub.read();
                match &sub_record.kind {
                    ElementKind::MotorGroup(_) => {
                        drop(sub_record);
                        if self.is_member_of_motor_group(member, elem_id)? {
                            return Ok(true);
                        }
                    }
                    ElementKind::PseudoMotor(pm) => {
                        if pm.motor_roles.contains(&elem_id) {
                            return Ok(true);
                        }
                    }
                    _ => {}
                }
            }
        }
        Ok(false)
    }
}

impl ElementRecord {
    /// A cheap clone used only to satisfy `Arc::try_unwrap`'s fallback path
    /// when another handle to this element briefly outlives `unregister`.
    fn clone_shallow(&self) -> ElementRecord {
        ElementRecord {
            base: self.base.clone(),
            kind: match &self.kind {
                ElementKind::Controller => ElementKind::Controller,
                ElementKind::Motor(d) => ElementKind::Motor(d.clone()),
                ElementKind::PseudoMotor(d) => ElementKind::PseudoMotor(d.clone()),
                ElementKind::CounterTimer(d) => ElementKind::CounterTimer(d.clone()),
                ElementKind::ZeroD(d) => ElementKind::ZeroD(d.clone()),
                ElementKind::OneD(d) => ElementKind::OneD(d.clone()),
                ElementKind::TwoD(d) => ElementKind::TwoD(d.clone()),
                ElementKind::PseudoCounter(d) => ElementKind::PseudoCounter(d.clone()),
                ElementKind::MotorGroup(d) => ElementKind::MotorGroup(d.clone()),
                ElementKind::MeasurementGroup(d) => ElementKind::MeasurementGroup(d.clone()),
                ElementKind::Communication(d) => ElementKind::Communication(d.clone()),
                ElementKind::IORegister(d) => ElementKind::IORegister(d.clone()),
                ElementKind::Instrument(d) => ElementKind::Instrument(d.clone()),
                ElementKind::Constraint => ElementKind::Constraint,
            },
        }
    }
}

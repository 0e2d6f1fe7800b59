//! Controller Session (spec §4.4, component C4).
//!
//! Owns the live plug-in object, the `axis -> element_id` slot table, and a
//! back-reference to the class lock handed out by the loader at
//! instantiation time. Every plug-in call is made with both the session's
//! own serialization monitor and the class lock held, session lock first,
//! to match the order the event bus acquires locks in (spec §4.4, §5).

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex};

use crate::elements::{AxisState, ChannelValue};
use crate::error::{PoolError, PoolResult};
use crate::ids::ElementId;
use crate::loader::ControllerInstance;
use crate::property::PropertyValue;

/// Lifecycle state of a controller session (spec §4.4 table).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionLifecycle {
    Constructing,
    Online,
    Offline,
    Destroyed,
}

struct SessionInner {
    state: SessionLifecycle,
    instance: Arc<dyn ControllerInstance>,
    axes: HashMap<i32, ElementId>,
}

/// A live binding between a loaded class and one config instance name
/// (spec §4.4).
pub struct ControllerSession {
    pub id: ElementId,
    pub file_name: String,
    pub class_name: String,
    pub instance_name: String,
    /// `MaxDevice` from the class descriptor (spec §3: "`axis ∈ [1,
    /// MaxDevice]` (or `MaxDevice = UNDEFINED`)"); `None` means unbounded.
    pub max_device: Option<i32>,
    inner: Mutex<SessionInner>,
    class_lock: Arc<ReentrantMutex<()>>,
}

impl ControllerSession {
    pub fn new(
        id: ElementId,
        file_name: impl Into<String>,
        class_name: impl Into<String>,
        instance_name: impl Into<String>,
        instance: Arc<dyn ControllerInstance>,
        class_lock: Arc<ReentrantMutex<()>>,
    ) -> Self {
        Self::with_max_device(id, file_name, class_name, instance_name, instance, class_lock, None)
    }

    /// As `new`, but also records the class's declared `MaxDevice` so
    /// `add_device` can enforce spec §3's axis-range invariant.
    #[allow(clippy::too_many_arguments)]
    pub fn with_max_device(
        id: ElementId,
        file_name: impl Into<String>,
        class_name: impl Into<String>,
        instance_name: impl Into<String>,
        instance: Arc<dyn ControllerInstance>,
        class_lock: Arc<ReentrantMutex<()>>,
        max_device: Option<i32>,
    ) -> Self {
        ControllerSession {
            id,
            file_name: file_name.into(),
            class_name: class_name.into(),
            instance_name: instance_name.into(),
            max_device,
            inner: Mutex::new(SessionInner {
                state: SessionLifecycle::Online,
                instance,
                axes: HashMap::new(),
            }),
            class_lock,
        }
    }

    pub fn lifecycle(&self) -> SessionLifecycle {
        self.inner.lock().state
    }

    /// Swap in a freshly instantiated plug-in object, e.g. after a reload
    /// (spec §4.9). Existing axis bindings are preserved; the new object is
    /// responsible for re-accepting them via `add_device` if it requires it.
    pub fn replace_instance(&self, instance: Arc<dyn ControllerInstance>) {
        let mut inner = self.inner.lock();
        inner.instance = instance;
        inner.state = SessionLifecycle::Online;
    }

    pub fn mark_offline(&self) {
        self.inner.lock().state = SessionLifecycle::Offline;
    }

    pub fn axis_of(&self, element_id: ElementId) -> Option<i32> {
        let inner = self.inner.lock();
        inner
            .axes
            .iter()
            .find(|(_, id)| **id == element_id)
            .map(|(axis, _)| *axis)
    }

    fn with_locks<R>(&self, f: impl FnOnce(&SessionInner) -> PoolResult<R>) -> PoolResult<R> {
        let inner = self.inner.lock();
        let _class_guard = self.class_lock.lock();
        f(&inner)
    }

    pub fn add_device(&self, axis: i32, element_id: ElementId) -> PoolResult<()> {
        if axis < 1 || self.max_device.is_some_and(|max| axis > max) {
            return Err(PoolError::AxisOutOfRange { ctrl: self.id, axis });
        }
        let mut inner = self.inner.lock();
        let _class_guard = self.class_lock.lock();
        inner.instance.add_device(axis)?;
        inner.axes.insert(axis, element_id);
        Ok(())
    }

    pub fn delete_device(&self, axis: i32) -> PoolResult<()> {
        let mut inner = self.inner.lock();
        let _class_guard = self.class_lock.lock();
        inner.instance.delete_device(axis)?;
        inner.axes.remove(&axis);
        if inner.axes.is_empty() {
            inner.state = SessionLifecycle::Destroyed;
        }
        Ok(())
    }

    pub fn state_one(&self, axis: i32) -> PoolResult<AxisState> {
        self.with_locks(|inner| inner.instance.state_one(axis))
    }

    /// Dispatches by the caller-supplied category, as the registry already
    /// knows the calling element's type (spec §4.4: "typed operations
    /// dispatched by the element's type").
    pub fn read_one(&self, axis: i32) -> PoolResult<ChannelValue> {
        self.with_locks(|inner| inner.instance.read_one_value(axis))
    }

    pub fn read_one_position(&self, axis: i32) -> PoolResult<f64> {
        self.with_locks(|inner| inner.instance.read_one_position(axis))
    }

    pub fn pre_start_all(&self) -> PoolResult<()> {
        self.with_locks(|inner| inner.instance.pre_start_all())
    }

    pub fn pre_start_one(&self, axis: i32, target: f64) -> PoolResult<bool> {
        self.with_locks(|inner| inner.instance.pre_start_one(axis, target))
    }

    pub fn start_one(&self, axis: i32) -> PoolResult<()> {
        self.with_locks(|inner| inner.instance.start_one(axis))
    }

    pub fn start_all(&self) -> PoolResult<()> {
        self.with_locks(|inner| inner.instance.start_all())
    }

    pub fn start_one_ct(&self, axis: i32) -> PoolResult<()> {
        self.with_locks(|inner| inner.instance.start_one(axis))
    }

    pub fn load_one(&self, axis: i32, value: f64) -> PoolResult<()> {
        self.with_locks(|inner| inner.instance.load_one(axis, value))
    }

    pub fn abort_one(&self, axis: i32) -> PoolResult<()> {
        self.with_locks(|inner| inner.instance.abort_one(axis))
    }

    pub fn define_position(&self, axis: i32, position: f64) -> PoolResult<()> {
        self.with_locks(|inner| inner.instance.define_position(axis, position))
    }

    pub fn get_par(&self, axis: i32, name: &str) -> PoolResult<PropertyValue> {
        self.with_locks(|inner| inner.instance.get_par(axis, name))
    }

    pub fn set_par(&self, axis: i32, name: &str, value: PropertyValue) -> PoolResult<()> {
        self.with_locks(|inner| inner.instance.set_par(axis, name, value))
    }

    pub fn get_extra_attribute_par(&self, axis: i32, name: &str) -> PoolResult<PropertyValue> {
        self.with_locks(|inner| inner.instance.get_extra_attribute_par(axis, name))
    }

    pub fn set_extra_attribute_par(
        &self,
        axis: i32,
        name: &str,
        value: PropertyValue,
    ) -> PoolResult<()> {
        self.with_locks(|inner| inner.instance.set_extra_attribute_par(axis, name, value))
    }

    pub fn send_to_ctrl(&self, input: &str) -> PoolResult<String> {
        self.with_locks(|inner| inner.instance.send_to_ctrl(input))
    }

    // --- Communication ---------------------------------------------------
    pub fn read_line_one(&self, axis: i32) -> PoolResult<String> {
        self.with_locks(|inner| inner.instance.read_line_one(axis))
    }

    pub fn write_one_text(&self, axis: i32, data: &str) -> PoolResult<usize> {
        self.with_locks(|inner| inner.instance.write_one_text(axis, data))
    }

    pub fn write_read_one(&self, axis: i32, data: &str) -> PoolResult<String> {
        self.with_locks(|inner| inner.instance.write_read_one(axis, data))
    }

    // --- IORegister --------------------------------------------------------
    pub fn write_one_int(&self, axis: i32, value: i64) -> PoolResult<()> {
        self.with_locks(|inner| inner.instance.write_one_int(axis, value))
    }

    pub fn calc_physical(&self, axis: i32, pseudo_values: &[f64]) -> PoolResult<f64> {
        self.with_locks(|inner| inner.instance.calc_physical(axis, pseudo_values))
    }

    pub fn calc_pseudo(&self, axis: i32, physical_values: &[f64]) -> PoolResult<f64> {
        self.with_locks(|inner| inner.instance.calc_pseudo(axis, physical_values))
    }

    pub fn calc_all_physical(&self, pseudo_values: &[f64]) -> PoolResult<Option<Vec<f64>>> {
        self.with_locks(|inner| inner.instance.calc_all_physical(pseudo_values))
    }

    pub fn calc_all_pseudo(&self, physical_values: &[f64]) -> PoolResult<Option<Vec<f64>>> {
        self.with_locks(|inner| inner.instance.calc_all_pseudo(physical_values))
    }

    pub fn calc(&self, index: i32, physical_values: &[f64]) -> PoolResult<f64> {
        self.with_locks(|inner| inner.instance.calc(index, physical_values))
    }
}

/// Maps controller-element ids to their live session, keyed the same way
/// the registry keys the `ElementKind::Controller` record it sits beside
/// (spec §3 "(added) Representation notes").
#[derive(Default)]
pub struct SessionTable {
    sessions: Mutex<HashMap<ElementId, Arc<ControllerSession>>>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, ctrl_id: ElementId, session: Arc<ControllerSession>) {
        self.sessions.lock().insert(ctrl_id, session);
    }

    pub fn remove(&self, ctrl_id: ElementId) -> Option<Arc<ControllerSession>> {
        self.sessions.lock().remove(&ctrl_id)
    }

    pub fn get(&self, ctrl_id: ElementId) -> PoolResult<Arc<ControllerSession>> {
        self.sessions
            .lock()
            .get(&ctrl_id)
            .cloned()
            .ok_or(PoolError::NotFound(ctrl_id))
    }
}

impl std::fmt::Debug for ControllerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerSession")
            .field("id", &self.id)
            .field("file_name", &self.file_name)
            .field("class_name", &self.class_name)
            .field("instance_name", &self.instance_name)
            .field("lifecycle", &self.lifecycle())
            .finish()
    }
}

/// The `AbortOne` call through the session must still succeed while the
/// class lock is held reentrant by an outer call on the same thread (spec
/// §5); guards against a naive non-reentrant lock deadlocking the abort
/// path when it's triggered from within another plug-in call's unwind.
fn _require_reentrant_class_lock(lock: &ReentrantMutex<()>) {
    let _outer = lock.lock();
    let _inner = lock.lock();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{ElementId, IdAllocator, IdSpace};

    struct StubInstance;

    impl ControllerInstance for StubInstance {
        fn state_one(&self, _axis: i32) -> PoolResult<AxisState> {
            Ok(AxisState::On)
        }

        fn read_one_position(&self, axis: i32) -> PoolResult<f64> {
            Ok(axis as f64)
        }
    }

    fn session() -> ControllerSession {
        let alloc = IdAllocator::new();
        ControllerSession::new(
            alloc.allocate(IdSpace::Public),
            "stub.so",
            "StubCtrl",
            "ctrl01",
            Arc::new(StubInstance),
            Arc::new(ReentrantMutex::new(())),
        )
    }

    #[test]
    fn add_device_then_state_one() {
        let sess = session();
        let alloc = IdAllocator::new();
        let motor_id = alloc.allocate(IdSpace::Public);
        sess.add_device(1, motor_id).unwrap();
        assert_eq!(sess.state_one(1).unwrap(), AxisState::On);
        assert_eq!(sess.axis_of(motor_id), Some(1));
    }

    #[test]
    fn delete_last_device_marks_destroyed() {
        let sess = session();
        let alloc = IdAllocator::new();
        let motor_id = alloc.allocate(IdSpace::Public);
        sess.add_device(1, motor_id).unwrap();
        sess.delete_device(1).unwrap();
        assert_eq!(sess.lifecycle(), SessionLifecycle::Destroyed);
    }

    #[test]
    fn add_device_rejects_axis_below_one() {
        let sess = session();
        let alloc = IdAllocator::new();
        let motor_id = alloc.allocate(IdSpace::Public);
        let err = sess.add_device(0, motor_id).unwrap_err();
        assert!(matches!(err, PoolError::AxisOutOfRange { axis: 0, .. }));
    }

    #[test]
    fn add_device_rejects_axis_beyond_max_device() {
        let alloc = IdAllocator::new();
        let sess = ControllerSession::with_max_device(
            alloc.allocate(IdSpace::Public),
            "stub.so",
            "StubCtrl",
            "ctrl01",
            Arc::new(StubInstance),
            Arc::new(ReentrantMutex::new(())),
            Some(2),
        );
        let motor_id = alloc.allocate(IdSpace::Public);
        assert!(sess.add_device(2, motor_id).is_ok());
        let err = sess.add_device(3, motor_id).unwrap_err();
        assert!(matches!(err, PoolError::AxisOutOfRange { axis: 3, .. }));
    }

    #[test]
    fn unsupported_operation_propagates() {
        let sess = session();
        assert!(matches!(
            sess.calc_physical(1, &[1.0]),
            Err(PoolError::OperationNotSupported)
        ));
    }
}

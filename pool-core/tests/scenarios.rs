//! Integration scenarios exercising the seed cases (spec §8 S1-S6)
//! against the in-process loader backend.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use pool_core::controller::{ControllerSession, SessionLifecycle, SessionTable};
use pool_core::elements::{
    AxisState, ChannelValue, ElementBase, ElementKind, ElementRecord, MotorData, PseudoMotorData,
};
use pool_core::error::PoolError;
use pool_core::event_bus::EventBus;
use pool_core::hotreload::HotReloadOrchestrator;
use pool_core::ids::{IdAllocator, IdSpace};
use pool_core::loader::{
    ControllerCategory, ControllerClassFactory, ControllerDescriptor, ControllerInstance,
    InProcessBackend, Loader,
};
use pool_core::property::{PropertySchema, PropertyValue};
use pool_core::pseudo;
use pool_core::registry::Registry;

fn make_session(
    loader: &Loader,
    file: &str,
    class_name: &str,
    instance_name: &str,
    factory: Arc<dyn ControllerClassFactory>,
) -> Arc<ControllerSession> {
    let backend = InProcessBackend::new().with_class(class_name, factory);
    loader.load_backend(file, Box::new(backend)).unwrap();
    let (instance, lock) = loader.instantiate(file, class_name, instance_name, &[]).unwrap();
    let alloc = IdAllocator::new();
    Arc::new(ControllerSession::new(
        alloc.allocate(IdSpace::Public),
        file,
        class_name,
        instance_name,
        instance,
        lock,
    ))
}

/// S1 — Echo communication channel.
struct EchoComClass;
struct EchoComInstance {
    buffer: Mutex<String>,
}

impl ControllerClassFactory for EchoComClass {
    fn descriptor(&self) -> ControllerDescriptor {
        ControllerDescriptor::new("EchoCom", ControllerCategory::Communication)
    }

    fn create(
        &self,
        _instance_name: &str,
        _properties: &[PropertyValue],
    ) -> pool_core::error::PoolResult<Arc<dyn ControllerInstance>> {
        Ok(Arc::new(EchoComInstance {
            buffer: Mutex::new(String::new()),
        }))
    }
}

impl ControllerInstance for EchoComInstance {
    fn state_one(&self, _axis: i32) -> pool_core::error::PoolResult<AxisState> {
        Ok(AxisState::On)
    }

    fn write_one_text(&self, _axis: i32, data: &str) -> pool_core::error::PoolResult<usize> {
        if data.is_empty() {
            return Ok(0);
        }
        *self.buffer.lock().unwrap() = data.to_string();
        Ok(data.len())
    }

    fn read_one_value(&self, _axis: i32) -> pool_core::error::PoolResult<ChannelValue> {
        Ok(ChannelValue::Text(self.buffer.lock().unwrap().clone()))
    }

    fn read_line_one(&self, _axis: i32) -> pool_core::error::PoolResult<String> {
        Ok(self.buffer.lock().unwrap().trim_end_matches('\n').to_string())
    }
}

#[test]
fn s1_echo_communication_channel() {
    let loader = Loader::new(Vec::new());
    let session = make_session(&loader, "echo_com.so", "EchoCom", "c1", Arc::new(EchoComClass));

    assert_eq!(session.write_one_text(1, "hello\n").unwrap(), 6);
    assert_eq!(session.read_line_one(1).unwrap(), "hello");
    assert_eq!(session.write_one_text(1, "").unwrap(), 0);
    assert_eq!(
        session.read_one(1).unwrap(),
        ChannelValue::Text("hello\n".to_string())
    );
}

/// S2 — Unix timer: `LoadOne` sets the target duration, `StartOneCT`
/// starts counting, `ReadOne` grows monotonically toward the target and
/// `state_one` reports `Moving` until it's reached. Driven by an
/// explicit tick counter rather than a real clock so the test is
/// deterministic.
struct UnixTimerClass;
struct UnixTimerInstance {
    target_seconds: Mutex<f64>,
    elapsed_seconds: Mutex<f64>,
    running: Mutex<bool>,
}

impl ControllerClassFactory for UnixTimerClass {
    fn descriptor(&self) -> ControllerDescriptor {
        ControllerDescriptor::new("UnixTimer", ControllerCategory::CounterTimer)
    }

    fn create(
        &self,
        _instance_name: &str,
        _properties: &[PropertyValue],
    ) -> pool_core::error::PoolResult<Arc<dyn ControllerInstance>> {
        Ok(Arc::new(UnixTimerInstance {
            target_seconds: Mutex::new(0.0),
            elapsed_seconds: Mutex::new(0.0),
            running: Mutex::new(false),
        }))
    }
}

impl UnixTimerInstance {
    fn tick(&self, step_seconds: f64) {
        if !*self.running.lock().unwrap() {
            return;
        }
        let mut elapsed = self.elapsed_seconds.lock().unwrap();
        let target = *self.target_seconds.lock().unwrap();
        *elapsed = (*elapsed + step_seconds).min(target);
        if *elapsed >= target {
            *self.running.lock().unwrap() = false;
        }
    }
}

impl ControllerInstance for UnixTimerInstance {
    fn state_one(&self, _axis: i32) -> pool_core::error::PoolResult<AxisState> {
        if *self.running.lock().unwrap() {
            Ok(AxisState::Moving)
        } else {
            Ok(AxisState::On)
        }
    }

    fn load_one(&self, _axis: i32, value: f64) -> pool_core::error::PoolResult<()> {
        *self.target_seconds.lock().unwrap() = value;
        *self.elapsed_seconds.lock().unwrap() = 0.0;
        Ok(())
    }

    fn start_one(&self, _axis: i32) -> pool_core::error::PoolResult<()> {
        *self.running.lock().unwrap() = true;
        Ok(())
    }

    fn read_one_value(&self, _axis: i32) -> pool_core::error::PoolResult<ChannelValue> {
        Ok(ChannelValue::Scalar(*self.elapsed_seconds.lock().unwrap()))
    }
}

#[test]
fn s2_unix_timer_counts_up_then_stops() {
    let downcast = |v: ChannelValue| match v {
        ChannelValue::Scalar(s) => s,
        other => panic!("expected scalar, got {other:?}"),
    };

    // Built directly (not through the loader) so the test keeps a
    // concretely-typed handle to drive the fake clock with, while the
    // session only ever sees the `Arc<dyn ControllerInstance>` upcast —
    // exactly the shape a loaded plug-in has in production.
    let timer = Arc::new(UnixTimerInstance {
        target_seconds: Mutex::new(0.0),
        elapsed_seconds: Mutex::new(0.0),
        running: Mutex::new(false),
    });
    let alloc = IdAllocator::new();
    let session = ControllerSession::new(
        alloc.allocate(IdSpace::Public),
        "ux_timer.so",
        "UnixTimer",
        "t1",
        timer.clone() as Arc<dyn ControllerInstance>,
        Arc::new(parking_lot::ReentrantMutex::new(())),
    );

    session.load_one(1, 2.5).unwrap();
    session.start_one_ct(1).unwrap();
    assert_eq!(session.state_one(1).unwrap(), AxisState::Moving);
    assert_eq!(downcast(session.read_one(1).unwrap()), 0.0);

    timer.tick(1.0);
    let mid = downcast(session.read_one(1).unwrap());
    assert!(mid > 0.0 && mid < 2.5);
    assert_eq!(session.state_one(1).unwrap(), AxisState::Moving);

    timer.tick(1.5);
    assert_eq!(downcast(session.read_one(1).unwrap()), 2.5);
    assert_eq!(session.state_one(1).unwrap(), AxisState::On);
}

/// S3 — Fake IORegister with extra attributes.
struct FakeIORegisterClass;
struct FakeIORegisterInstance {
    extra_2: Mutex<f64>,
}

impl ControllerClassFactory for FakeIORegisterClass {
    fn descriptor(&self) -> ControllerDescriptor {
        ControllerDescriptor::new("FakeIORegister", ControllerCategory::IORegister)
    }

    fn create(
        &self,
        _instance_name: &str,
        _properties: &[PropertyValue],
    ) -> pool_core::error::PoolResult<Arc<dyn ControllerInstance>> {
        Ok(Arc::new(FakeIORegisterInstance {
            extra_2: Mutex::new(0.0),
        }))
    }
}

impl ControllerInstance for FakeIORegisterInstance {
    fn state_one(&self, _axis: i32) -> pool_core::error::PoolResult<AxisState> {
        Ok(AxisState::On)
    }

    fn get_extra_attribute_par(
        &self,
        _axis: i32,
        name: &str,
    ) -> pool_core::error::PoolResult<PropertyValue> {
        match name {
            "CppComCh_extra_1" => Ok(PropertyValue::Int32(12345)),
            "CppComCh_extra_2" => Ok(PropertyValue::Float64(*self.extra_2.lock().unwrap())),
            _ => Err(PoolError::UnknownProperty(name.to_string())),
        }
    }

    fn set_extra_attribute_par(
        &self,
        _axis: i32,
        name: &str,
        value: PropertyValue,
    ) -> pool_core::error::PoolResult<()> {
        match (name, value) {
            ("CppComCh_extra_2", PropertyValue::Float64(v)) => {
                *self.extra_2.lock().unwrap() = v;
                Ok(())
            }
            (other, _) => Err(PoolError::UnknownProperty(other.to_string())),
        }
    }

    fn write_one_int(&self, _axis: i32, _value: i64) -> pool_core::error::PoolResult<()> {
        Ok(())
    }
}

#[test]
fn s3_fake_io_register_extra_attributes() {
    let loader = Loader::new(Vec::new());
    let session = make_session(
        &loader,
        "fake_io.so",
        "FakeIORegister",
        "io1",
        Arc::new(FakeIORegisterClass),
    );

    assert_eq!(
        session.get_extra_attribute_par(1, "CppComCh_extra_1").unwrap(),
        PropertyValue::Int32(12345)
    );
    session
        .set_extra_attribute_par(1, "CppComCh_extra_2", PropertyValue::Float64(3.14))
        .unwrap();
    assert_eq!(
        session.get_extra_attribute_par(1, "CppComCh_extra_2").unwrap(),
        PropertyValue::Float64(3.14)
    );
    assert!(matches!(
        session.get_extra_attribute_par(1, "NoSuchAttribute"),
        Err(PoolError::UnknownProperty(_))
    ));
}

/// S4/S5 — a pseudo-motor controller computing `m_x = r*cos(theta)`,
/// `m_y = r*sin(theta)` with motor roles `[m_x, m_y]` and pseudo roles
/// `[theta, r]`.
struct PolarClass;
struct PolarInstance;

impl ControllerClassFactory for PolarClass {
    fn descriptor(&self) -> ControllerDescriptor {
        let mut d = ControllerDescriptor::new("Polar", ControllerCategory::PseudoMotor);
        d.property_schema = PropertySchema::default();
        d
    }

    fn create(
        &self,
        _instance_name: &str,
        _properties: &[PropertyValue],
    ) -> pool_core::error::PoolResult<Arc<dyn ControllerInstance>> {
        Ok(Arc::new(PolarInstance))
    }
}

impl ControllerInstance for PolarInstance {
    fn state_one(&self, _axis: i32) -> pool_core::error::PoolResult<AxisState> {
        Ok(AxisState::On)
    }

    /// Pseudo roles are `[theta, r]` (1-indexed: 1=theta, 2=r); motor
    /// roles are `[m_x, m_y]` (1=m_x, 2=m_y).
    fn calc_physical(&self, axis: i32, pseudo_values: &[f64]) -> pool_core::error::PoolResult<f64> {
        let theta = pseudo_values[0];
        let r = pseudo_values[1];
        match axis {
            1 => Ok(r * theta.cos()),
            2 => Ok(r * theta.sin()),
            _ => Err(PoolError::OperationNotSupported),
        }
    }
}

fn setup_polar_group(loader: &Loader, sessions: &SessionTable, registry: &Registry) -> (
    pool_core::ids::ElementId, // m_x
    pool_core::ids::ElementId, // m_y
    pool_core::ids::ElementId, // theta (pseudo-motor)
    pool_core::ids::ElementId, // r (pseudo-motor)
) {
    let alloc = IdAllocator::new();
    let session = make_session(loader, "polar.so", "Polar", "pm1", Arc::new(PolarClass));
    let ctrl_id = session.id;
    registry
        .register(ElementRecord {
            base: ElementBase::new(ctrl_id, "pm1", "pool/controller/pm1"),
            kind: ElementKind::Controller,
        })
        .unwrap();
    sessions.insert(ctrl_id, session.clone());

    let m_x = alloc.allocate(IdSpace::Public);
    let mut base = ElementBase::new(m_x, "m_x", "pool/motor/m_x");
    base.axis = Some(1);
    registry
        .register(ElementRecord {
            base,
            kind: ElementKind::Motor(MotorData::default()),
        })
        .unwrap();

    let m_y = alloc.allocate(IdSpace::Public);
    let mut base = ElementBase::new(m_y, "m_y", "pool/motor/m_y");
    base.axis = Some(2);
    registry
        .register(ElementRecord {
            base,
            kind: ElementKind::Motor(MotorData::default()),
        })
        .unwrap();

    let theta = alloc.allocate(IdSpace::Public);
    let r = alloc.allocate(IdSpace::Public);
    let mut base = ElementBase::new(theta, "theta", "pool/pseudomotor/theta");
    base.ctrl_id = Some(ctrl_id);
    registry
        .register(ElementRecord {
            base,
            kind: ElementKind::PseudoMotor(PseudoMotorData {
                motor_group_id: alloc.allocate(IdSpace::Ghost),
                motor_roles: vec![m_x, m_y],
                siblings: vec![theta, r],
                role_index: 0,
                last_position: Some(0.0),
            }),
        })
        .unwrap();
    let mut base = ElementBase::new(r, "r", "pool/pseudomotor/r");
    base.ctrl_id = Some(ctrl_id);
    registry
        .register(ElementRecord {
            base,
            kind: ElementKind::PseudoMotor(PseudoMotorData {
                motor_group_id: alloc.allocate(IdSpace::Ghost),
                motor_roles: vec![m_x, m_y],
                siblings: vec![theta, r],
                role_index: 1,
                last_position: Some(1.0),
            }),
        })
        .unwrap();

    (m_x, m_y, theta, r)
}

#[test]
fn s4_pseudo_motor_composition() {
    let registry = Registry::new();
    let sessions = SessionTable::new();
    let loader = Loader::new(Vec::new());
    let (m_x, m_y, theta, _r) = setup_polar_group(&loader, &sessions, &registry);

    let decomposed = pseudo::calc_move(
        &registry,
        &sessions,
        &[theta],
        &[std::f64::consts::FRAC_PI_2],
    )
    .unwrap();

    let ctrl_targets = decomposed.values().next().unwrap();
    assert!((ctrl_targets[&m_x]).abs() < 1e-9);
    assert!((ctrl_targets[&m_y] - 1.0).abs() < 1e-9);
}

#[test]
fn s5_motor_group_with_pseudo_fixes_other_physical_from_current() {
    let registry = Registry::new();
    let sessions = SessionTable::new();
    let loader = Loader::new(Vec::new());
    let (m_x, m_y, _theta, r) = setup_polar_group(&loader, &sessions, &registry);

    // Request r -> 2.0 while leaving theta unspecified; theta's current
    // value (0.0) is held fixed (spec §4.6 step 2 "fill from current").
    let decomposed = pseudo::calc_move(&registry, &sessions, &[r], &[2.0]).unwrap();
    let ctrl_targets = decomposed.values().next().unwrap();
    assert!((ctrl_targets[&m_x] - 2.0).abs() < 1e-9);
    assert!((ctrl_targets[&m_y]).abs() < 1e-9);
}

/// S6 — reload while idle succeeds and fires one `ElementStructureChange`
/// per axis; reload while an axis is `Moving` fails with `BusyMoving`.
struct NullMotorClass;
struct NullMotorInstance;

impl ControllerClassFactory for NullMotorClass {
    fn descriptor(&self) -> ControllerDescriptor {
        ControllerDescriptor::new("NullMotor", ControllerCategory::Motor)
    }

    fn create(
        &self,
        _instance_name: &str,
        _properties: &[PropertyValue],
    ) -> pool_core::error::PoolResult<Arc<dyn ControllerInstance>> {
        Ok(Arc::new(NullMotorInstance))
    }
}

impl ControllerInstance for NullMotorInstance {
    fn state_one(&self, _axis: i32) -> pool_core::error::PoolResult<AxisState> {
        Ok(AxisState::On)
    }
}

#[test]
fn s6_reload_while_idle_succeeds_and_fires_structure_change() {
    let registry = Arc::new(Registry::new());
    let sessions = Arc::new(SessionTable::new());
    let loader = Arc::new(Loader::new(Vec::new()));
    let bus = Arc::new(EventBus::new());

    let backend = InProcessBackend::new().with_class("NullMotor", Arc::new(NullMotorClass));
    loader.load_backend("null_motor.so", Box::new(backend)).unwrap();

    let alloc = IdAllocator::new();
    let ctrl_id = alloc.allocate(IdSpace::Public);
    registry
        .register(ElementRecord {
            base: ElementBase::new(ctrl_id, "c1", "pool/controller/c1"),
            kind: ElementKind::Controller,
        })
        .unwrap();
    let (instance, lock) = loader
        .instantiate("null_motor.so", "NullMotor", "c1", &[])
        .unwrap();
    let session = Arc::new(ControllerSession::new(
        ctrl_id, "null_motor.so", "NullMotor", "c1", instance, lock,
    ));
    sessions.insert(ctrl_id, session.clone());

    let axis1 = alloc.allocate(IdSpace::Public);
    let mut base = ElementBase::new(axis1, "mot01", "pool/motor/mot01");
    base.ctrl_id = Some(ctrl_id);
    base.axis = Some(1);
    registry
        .register(ElementRecord {
            base,
            kind: ElementKind::Motor(MotorData::default()),
        })
        .unwrap();
    session.add_device(1, axis1).unwrap();

    let fired = Arc::new(AtomicI64::new(0));
    struct Counter(Arc<AtomicI64>);
    impl pool_core::event_bus::EventListener for Counter {
        fn pool_elem_changed(&self, _stack: &pool_core::event_bus::EventStack) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }
    bus.subscribe(axis1, Arc::new(Counter(fired.clone())));

    let orchestrator = HotReloadOrchestrator::new(registry.clone(), sessions.clone(), loader, bus);
    orchestrator.reload_controller_code(&[ctrl_id]).unwrap();
    assert_eq!(fired.load(Ordering::Relaxed), 1);
    assert_eq!(sessions.get(ctrl_id).unwrap().lifecycle(), SessionLifecycle::Online);

    // Now mark the axis Moving and retry: must fail with BusyMoving, no
    // further events fired.
    registry.get(axis1).unwrap().write().base.state = AxisState::Moving;
    let err = orchestrator.reload_controller_code(&[ctrl_id]).unwrap_err();
    assert!(matches!(err, PoolError::BusyMoving(id) if id == axis1));
    assert_eq!(fired.load(Ordering::Relaxed), 1);
}


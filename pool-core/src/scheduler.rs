//! Motion/Acquisition Scheduler (spec §4.7, component C8).
//!
//! Drives a decomposed move through the per-controller plug-in phase
//! sequence, then polls participating axes from a dedicated thread until
//! every one leaves `Moving` (spec §4.7 steps 2-6).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::controller::SessionTable;
use crate::elements::{AxisState, ElementKind};
use crate::error::{PoolError, PoolResult};
use crate::event_bus::{EventBus, EventKind, EventValue, PoolEvent};
use crate::ids::ElementId;
use crate::pseudo;
use crate::registry::Registry;

/// How often the poll thread checks participating axes for a state change
/// (spec §4.7 step 5 imposes no specific cadence; this is an
/// implementation default, not part of the wire contract).
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// A request to move a source element (motor, pseudo-motor, or motor
/// group) to a target vector of the appropriate arity.
pub struct MoveRequest {
    pub source: ElementId,
    pub user_elements: Vec<ElementId>,
    pub targets: Vec<f64>,
    /// Set when `source` is a measurement group: the master channel's
    /// transition out of `Moving` aborts every other participant (spec
    /// §4.7 step 5).
    pub measurement_master: Option<ElementId>,
}

/// A handle to an in-flight motion, returned once the plug-in start phase
/// has completed; `join` blocks until the poll loop observes termination.
pub struct MotionHandle {
    source: ElementId,
    abort_flag: Arc<AtomicBool>,
    poll_thread: JoinHandle<PoolResult<()>>,
}

impl MotionHandle {
    pub fn source(&self) -> ElementId {
        self.source
    }

    /// Request `AbortOne` on every participant; the poll loop observes the
    /// resulting state transition on its next tick (spec §4.7
    /// "Cancellation").
    pub fn abort(&self) {
        self.abort_flag.store(true, Ordering::SeqCst);
    }

    pub fn join(self) -> PoolResult<()> {
        self.poll_thread
            .join()
            .unwrap_or(Err(PoolError::OperationNotSupported))
    }
}

pub struct Scheduler {
    registry: Arc<Registry>,
    sessions: Arc<SessionTable>,
    bus: Arc<EventBus>,
}

impl Scheduler {
    pub fn new(registry: Arc<Registry>, sessions: Arc<SessionTable>, bus: Arc<EventBus>) -> Self {
        Scheduler {
            registry,
            sessions,
            bus,
        }
    }

    /// Run steps 1-4 synchronously, then spawn the poll thread for step 5
    /// and return a handle (spec §4.7).
    pub fn start_move(&self, request: MoveRequest) -> PoolResult<MotionHandle> {
        let decomposed = pseudo::calc_move(
            &self.registry,
            &self.sessions,
            &request.user_elements,
            &request.targets,
        )?;

        let mut ctrl_ids: Vec<ElementId> = decomposed.keys().copied().collect();
        ctrl_ids.sort();

        // Step 2/3: lock order is ascending ctrl_id; each session call
        // below already takes the session monitor then the class lock
        // (`ControllerSession::with_locks`), so acquiring sessions in
        // ascending id order here keeps the whole scheduler consistent
        // with that discipline.
        let mut per_ctrl_axes: Vec<(ElementId, HashMap<ElementId, f64>)> = Vec::new();
        for ctrl_id in ctrl_ids {
            per_ctrl_axes.push((ctrl_id, decomposed[&ctrl_id].clone()));
        }

        let thread_id = thread::current().id();
        for (_, motors) in &per_ctrl_axes {
            for &motor_id in motors.keys() {
                self.registry.get(motor_id)?.write().base.motion_thread = Some(thread_id);
            }
        }

        // Step 4: PreStartAll, PreStartOne per axis, StartOne per axis,
        // StartAll.
        for (ctrl_id, motors) in &per_ctrl_axes {
            let session = self.sessions.get(*ctrl_id)?;
            session.pre_start_all()?;
            let mut axes = Vec::new();
            for (&motor_id, &target) in motors {
                let axis = session.axis_of(motor_id).ok_or(PoolError::NotFound(motor_id))?;
                if !session.pre_start_one(axis, target)? {
                    return Err(PoolError::BadState(motor_id));
                }
                axes.push(axis);
            }
            for axis in &axes {
                session.start_one(*axis)?;
            }
            session.start_all()?;
        }

        let participants: Vec<ElementId> = per_ctrl_axes
            .iter()
            .flat_map(|(_, motors)| motors.keys().copied())
            .collect();

        let abort_flag = Arc::new(AtomicBool::new(false));
        let poll_thread = self.spawn_poll_thread(
            request.source,
            participants,
            request.measurement_master,
            abort_flag.clone(),
        );

        Ok(MotionHandle {
            source: request.source,
            abort_flag,
            poll_thread,
        })
    }

    fn spawn_poll_thread(
        &self,
        source: ElementId,
        participants: Vec<ElementId>,
        measurement_master: Option<ElementId>,
        abort_flag: Arc<AtomicBool>,
    ) -> JoinHandle<PoolResult<()>> {
        let registry = self.registry.clone();
        let sessions = self.sessions.clone();
        let bus = self.bus.clone();

        thread::spawn(move || -> PoolResult<()> {
            let mut last_state: HashMap<ElementId, AxisState> = HashMap::new();
            loop {
                if abort_flag.load(Ordering::SeqCst) {
                    for &elem_id in &participants {
                        abort_one(&registry, &sessions, elem_id)?;
                    }
                }

                let mut any_moving = false;
                let mut master_stopped = false;
                for &elem_id in &participants {
                    let state = read_state(&registry, &sessions, elem_id)?;
                    if last_state.get(&elem_id) != Some(&state) {
                        bus.fire_pool_elem_change(
                            PoolEvent::new(
                                EventKind::StateChange,
                                elem_id,
                                EventValue::State(last_state.get(&elem_id).copied().unwrap_or(AxisState::Unknown)),
                                EventValue::State(state),
                            ),
                            None,
                            true,
                        );
                        if let Ok(position) = read_position(&registry, &sessions, elem_id) {
                            bus.fire_pool_elem_change(
                                PoolEvent::new(
                                    EventKind::PositionChange,
                                    elem_id,
                                    EventValue::None,
                                    EventValue::Position(position),
                                ),
                                None,
                                true,
                            );
                        }
                        last_state.insert(elem_id, state);
                    }
                    if state.is_moving() {
                        any_moving = true;
                    } else if Some(elem_id) == measurement_master {
                        master_stopped = true;
                    }
                }

                // Measurement-group master-stops-others (spec §4.7 step 5).
                if master_stopped {
                    for &elem_id in &participants {
                        if Some(elem_id) != measurement_master {
                            let _ = abort_one(&registry, &sessions, elem_id);
                        }
                    }
                    break;
                }

                if !any_moving {
                    break;
                }
                thread::sleep(POLL_INTERVAL);
            }

            for &elem_id in &participants {
                registry.get(elem_id)?.write().base.motion_thread = None;
            }
            bus.fire_pool_elem_change(
                PoolEvent::new(EventKind::MotionEnded, source, EventValue::None, EventValue::None),
                None,
                true,
            );
            Ok(())
        })
    }
}

fn ctrl_and_axis(
    registry: &Registry,
    elem_id: ElementId,
) -> PoolResult<(ElementId, i32)> {
    let handle = registry.get(elem_id)?;
    let record = handle.read();
    let ctrl_id = record.base.ctrl_id.ok_or(PoolError::NotFound(elem_id))?;
    let axis = record.base.axis.ok_or(PoolError::NotFound(elem_id))?;
    Ok((ctrl_id, axis))
}

fn read_state(
    registry: &Registry,
    sessions: &SessionTable,
    elem_id: ElementId,
) -> PoolResult<AxisState> {
    let (ctrl_id, axis) = ctrl_and_axis(registry, elem_id)?;
    sessions.get(ctrl_id)?.state_one(axis)
}

fn read_position(
    registry: &Registry,
    sessions: &SessionTable,
    elem_id: ElementId,
) -> PoolResult<f64> {
    let (ctrl_id, axis) = ctrl_and_axis(registry, elem_id)?;
    let position = sessions.get(ctrl_id)?.read_one_position(axis)?;
    let handle = registry.get(elem_id)?;
    let mut record = handle.write();
    if let ElementKind::Motor(m) = &mut record.kind {
        m.last_position = Some(position);
    }
    Ok(position)
}

fn abort_one(registry: &Registry, sessions: &SessionTable, elem_id: ElementId) -> PoolResult<()> {
    let (ctrl_id, axis) = ctrl_and_axis(registry, elem_id)?;
    sessions.get(ctrl_id)?.abort_one(axis)
}

//! Typed element records (spec §3, data model).
//!
//! Rather than a deep inheritance tree the pool models elements as a closed
//! set of tagged variants (`ElementKind`) wrapping a common `ElementBase`.
//! The `Moveable` capability is a small trait implemented by the few kinds
//! that can be targets of a motion request; the scheduler depends only on
//! that trait, never on the concrete kind (see `DESIGN.md`).

mod channel;
mod group;
mod instrument;
mod motor;
mod pseudo_counter;
mod pseudo_motor;

pub use channel::{ChannelData, ChannelValue};
pub use group::{MeasurementGroupData, MotorGroupData};
pub use instrument::InstrumentData;
pub use motor::MotorData;
pub use pseudo_counter::PseudoCounterData;
pub use pseudo_motor::PseudoMotorData;

use crate::ids::ElementId;

/// The closed set of element types the pool can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    Controller,
    Motor,
    PseudoMotor,
    CounterTimer,
    ZeroD,
    OneD,
    TwoD,
    PseudoCounter,
    MotorGroup,
    MeasurementGroup,
    Communication,
    IORegister,
    Instrument,
    Constraint,
}

impl ElementType {
    /// All values, in the order the spec lists them (also the order the
    /// registry's type index iterates in for things like `list_by_type`).
    pub const ALL: [ElementType; 14] = [
        ElementType::Controller,
        ElementType::Motor,
        ElementType::PseudoMotor,
        ElementType::CounterTimer,
        ElementType::ZeroD,
        ElementType::OneD,
        ElementType::TwoD,
        ElementType::PseudoCounter,
        ElementType::MotorGroup,
        ElementType::MeasurementGroup,
        ElementType::Communication,
        ElementType::IORegister,
        ElementType::Instrument,
        ElementType::Constraint,
    ];

    /// A physical element is backed directly by a controller axis.
    pub fn is_physical(self) -> bool {
        matches!(
            self,
            ElementType::Motor
                | ElementType::CounterTimer
                | ElementType::ZeroD
                | ElementType::OneD
                | ElementType::TwoD
                | ElementType::Communication
                | ElementType::IORegister
        )
    }

    /// A pseudo element's value is computed by a plug-in transform over
    /// physical elements.
    pub fn is_pseudo(self) -> bool {
        matches!(self, ElementType::PseudoMotor | ElementType::PseudoCounter)
    }

    /// A group aggregates other elements.
    pub fn is_group(self) -> bool {
        matches!(self, ElementType::MotorGroup | ElementType::MeasurementGroup)
    }
}

impl std::fmt::Display for ElementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ElementType::Controller => "Controller",
            ElementType::Motor => "Motor",
            ElementType::PseudoMotor => "PseudoMotor",
            ElementType::CounterTimer => "CounterTimer",
            ElementType::ZeroD => "ZeroD",
            ElementType::OneD => "OneD",
            ElementType::TwoD => "TwoD",
            ElementType::PseudoCounter => "PseudoCounter",
            ElementType::MotorGroup => "MotorGroup",
            ElementType::MeasurementGroup => "MeasurementGroup",
            ElementType::Communication => "Communication",
            ElementType::IORegister => "IORegister",
            ElementType::Instrument => "Instrument",
            ElementType::Constraint => "Constraint",
        };
        f.write_str(s)
    }
}

/// Per-axis machine state (spec §4.4). `Moving` is the universal
/// work-in-progress state for both motion and acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisState {
    On,
    Moving,
    Alarm,
    Fault,
    Disabled,
    Unknown,
    /// Communication-channel-only substate.
    Open,
    Closed,
}

impl AxisState {
    pub fn is_moving(self) -> bool {
        matches!(self, AxisState::Moving)
    }
}

/// Fields common to every element, physical or synthetic (spec §3).
#[derive(Debug, Clone)]
pub struct ElementBase {
    pub id: ElementId,
    pub name: String,
    pub full_name: String,
    pub ctrl_id: Option<ElementId>,
    /// 1-based axis index within `ctrl_id`; `None` for synthetic elements.
    pub axis: Option<i32>,
    pub instrument_id: Option<ElementId>,
    pub simulation_mode: bool,
    pub state: AxisState,
    /// The thread id currently driving motion/acquisition on this element,
    /// if any (spec §4.7 step 3).
    pub motion_thread: Option<std::thread::ThreadId>,
}

impl ElementBase {
    pub fn new(id: ElementId, name: impl Into<String>, full_name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            full_name: full_name.into(),
            ctrl_id: None,
            axis: None,
            instrument_id: None,
            simulation_mode: false,
            state: AxisState::Unknown,
            motion_thread: None,
        }
    }
}

/// Capability of an element whose operation expands into one or more
/// physical motor targets (spec glossary: Moveable).
pub trait Moveable {
    /// Number of values this moveable receives as input to `calc_move`.
    fn moveable_size(&self) -> usize;
}

/// The type-specific payload of an element record. The registry owns
/// `(ElementBase, ElementKind)` pairs; every other component resolves an
/// `ElementId` through the registry rather than holding a direct reference,
/// which is how this crate avoids the original implementation's cyclic
/// ownership pointers (see `DESIGN.md`).
#[derive(Debug)]
pub enum ElementKind {
    /// Controller sessions are themselves registry elements; their live
    /// state lives in `crate::controller::ControllerSession` and is keyed
    /// by the same id from a side table (see `crate::controller`).
    Controller,
    Motor(MotorData),
    PseudoMotor(PseudoMotorData),
    CounterTimer(ChannelData),
    ZeroD(ChannelData),
    OneD(ChannelData),
    TwoD(ChannelData),
    PseudoCounter(PseudoCounterData),
    MotorGroup(MotorGroupData),
    MeasurementGroup(MeasurementGroupData),
    Communication(ChannelData),
    IORegister(ChannelData),
    Instrument(InstrumentData),
    Constraint,
}

impl ElementKind {
    pub fn element_type(&self) -> ElementType {
        match self {
            ElementKind::Controller => ElementType::Controller,
            ElementKind::Motor(_) => ElementType::Motor,
            ElementKind::PseudoMotor(_) => ElementType::PseudoMotor,
            ElementKind::CounterTimer(_) => ElementType::CounterTimer,
            ElementKind::ZeroD(_) => ElementType::ZeroD,
            ElementKind::OneD(_) => ElementType::OneD,
            ElementKind::TwoD(_) => ElementType::TwoD,
            ElementKind::PseudoCounter(_) => ElementType::PseudoCounter,
            ElementKind::MotorGroup(_) => ElementType::MotorGroup,
            ElementKind::MeasurementGroup(_) => ElementType::MeasurementGroup,
            ElementKind::Communication(_) => ElementType::Communication,
            ElementKind::IORegister(_) => ElementType::IORegister,
            ElementKind::Instrument(_) => ElementType::Instrument,
            ElementKind::Constraint => ElementType::Constraint,
        }
    }

    pub fn as_moveable(&self) -> Option<&dyn Moveable> {
        match self {
            ElementKind::Motor(m) => Some(m),
            ElementKind::MotorGroup(g) => Some(g),
            ElementKind::PseudoMotor(p) => Some(p),
            _ => None,
        }
    }
}

/// A complete registry entry.
#[derive(Debug)]
pub struct ElementRecord {
    pub base: ElementBase,
    pub kind: ElementKind,
}

impl ElementRecord {
    pub fn element_type(&self) -> ElementType {
        self.kind.element_type()
    }
}

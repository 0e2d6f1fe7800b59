use super::Moveable;
use crate::ids::ElementId;

/// A physical motor: one axis of one controller, directly moveable.
#[derive(Debug, Clone, Default)]
pub struct MotorData {
    /// Last target position requested of this motor, cached for
    /// `MotionEnded`/`PositionChange` comparisons.
    pub last_target: Option<f64>,
    /// Last position read back from the controller.
    pub last_position: Option<f64>,
    /// Groups that were auto-created to back an ad-hoc move of this motor
    /// alone; tracked so temporary-composite aging (spec §4.8) can find them.
    pub temporary_groups: Vec<ElementId>,
}

impl Moveable for MotorData {
    fn moveable_size(&self) -> usize {
        1
    }
}

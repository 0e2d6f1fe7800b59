use super::Moveable;
use crate::ids::ElementId;

/// A synthetic motor whose position is computed from one or more physical
/// motors through a plug-in-provided transform (spec §4.6).
#[derive(Debug, Clone)]
pub struct PseudoMotorData {
    /// The hidden (ghost) motor group backing this pseudo-motor. Its
    /// physical set equals `motor_roles` exactly (spec §3 invariant).
    pub motor_group_id: ElementId,
    /// Physical motors bound to this controller's motor roles, in role
    /// order (role index -> motor id).
    pub motor_roles: Vec<ElementId>,
    /// All pseudo-motors produced by the same controller session,
    /// including `self`, in pseudo-role order.
    pub siblings: Vec<ElementId>,
    /// This pseudo-motor's own role index within `siblings`.
    pub role_index: usize,
    pub last_position: Option<f64>,
}

impl Moveable for PseudoMotorData {
    fn moveable_size(&self) -> usize {
        1
    }
}

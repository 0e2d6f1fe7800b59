use crate::ids::ElementId;

/// A synthetic channel whose value is computed from physical channels
/// through a plug-in transform (spec §4.6, `Calc`).
#[derive(Debug, Clone)]
pub struct PseudoCounterData {
    /// Physical channels bound to this controller's counter roles, in role
    /// order.
    pub channel_roles: Vec<ElementId>,
    pub last_value: Option<f64>,
}

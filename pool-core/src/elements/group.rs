use super::Moveable;
use crate::ids::ElementId;

/// A named or ad-hoc collection of motors and/or motor groups, moved as one
/// unit (spec §4.6 `calc_move`). `user_elements` is exactly what the client
/// asked for (motors, pseudo-motors, or nested groups, in the order given);
/// `physical_motor_ids` is the flattened, de-duplicated closure over
/// physical motors the scheduler actually locks and moves.
#[derive(Debug, Clone)]
pub struct MotorGroupData {
    pub user_elements: Vec<ElementId>,
    pub physical_motor_ids: Vec<ElementId>,
    /// Pseudo-motors whose physical motors are fully contained in this
    /// group, in the order their positions should be reported.
    pub pseudo_motor_ids: Vec<ElementId>,
    /// `true` for a group auto-created to back a single ad-hoc move,
    /// eligible for aging out once no longer referenced (spec §4.8).
    pub is_temporary: bool,
}

impl Moveable for MotorGroupData {
    fn moveable_size(&self) -> usize {
        self.user_elements.len()
    }
}

/// A named collection of experiment channels acquired together (spec §4.7).
#[derive(Debug, Clone)]
pub struct MeasurementGroupData {
    pub user_elements: Vec<ElementId>,
    pub physical_channel_ids: Vec<ElementId>,
    pub pseudo_counter_ids: Vec<ElementId>,
    /// The channel designated to drive the acquisition's timing (step 5);
    /// `None` until explicitly configured or inferred from the first
    /// `CounterTimer` member.
    pub master_channel_id: Option<ElementId>,
    /// Per-channel enabled flag, parallel to `physical_channel_ids`; a
    /// disabled channel stays in the group but is skipped at `StartAll`.
    pub enabled: Vec<bool>,
}

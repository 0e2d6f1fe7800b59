//! Pseudo Composition — physical↔pseudo transforms (spec §4.6, component
//! C7).

use std::collections::HashMap;

use crate::controller::{ControllerSession, SessionTable};
use crate::elements::{ElementKind, ElementType};
use crate::error::{PoolError, PoolResult};
use crate::ids::ElementId;
use crate::registry::Registry;

const AMBIGUOUS_MOVE_EPSILON: f64 = 1e-9;

/// `CalcPhysical(role_i, pseudo_positions)` for a single motor role, or the
/// corresponding slice of `CalcAllPhysical` when the controller implements
/// it (spec §4.6 "Forward transform").
pub fn calc_physical_one(
    session: &ControllerSession,
    motor_role_index: usize,
    pseudo_positions: &[f64],
) -> PoolResult<f64> {
    if let Some(all) = session.calc_all_physical(pseudo_positions)? {
        return all
            .get(motor_role_index)
            .copied()
            .ok_or(PoolError::OperationNotSupported);
    }
    session.calc_physical(motor_role_index as i32 + 1, pseudo_positions)
}

/// `CalcAllPhysical`, falling back to iterating `CalcPhysical` per motor
/// role when the controller doesn't implement the bulk form (spec §9 open
/// question, resolved: "fall back on per-role iteration").
pub fn calc_all_physical(
    session: &ControllerSession,
    motor_role_count: usize,
    pseudo_positions: &[f64],
) -> PoolResult<Vec<f64>> {
    if let Some(all) = session.calc_all_physical(pseudo_positions)? {
        return Ok(all);
    }
    (0..motor_role_count)
        .map(|i| session.calc_physical(i as i32 + 1, pseudo_positions))
        .collect()
}

/// `CalcAllPseudo`, falling back to per-role `CalcPseudo` iteration.
pub fn calc_all_pseudo(
    session: &ControllerSession,
    pseudo_role_count: usize,
    physical_positions: &[f64],
) -> PoolResult<Vec<f64>> {
    if let Some(all) = session.calc_all_pseudo(physical_positions)? {
        return Ok(all);
    }
    (0..pseudo_role_count)
        .map(|i| session.calc_pseudo(i as i32 + 1, physical_positions))
        .collect()
}

/// The merged result of decomposing a group move: every physical motor's
/// final target, partitioned by the controller session that owns it.
pub type DecomposedMove = HashMap<ElementId, HashMap<ElementId, f64>>;

/// Decompose a motor-group move into per-controller physical-motor targets
/// (spec §4.6 steps 1-3, §4.7 step 1).
///
/// `user_elements` and `targets` are parallel: each user-facing moveable
/// (motor, pseudo-motor, or nested group) paired with the position it was
/// asked to reach.
pub fn calc_move(
    registry: &Registry,
    sessions: &SessionTable,
    user_elements: &[ElementId],
    targets: &[f64],
) -> PoolResult<DecomposedMove> {
    let mut merged = DecomposedMove::new();
    // role_index -> requested target, per pseudo-motor controller.
    let mut pseudo_requests: HashMap<ElementId, HashMap<usize, f64>> = HashMap::new();

    for (&elem_id, &target) in user_elements.iter().zip(targets.iter()) {
        let handle = registry.get(elem_id)?;
        let record = handle.read();
        match &record.kind {
            ElementKind::Motor(_) => {
                insert_target(&mut merged, registry, elem_id, target)?;
            }
            ElementKind::PseudoMotor(pm) => {
                let ctrl_id = record.base.ctrl_id.ok_or(PoolError::NotFound(elem_id))?;
                pseudo_requests
                    .entry(ctrl_id)
                    .or_default()
                    .insert(pm.role_index, target);
            }
            ElementKind::MotorGroup(sub) => {
                let sub_ids = sub.user_elements.clone();
                drop(record);
                // A nested group shares the single incoming target across
                // all of its own user elements only when it too has arity
                // one; groups of arity > 1 must be targeted directly.
                let sub_targets = vec![target; sub_ids.len()];
                let nested = calc_move(registry, sessions, &sub_ids, &sub_targets)?;
                for (ctrl_id, per_ctrl) in nested {
                    let out = merged.entry(ctrl_id).or_default();
                    for (motor_id, motor_target) in per_ctrl {
                        merge_one(out, motor_id, motor_target)?;
                    }
                }
            }
            _ => {
                return Err(PoolError::WrongType {
                    id: elem_id,
                    expected: ElementType::Motor,
                    actual: record.element_type(),
                })
            }
        }
    }

    let mut ctrl_ids: Vec<ElementId> = pseudo_requests.keys().copied().collect();
    ctrl_ids.sort();
    for ctrl_id in ctrl_ids {
        let requests = pseudo_requests.remove(&ctrl_id).unwrap();
        let session = sessions.get(ctrl_id)?;

        // Any sibling carries the shared motor-role table for this
        // controller's hidden motor group.
        let siblings_handle = registry.list_by_type(ElementType::PseudoMotor);
        let mut motor_roles: Option<Vec<ElementId>> = None;
        let mut sibling_count = requests.keys().copied().max().map(|m| m + 1).unwrap_or(0);
        let mut current_pseudo_positions: Vec<f64> = Vec::new();
        for pm_id in &siblings_handle {
            let handle = registry.get(*pm_id)?;
            let r = handle.read();
            if r.base.ctrl_id != Some(ctrl_id) {
                continue;
            }
            if let ElementKind::PseudoMotor(pm) = &r.kind {
                if motor_roles.is_none() {
                    motor_roles = Some(pm.motor_roles.clone());
                    sibling_count = sibling_count.max(pm.siblings.len());
                    current_pseudo_positions = vec![0.0; pm.siblings.len()];
                }
                if pm.role_index < current_pseudo_positions.len() {
                    current_pseudo_positions[pm.role_index] = pm.last_position.unwrap_or(0.0);
                }
            }
        }
        let motor_roles = motor_roles.ok_or(PoolError::NotFound(ctrl_id))?;
        if current_pseudo_positions.len() < sibling_count {
            current_pseudo_positions.resize(sibling_count, 0.0);
        }

        // Step 2: fill missing pseudo-roles from the current value (spec
        // §4.6 step 2, resolved per §9: "fill from current value").
        let mut pseudo_positions = current_pseudo_positions;
        for (&role_index, &value) in &requests {
            if role_index < pseudo_positions.len() {
                pseudo_positions[role_index] = value;
            }
        }

        // Step 3: CalcAllPhysical merges into the output.
        let physical_targets = calc_all_physical(&session, motor_roles.len(), &pseudo_positions)?;
        let out = merged.entry(ctrl_id).or_default();
        for (motor_id, motor_target) in motor_roles.into_iter().zip(physical_targets) {
            merge_one(out, motor_id, motor_target)?;
        }
    }

    Ok(merged)
}

fn merge_one(
    out: &mut HashMap<ElementId, f64>,
    motor_id: ElementId,
    target: f64,
) -> PoolResult<()> {
    if let Some(existing) = out.get(&motor_id) {
        if (existing - target).abs() > AMBIGUOUS_MOVE_EPSILON {
            return Err(PoolError::AmbiguousMove(motor_id));
        }
    } else {
        out.insert(motor_id, target);
    }
    Ok(())
}

fn insert_target(
    merged: &mut DecomposedMove,
    registry: &Registry,
    motor_id: ElementId,
    target: f64,
) -> PoolResult<()> {
    let handle = registry.get(motor_id)?;
    let ctrl_id = handle.read().base.ctrl_id.ok_or(PoolError::NotFound(motor_id))?;
    let out = merged.entry(ctrl_id).or_default();
    merge_one(out, motor_id, target)
}

//! Full-name grammar (spec §6).
//!
//! Per-axis elements: `⟨type-prefix⟩/⟨instance⟩/⟨axis⟩`. Instruments use
//! `/` as a path separator, are of the form
//! `⟨parent-path⟩/⟨leaf⟩(⟨type⟩)`, and must start with `/`.

use crate::elements::ElementType;
use crate::error::{PoolError, PoolResult};

fn type_prefix(ty: ElementType) -> &'static str {
    match ty {
        ElementType::Controller => "controller",
        ElementType::Motor => "motor",
        ElementType::PseudoMotor => "pseudomotor",
        ElementType::CounterTimer => "countertimer",
        ElementType::ZeroD => "zerod",
        ElementType::OneD => "oned",
        ElementType::TwoD => "twod",
        ElementType::PseudoCounter => "pseudocounter",
        ElementType::MotorGroup => "motorgroup",
        ElementType::MeasurementGroup => "measurementgroup",
        ElementType::Communication => "communication",
        ElementType::IORegister => "ioregister",
        ElementType::Instrument => "instrument",
        ElementType::Constraint => "constraint",
    }
}

/// Build `pool/⟨type-prefix⟩/⟨instance⟩/⟨axis⟩` for a per-axis element
/// (spec §6).
pub fn per_axis_full_name(ty: ElementType, instance: &str, axis: i32) -> String {
    format!("pool/{}/{instance}/{axis}", type_prefix(ty))
}

/// Build a non-per-axis element's full name: `pool/⟨type-prefix⟩/⟨name⟩`.
pub fn element_full_name(ty: ElementType, name: &str) -> String {
    format!("pool/{}/{name}", type_prefix(ty))
}

/// Build an instrument's full name from its parent path, leaf name, and
/// instrument type tag: `⟨parent-path⟩/⟨leaf⟩(⟨type⟩)` (spec §6).
pub fn instrument_full_name(parent_path: &str, leaf: &str, instrument_type: &str) -> PoolResult<String> {
    if !parent_path.starts_with('/') {
        return Err(PoolError::InvalidInstrumentName(parent_path.to_string()));
    }
    if parent_path == "/" {
        Ok(format!("/{leaf}({instrument_type})"))
    } else {
        Ok(format!("{parent_path}/{leaf}({instrument_type})"))
    }
}

/// Validate a bare instrument name as accepted from a client: must start
/// with `/` (spec §6).
pub fn validate_instrument_name(name: &str) -> PoolResult<()> {
    if name.starts_with('/') {
        Ok(())
    } else {
        Err(PoolError::InvalidInstrumentName(name.to_string()))
    }
}

/// Split an instrument full name into its parent path and leaf `(type)`
/// suffix, the inverse of `instrument_full_name`.
pub fn split_instrument_leaf(full_name: &str) -> Option<(&str, &str)> {
    let slash = full_name.rfind('/')?;
    if slash == 0 {
        Some(("/", &full_name[1..]))
    } else {
        Some((&full_name[..slash], &full_name[slash + 1..]))
    }
}

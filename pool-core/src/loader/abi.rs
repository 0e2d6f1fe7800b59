//! The plug-in ABI (spec §6 "Plug-in contract"): the capability surface a
//! loaded controller class exposes, and the metadata the loader extracts
//! from it at load time (spec §4.2).

use std::sync::Arc;

use crate::elements::{AxisState, ChannelValue};
use crate::error::PoolResult;
use crate::property::{PropertySchema, PropertyValue};

/// The declared category of a controller class (spec §4.2's discovery
/// list). `Constraint` classes carry no capability methods of their own in
/// this crate; they are discovered and loaded but never instantiated as a
/// `ControllerInstance`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControllerCategory {
    Motor,
    PseudoMotor,
    CounterTimer,
    ZeroD,
    OneD,
    TwoD,
    PseudoCounter,
    Communication,
    IORegister,
    Constraint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtraAttributeAccess {
    Read,
    ReadWrite,
}

#[derive(Debug, Clone)]
pub struct ExtraAttributeDescriptor {
    pub name: String,
    pub ty: crate::property::PropertyType,
    pub access: ExtraAttributeAccess,
}

/// Pseudo-element role metadata (spec §4.2: "role tables").
#[derive(Debug, Clone, Default)]
pub struct RoleTable {
    pub physical_roles: Vec<String>,
    pub pseudo_roles: Vec<String>,
}

/// An I/O-register predefined value: a named integer the controller accepts
/// in place of a raw write value (spec §4.2).
#[derive(Debug, Clone)]
pub struct PredefinedValue {
    pub name: String,
    pub value: i64,
}

/// Everything the loader extracts from a loaded class (spec §4.2).
#[derive(Debug, Clone)]
pub struct ControllerDescriptor {
    pub class_name: String,
    pub category: ControllerCategory,
    pub description: String,
    pub gender: String,
    pub model: String,
    pub organization: String,
    pub property_schema: PropertySchema,
    pub max_device: Option<i32>,
    pub extra_attributes: Vec<ExtraAttributeDescriptor>,
    pub roles: RoleTable,
    pub predefined_values: Vec<PredefinedValue>,
}

impl ControllerDescriptor {
    pub fn new(class_name: impl Into<String>, category: ControllerCategory) -> Self {
        ControllerDescriptor {
            class_name: class_name.into(),
            category,
            description: String::new(),
            gender: "Generic".to_string(),
            model: "Generic".to_string(),
            organization: "Unknown".to_string(),
            property_schema: PropertySchema::default(),
            max_device: None,
            extra_attributes: Vec::new(),
            roles: RoleTable::default(),
            predefined_values: Vec::new(),
        }
    }
}

/// A live instance of a loaded controller class, bound to one config
/// instance name (spec §6's "constructor `(instance_name, property_array)`"
/// plus the per-category operation sets of §4.4).
///
/// Every method defaults to `OperationNotSupported` so a class only needs
/// to implement the subset its category requires (spec §6's capability
/// table); `crate::controller::ControllerSession` is responsible for never
/// calling a method outside that subset.
pub trait ControllerInstance: Send + Sync {
    fn add_device(&self, _axis: i32) -> PoolResult<()> {
        Ok(())
    }

    fn delete_device(&self, _axis: i32) -> PoolResult<()> {
        Ok(())
    }

    fn state_one(&self, axis: i32) -> PoolResult<AxisState>;

    fn get_extra_attribute_par(&self, _axis: i32, _name: &str) -> PoolResult<PropertyValue> {
        Err(crate::error::PoolError::OperationNotSupported)
    }

    fn set_extra_attribute_par(
        &self,
        _axis: i32,
        _name: &str,
        _value: PropertyValue,
    ) -> PoolResult<()> {
        Err(crate::error::PoolError::OperationNotSupported)
    }

    fn send_to_ctrl(&self, _input: &str) -> PoolResult<String> {
        Err(crate::error::PoolError::OperationNotSupported)
    }

    // --- Motor ------------------------------------------------------------
    fn pre_start_all(&self) -> PoolResult<()> {
        Ok(())
    }

    fn pre_start_one(&self, _axis: i32, _target: f64) -> PoolResult<bool> {
        Ok(true)
    }

    fn start_one(&self, _axis: i32) -> PoolResult<()> {
        Err(crate::error::PoolError::OperationNotSupported)
    }

    fn start_all(&self) -> PoolResult<()> {
        Ok(())
    }

    fn abort_one(&self, _axis: i32) -> PoolResult<()> {
        Err(crate::error::PoolError::OperationNotSupported)
    }

    fn define_position(&self, _axis: i32, _position: f64) -> PoolResult<()> {
        Err(crate::error::PoolError::OperationNotSupported)
    }

    fn read_one_position(&self, _axis: i32) -> PoolResult<f64> {
        Err(crate::error::PoolError::OperationNotSupported)
    }

    fn get_par(&self, _axis: i32, _name: &str) -> PoolResult<PropertyValue> {
        Err(crate::error::PoolError::OperationNotSupported)
    }

    fn set_par(&self, _axis: i32, _name: &str, _value: PropertyValue) -> PoolResult<()> {
        Err(crate::error::PoolError::OperationNotSupported)
    }

    // --- PseudoMotor --------------------------------------------------------
    fn calc_physical(&self, _axis: i32, _pseudo_values: &[f64]) -> PoolResult<f64> {
        Err(crate::error::PoolError::OperationNotSupported)
    }

    fn calc_pseudo(&self, _axis: i32, _physical_values: &[f64]) -> PoolResult<f64> {
        Err(crate::error::PoolError::OperationNotSupported)
    }

    fn calc_all_physical(&self, _pseudo_values: &[f64]) -> PoolResult<Option<Vec<f64>>> {
        Ok(None)
    }

    fn calc_all_pseudo(&self, _physical_values: &[f64]) -> PoolResult<Option<Vec<f64>>> {
        Ok(None)
    }

    // --- CounterTimer / ZeroD / OneD / TwoD --------------------------------
    fn load_one(&self, _axis: i32, _value: f64) -> PoolResult<()> {
        Err(crate::error::PoolError::OperationNotSupported)
    }

    fn read_one_value(&self, _axis: i32) -> PoolResult<ChannelValue> {
        Err(crate::error::PoolError::OperationNotSupported)
    }

    // --- PseudoCounter ------------------------------------------------------
    fn calc(&self, _index: i32, _physical_values: &[f64]) -> PoolResult<f64> {
        Err(crate::error::PoolError::OperationNotSupported)
    }

    // --- Communication ------------------------------------------------------
    fn read_line_one(&self, _axis: i32) -> PoolResult<String> {
        Err(crate::error::PoolError::OperationNotSupported)
    }

    fn write_one_text(&self, _axis: i32, _data: &str) -> PoolResult<usize> {
        Err(crate::error::PoolError::OperationNotSupported)
    }

    fn write_read_one(&self, _axis: i32, _data: &str) -> PoolResult<String> {
        Err(crate::error::PoolError::OperationNotSupported)
    }

    // --- IORegister --------------------------------------------------------
    fn write_one_int(&self, _axis: i32, _value: i64) -> PoolResult<()> {
        Err(crate::error::PoolError::OperationNotSupported)
    }
}

/// Factory side of a loaded class: produces descriptors and instances
/// without the loader needing to know whether the class came from a
/// dynamic library or an in-process registration.
pub trait ControllerClassFactory: Send + Sync {
    fn descriptor(&self) -> ControllerDescriptor;

    fn create(
        &self,
        instance_name: &str,
        properties: &[PropertyValue],
    ) -> PoolResult<Arc<dyn ControllerInstance>>;
}

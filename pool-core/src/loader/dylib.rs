//! The dynamic-library loader backend (spec §4.2, §6; spec §9's "a narrow
//! C-style vtable"). Opens a `cdylib`-compiled controller file and resolves
//! a single exported symbol, `pool_controller_descriptor`, which must
//! return a pointer to a `RawControllerDescriptor` describing every class
//! the file exposes plus a `RawControllerVTable` of `extern "C"` function
//! pointers per class. Gated behind the `dylib-backend` feature so the rest
//! of the crate, and every test, never needs an actual native library.

use std::collections::HashMap;
use std::ffi::{c_char, c_double, c_int, c_void, CStr};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use libloading::{Library, Symbol};

use super::abi::{
    ControllerCategory, ControllerDescriptor, ControllerInstance, ExtraAttributeAccess,
    ExtraAttributeDescriptor, PredefinedValue, RoleTable,
};
use super::ControllerBackend;
use crate::elements::{AxisState, ChannelValue};
use crate::error::{PoolError, PoolResult};
use crate::property::{PropertySchema, PropertyType, PropertyValue};

const DESCRIPTOR_SYMBOL: &[u8] = b"pool_controller_descriptor";

/// The ABI entry point every controller `cdylib` must export.
type DescriptorFn = unsafe extern "C" fn() -> *const RawControllerDescriptor;

#[repr(C)]
struct RawPropertyDescriptor {
    name: *const c_char,
    type_tag: c_int,
    description: *const c_char,
    has_default: c_int,
    default_text: *const c_char,
}

#[repr(C)]
struct RawExtraAttribute {
    name: *const c_char,
    type_tag: c_int,
    read_write: c_int,
}

#[repr(C)]
struct RawVTable {
    state_one: Option<unsafe extern "C" fn(*mut c_void, c_int) -> c_int>,
    start_one: Option<unsafe extern "C" fn(*mut c_void, c_int) -> c_int>,
    abort_one: Option<unsafe extern "C" fn(*mut c_void, c_int) -> c_int>,
    read_one_position: Option<unsafe extern "C" fn(*mut c_void, c_int, *mut c_double) -> c_int>,
    load_one: Option<unsafe extern "C" fn(*mut c_void, c_int, c_double) -> c_int>,
    calc_physical:
        Option<unsafe extern "C" fn(*mut c_void, c_int, *const c_double, c_int, *mut c_double) -> c_int>,
    calc_pseudo:
        Option<unsafe extern "C" fn(*mut c_void, c_int, *const c_double, c_int, *mut c_double) -> c_int>,
}

#[repr(C)]
struct RawClass {
    class_name: *const c_char,
    category: c_int,
    description: *const c_char,
    gender: *const c_char,
    model: *const c_char,
    organization: *const c_char,
    properties: *const RawPropertyDescriptor,
    property_count: c_int,
    max_device: c_int,
    extra_attributes: *const RawExtraAttribute,
    extra_attribute_count: c_int,
    vtable: RawVTable,
    instantiate: Option<
        unsafe extern "C" fn(*const c_char, *const *const c_char, c_int) -> *mut c_void,
    >,
}

#[repr(C)]
struct RawControllerDescriptor {
    classes: *const RawClass,
    class_count: c_int,
}

unsafe fn c_str(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    CStr::from_ptr(ptr).to_string_lossy().into_owned()
}

fn category_from_tag(tag: c_int) -> Option<ControllerCategory> {
    Some(match tag {
        0 => ControllerCategory::Motor,
        1 => ControllerCategory::PseudoMotor,
        2 => ControllerCategory::CounterTimer,
        3 => ControllerCategory::ZeroD,
        4 => ControllerCategory::OneD,
        5 => ControllerCategory::TwoD,
        6 => ControllerCategory::PseudoCounter,
        7 => ControllerCategory::Communication,
        8 => ControllerCategory::IORegister,
        9 => ControllerCategory::Constraint,
        _ => return None,
    })
}

fn property_type_from_tag(tag: c_int) -> Option<PropertyType> {
    Some(match tag {
        0 => PropertyType::Bool,
        1 => PropertyType::Int32,
        2 => PropertyType::Float64,
        3 => PropertyType::String,
        4 => PropertyType::BoolArray,
        5 => PropertyType::Int32Array,
        6 => PropertyType::Float64Array,
        7 => PropertyType::StringArray,
        _ => return None,
    })
}

struct LoadedClass {
    descriptor: ControllerDescriptor,
    vtable: RawVTable,
    instantiate: unsafe extern "C" fn(*const c_char, *const *const c_char, c_int) -> *mut c_void,
}

/// An opened controller file. Holds the `Library` alive for as long as any
/// instance created from it exists.
pub struct DylibBackend {
    path: PathBuf,
    _library: Library,
    classes: HashMap<String, LoadedClass>,
}

impl DylibBackend {
    /// Open `path` and extract every class it declares (spec §4.2
    /// "Loading").
    pub fn open(path: impl Into<PathBuf>) -> PoolResult<Self> {
        let path = path.into();
        let library = unsafe { Library::new(&path) }.map_err(|e| PoolError::LoadFailure {
            file: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let descriptor_fn: Symbol<DescriptorFn> =
            unsafe { library.get(DESCRIPTOR_SYMBOL) }.map_err(|_| {
                PoolError::ClassMissingRequiredSymbol {
                    file: path.display().to_string(),
                    class: String::new(),
                    symbol: "pool_controller_descriptor",
                }
            })?;
        let raw = unsafe { descriptor_fn() };
        if raw.is_null() {
            return Err(PoolError::LoadFailure {
                file: path.display().to_string(),
                reason: "pool_controller_descriptor returned null".to_string(),
            });
        }
        let classes = unsafe { extract_classes(&path, raw)? };
        Ok(DylibBackend {
            path,
            _library: library,
            classes,
        })
    }

    fn file_label(&self) -> String {
        self.path.display().to_string()
    }
}

unsafe fn extract_classes(
    path: &Path,
    raw: *const RawControllerDescriptor,
) -> PoolResult<HashMap<String, LoadedClass>> {
    let desc = &*raw;
    let mut out = HashMap::new();
    for i in 0..desc.class_count {
        let raw_class = &*desc.classes.add(i as usize);
        let class_name = c_str(raw_class.class_name);
        let category = category_from_tag(raw_class.category).ok_or_else(|| {
            PoolError::LoadFailure {
                file: path.display().to_string(),
                reason: format!("class {class_name:?} declares an unknown category tag"),
            }
        })?;
        let mut schema = PropertySchema::default();
        for j in 0..raw_class.property_count {
            let p = &*raw_class.properties.add(j as usize);
            let ty = property_type_from_tag(p.type_tag).ok_or_else(|| {
                PoolError::UnknownPropertyType(c_str(p.name), format!("tag {}", p.type_tag))
            })?;
            let default = if p.has_default != 0 {
                let text = c_str(p.default_text);
                Some(
                    crate::property::deserialize_value(&text, ty).ok_or_else(|| {
                        PoolError::InvalidPropertyDefault {
                            property: c_str(p.name),
                            expected: ty.name(),
                        }
                    })?,
                )
            } else {
                None
            };
            schema.entries.push(crate::property::PropertyDescriptor {
                name: c_str(p.name),
                ty,
                description: c_str(p.description),
                default,
            });
        }
        let mut extra_attributes = Vec::new();
        for j in 0..raw_class.extra_attribute_count {
            let e = &*raw_class.extra_attributes.add(j as usize);
            let ty = property_type_from_tag(e.type_tag).ok_or_else(|| {
                PoolError::InvalidExtraAttributeDecl(c_str(e.name))
            })?;
            extra_attributes.push(ExtraAttributeDescriptor {
                name: c_str(e.name),
                ty,
                access: if e.read_write != 0 {
                    ExtraAttributeAccess::ReadWrite
                } else {
                    ExtraAttributeAccess::Read
                },
            });
        }
        let descriptor = ControllerDescriptor {
            class_name: class_name.clone(),
            category,
            description: c_str(raw_class.description),
            gender: c_str(raw_class.gender),
            model: c_str(raw_class.model),
            organization: c_str(raw_class.organization),
            property_schema: schema,
            max_device: if raw_class.max_device < 0 {
                None
            } else {
                Some(raw_class.max_device)
            },
            extra_attributes,
            roles: RoleTable::default(),
            predefined_values: Vec::<PredefinedValue>::new(),
        };
        let instantiate = raw_class.instantiate.ok_or_else(|| {
            PoolError::ClassMissingRequiredSymbol {
                file: path.display().to_string(),
                class: class_name.clone(),
                symbol: "instantiate",
            }
        })?;
        out.insert(
            class_name,
            LoadedClass {
                descriptor,
                vtable: RawVTable {
                    state_one: raw_class.vtable.state_one,
                    start_one: raw_class.vtable.start_one,
                    abort_one: raw_class.vtable.abort_one,
                    read_one_position: raw_class.vtable.read_one_position,
                    load_one: raw_class.vtable.load_one,
                    calc_physical: raw_class.vtable.calc_physical,
                    calc_pseudo: raw_class.vtable.calc_pseudo,
                },
                instantiate,
            },
        );
    }
    Ok(out)
}

impl ControllerBackend for DylibBackend {
    fn classes(&self) -> Vec<String> {
        self.classes.keys().cloned().collect()
    }

    fn descriptor(&self, class_name: &str) -> PoolResult<ControllerDescriptor> {
        self.classes
            .get(class_name)
            .map(|c| c.descriptor.clone())
            .ok_or_else(|| PoolError::ClassMissingRequiredSymbol {
                file: self.file_label(),
                class: class_name.to_string(),
                symbol: "pool_controller_descriptor",
            })
    }

    fn instantiate(
        &self,
        class_name: &str,
        instance_name: &str,
        properties: &[PropertyValue],
    ) -> PoolResult<Arc<dyn ControllerInstance>> {
        let class = self.classes.get(class_name).ok_or_else(|| {
            PoolError::ClassMissingRequiredSymbol {
                file: self.file_label(),
                class: class_name.to_string(),
                symbol: "pool_controller_descriptor",
            }
        })?;
        let serialized: Vec<std::ffi::CString> = properties
            .iter()
            .map(|v| {
                std::ffi::CString::new(crate::property::serialize_value(v)).unwrap_or_default()
            })
            .collect();
        let pointers: Vec<*const c_char> = serialized.iter().map(|c| c.as_ptr()).collect();
        let name = std::ffi::CString::new(instance_name).unwrap_or_default();
        let handle = unsafe {
            (class.instantiate)(name.as_ptr(), pointers.as_ptr(), pointers.len() as c_int)
        };
        if handle.is_null() {
            return Err(PoolError::LoadFailure {
                file: self.file_label(),
                reason: format!("{class_name} constructor returned null for {instance_name:?}"),
            });
        }
        Ok(Arc::new(DylibControllerInstance {
            handle,
            vtable: RawVTable {
                state_one: class.vtable.state_one,
                start_one: class.vtable.start_one,
                abort_one: class.vtable.abort_one,
                read_one_position: class.vtable.read_one_position,
                load_one: class.vtable.load_one,
                calc_physical: class.vtable.calc_physical,
                calc_pseudo: class.vtable.calc_pseudo,
            },
        }))
    }

    fn reload(&mut self) -> PoolResult<()> {
        let fresh = DylibBackend::open(self.path.clone())?;
        self.classes = fresh.classes;
        self._library = fresh._library;
        Ok(())
    }
}

/// A live controller instance backed by a raw opaque pointer handed back by
/// the plug-in's constructor, dispatched through the class's `RawVTable`.
struct DylibControllerInstance {
    handle: *mut c_void,
    vtable: RawVTable,
}

// The plug-in contract requires the opaque handle to be safe to call from
// any thread holding the class lock (spec §5); the class lock, not this
// type, is what serializes access.
unsafe impl Send for DylibControllerInstance {}
unsafe impl Sync for DylibControllerInstance {}

fn state_from_tag(tag: c_int) -> AxisState {
    match tag {
        0 => AxisState::On,
        1 => AxisState::Moving,
        2 => AxisState::Alarm,
        3 => AxisState::Fault,
        4 => AxisState::Disabled,
        5 => AxisState::Open,
        6 => AxisState::Closed,
        _ => AxisState::Unknown,
    }
}

impl ControllerInstance for DylibControllerInstance {
    fn state_one(&self, axis: i32) -> PoolResult<AxisState> {
        let Some(f) = self.vtable.state_one else {
            return Err(PoolError::OperationNotSupported);
        };
        let tag = unsafe { f(self.handle, axis) };
        if tag < 0 {
            return Err(PoolError::OperationNotSupported);
        }
        Ok(state_from_tag(tag))
    }

    fn start_one(&self, axis: i32) -> PoolResult<()> {
        let Some(f) = self.vtable.start_one else {
            return Err(PoolError::OperationNotSupported);
        };
        if unsafe { f(self.handle, axis) } == 0 {
            Ok(())
        } else {
            Err(PoolError::OperationNotSupported)
        }
    }

    fn abort_one(&self, axis: i32) -> PoolResult<()> {
        let Some(f) = self.vtable.abort_one else {
            return Err(PoolError::OperationNotSupported);
        };
        if unsafe { f(self.handle, axis) } == 0 {
            Ok(())
        } else {
            Err(PoolError::OperationNotSupported)
        }
    }

    fn read_one_position(&self, axis: i32) -> PoolResult<f64> {
        let Some(f) = self.vtable.read_one_position else {
            return Err(PoolError::OperationNotSupported);
        };
        let mut out: c_double = 0.0;
        if unsafe { f(self.handle, axis, &mut out as *mut c_double) } == 0 {
            Ok(out)
        } else {
            Err(PoolError::OperationNotSupported)
        }
    }

    fn load_one(&self, axis: i32, value: f64) -> PoolResult<()> {
        let Some(f) = self.vtable.load_one else {
            return Err(PoolError::OperationNotSupported);
        };
        if unsafe { f(self.handle, axis, value) } == 0 {
            Ok(())
        } else {
            Err(PoolError::OperationNotSupported)
        }
    }

    fn read_one_value(&self, _axis: i32) -> PoolResult<ChannelValue> {
        Err(PoolError::OperationNotSupported)
    }

    fn calc_physical(&self, axis: i32, pseudo_values: &[f64]) -> PoolResult<f64> {
        let Some(f) = self.vtable.calc_physical else {
            return Err(PoolError::OperationNotSupported);
        };
        let mut out: c_double = 0.0;
        let rc = unsafe {
            f(
                self.handle,
                axis,
                pseudo_values.as_ptr(),
                pseudo_values.len() as c_int,
                &mut out as *mut c_double,
            )
        };
        if rc == 0 {
            Ok(out)
        } else {
            Err(PoolError::OperationNotSupported)
        }
    }

    fn calc_pseudo(&self, axis: i32, physical_values: &[f64]) -> PoolResult<f64> {
        let Some(f) = self.vtable.calc_pseudo else {
            return Err(PoolError::OperationNotSupported);
        };
        let mut out: c_double = 0.0;
        let rc = unsafe {
            f(
                self.handle,
                axis,
                physical_values.as_ptr(),
                physical_values.len() as c_int,
                &mut out as *mut c_double,
            )
        };
        if rc == 0 {
            Ok(out)
        } else {
            Err(PoolError::OperationNotSupported)
        }
    }
}

//! A backend that registers controller classes directly as
//! `Arc<dyn ControllerClassFactory>`, with no dynamic loading. Mirrors the
//! original implementation's separation between *locating a class* and
//! *instantiating it* (`sandbox/PoolPlugin.cpp`'s file/class indirection)
//! without needing an actual file on disk. Used by tests and the seed
//! scenarios of spec §8.

use std::collections::HashMap;
use std::sync::Arc;

use super::abi::{ControllerClassFactory, ControllerDescriptor, ControllerInstance};
use super::ControllerBackend;
use crate::error::{PoolError, PoolResult};
use crate::property::PropertyValue;

pub struct InProcessBackend {
    classes: HashMap<String, Arc<dyn ControllerClassFactory>>,
}

impl InProcessBackend {
    pub fn new() -> Self {
        InProcessBackend {
            classes: HashMap::new(),
        }
    }

    pub fn with_class(mut self, class_name: impl Into<String>, factory: Arc<dyn ControllerClassFactory>) -> Self {
        self.classes.insert(class_name.into(), factory);
        self
    }
}

impl Default for InProcessBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ControllerBackend for InProcessBackend {
    fn classes(&self) -> Vec<String> {
        self.classes.keys().cloned().collect()
    }

    fn descriptor(&self, class_name: &str) -> PoolResult<ControllerDescriptor> {
        self.classes
            .get(class_name)
            .map(|f| f.descriptor())
            .ok_or_else(|| PoolError::ClassMissingRequiredSymbol {
                file: "<in-process>".to_string(),
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
        let factory = self.classes.get(class_name).ok_or_else(|| {
            PoolError::ClassMissingRequiredSymbol {
                file: "<in-process>".to_string(),
                class: class_name.to_string(),
                symbol: "pool_controller_descriptor",
            }
        })?;
        factory.create(instance_name, properties)
    }

    fn reload(&mut self) -> PoolResult<()> {
        // Nothing to reopen; the factories are already live Rust values.
        // A controller author wanting reload semantics under test swaps the
        // registered factory and calls `Loader::reload` to bump the file
        // record's generation.
        Ok(())
    }
}

//! Controller Plug-in Loader (spec §4.2, component C2).
//!
//! A *controller file* is addressed by a relative file name plus the
//! search path (`pool_path`, spec §6). This module is generic over a
//! `ControllerBackend` so the same discovery/class-lock machinery serves
//! both the production `DylibBackend` and the test-only `InProcessBackend`
//! (spec §4.2 "(added) Concrete loading mechanism").

pub mod abi;
#[cfg(feature = "dylib-backend")]
pub mod dylib;
pub mod in_process;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::{ReentrantMutex, RwLock};

pub use abi::{
    ControllerCategory, ControllerClassFactory, ControllerDescriptor, ControllerInstance,
};
pub use in_process::InProcessBackend;

use crate::error::{PoolError, PoolResult};
use crate::property::PropertyValue;

/// A loaded unit of controller code: resolves class names to descriptors
/// and instantiates them. One production implementation (`DylibBackend`)
/// and one in-process test implementation (`InProcessBackend`) exist; the
/// loader itself never distinguishes them beyond this trait.
pub trait ControllerBackend: Send + Sync {
    fn classes(&self) -> Vec<String>;
    fn descriptor(&self, class_name: &str) -> PoolResult<ControllerDescriptor>;
    fn instantiate(
        &self,
        class_name: &str,
        instance_name: &str,
        properties: &[PropertyValue],
    ) -> PoolResult<Arc<dyn ControllerInstance>>;
    /// Close and reopen the underlying code, preserving this backend's slot
    /// (spec §4.2 "Reload").
    fn reload(&mut self) -> PoolResult<()>;
}

/// One loaded class, with its own reentrant lock: every entry into that
/// class's plug-in code goes through this lock (spec §4.2 "Concurrency
/// control", spec §5).
struct ClassRecord {
    descriptor: ControllerDescriptor,
    lock: Arc<ReentrantMutex<()>>,
}

/// One loaded controller file and the classes it currently exposes.
struct FileRecord {
    backend: Box<dyn ControllerBackend>,
    classes: HashMap<String, ClassRecord>,
    /// Bumped on every successful reload; surfaced for diagnostics and by
    /// the hot-reload orchestrator's history entries (spec §4.9).
    generation: u64,
}

impl FileRecord {
    fn rebuild_classes(backend: &dyn ControllerBackend) -> PoolResult<HashMap<String, ClassRecord>> {
        let mut classes = HashMap::new();
        for name in backend.classes() {
            let descriptor = backend.descriptor(&name)?;
            classes.insert(
                name,
                ClassRecord {
                    descriptor,
                    lock: Arc::new(ReentrantMutex::new(())),
                },
            );
        }
        Ok(classes)
    }
}

/// The loader's process-wide state: every file record it has opened,
/// keyed by the file name it was discovered/registered under.
pub struct Loader {
    pool_path: Vec<PathBuf>,
    files: RwLock<HashMap<String, FileRecord>>,
}

impl Loader {
    pub fn new(pool_path: Vec<PathBuf>) -> Self {
        Loader {
            pool_path,
            files: RwLock::new(HashMap::new()),
        }
    }

    /// Resolve `file_name` against the search path, returning the first
    /// match (spec §4.2 "Discovery": "first match wins" per §6).
    pub fn resolve_file(&self, file_name: &str) -> PoolResult<PathBuf> {
        for dir in &self.pool_path {
            let candidate = dir.join(file_name);
            if candidate.is_file() {
                return Ok(candidate);
            }
        }
        Err(PoolError::ControllerFileNotFound(file_name.to_string()))
    }

    /// Register an already-constructed backend under `file_name`, as if it
    /// had been discovered and loaded. Used directly by
    /// `DylibBackend::open` callers and by tests wiring an
    /// `InProcessBackend`.
    pub fn load_backend(
        &self,
        file_name: impl Into<String>,
        backend: Box<dyn ControllerBackend>,
    ) -> PoolResult<()> {
        let classes = FileRecord::rebuild_classes(backend.as_ref())?;
        let file_name = file_name.into();
        log::info!("loaded controller file {file_name:?} ({} classes)", classes.len());
        self.files.write().insert(
            file_name,
            FileRecord {
                backend,
                classes,
                generation: 0,
            },
        );
        Ok(())
    }

    /// Discover and open a native controller file for `category` (spec
    /// §4.2 "Discovery"/"Loading"). Requires the `dylib-backend` feature.
    #[cfg(feature = "dylib-backend")]
    pub fn discover_dylib(
        &self,
        file_name: &str,
        category: ControllerCategory,
    ) -> PoolResult<()> {
        let path = self.resolve_file(file_name)?;
        let backend = dylib::DylibBackend::open(path)?;
        let classes = FileRecord::rebuild_classes(&backend)?;
        for class in classes.values() {
            if class.descriptor.category != category {
                return Err(PoolError::LoadFailure {
                    file: file_name.to_string(),
                    reason: format!(
                        "class {:?} has category {:?}, expected {:?}",
                        class.descriptor.class_name, class.descriptor.category, category
                    ),
                });
            }
        }
        self.load_backend(file_name.to_string(), Box::new(backend))
    }

    /// The descriptor for a loaded class (spec §4.2's extracted metadata).
    pub fn descriptor(&self, file_name: &str, class_name: &str) -> PoolResult<ControllerDescriptor> {
        let files = self.files.read();
        let file = files
            .get(file_name)
            .ok_or_else(|| PoolError::ControllerFileNotFound(file_name.to_string()))?;
        file.classes
            .get(class_name)
            .map(|c| c.descriptor.clone())
            .ok_or_else(|| PoolError::ClassMissingRequiredSymbol {
                file: file_name.to_string(),
                class: class_name.to_string(),
                symbol: "pool_controller_descriptor",
            })
    }

    /// Instantiate `class_name` from `file_name` as `instance_name`,
    /// returning the live instance plus the class lock every subsequent
    /// plug-in call on it must be taken under (spec §4.2, §5).
    pub fn instantiate(
        &self,
        file_name: &str,
        class_name: &str,
        instance_name: &str,
        properties: &[PropertyValue],
    ) -> PoolResult<(Arc<dyn ControllerInstance>, Arc<ReentrantMutex<()>>)> {
        let (backend_instance, lock) = {
            let files = self.files.read();
            let file = files
                .get(file_name)
                .ok_or_else(|| PoolError::ControllerFileNotFound(file_name.to_string()))?;
            let class = file.classes.get(class_name).ok_or_else(|| {
                PoolError::ClassMissingRequiredSymbol {
                    file: file_name.to_string(),
                    class: class_name.to_string(),
                    symbol: "pool_controller_descriptor",
                }
            })?;
            let lock = class.lock.clone();
            let guard = lock.lock();
            let instance = file.backend.instantiate(class_name, instance_name, properties);
            drop(guard);
            (instance, lock)
        };
        Ok((backend_instance?, lock))
    }

    /// Close and reopen `file_name`'s backend, preserving its slot so
    /// existing controller sessions can be re-pointed at the refreshed
    /// class table (spec §4.2 "Reload"; coordinated by `crate::hotreload`).
    pub fn reload(&self, file_name: &str) -> PoolResult<()> {
        let mut files = self.files.write();
        let file = files
            .get_mut(file_name)
            .ok_or_else(|| PoolError::ControllerFileNotFound(file_name.to_string()))?;
        file.backend.reload()?;
        file.classes = FileRecord::rebuild_classes(file.backend.as_ref())?;
        file.generation += 1;
        log::info!("reloaded controller file {file_name:?} (generation {})", file.generation);
        Ok(())
    }

    pub fn generation(&self, file_name: &str) -> PoolResult<u64> {
        self.files
            .read()
            .get(file_name)
            .map(|f| f.generation)
            .ok_or_else(|| PoolError::ControllerFileNotFound(file_name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::AxisState;
    use crate::property::PropertySchema;

    struct EchoClass;

    struct EchoInstance;

    impl ControllerInstance for EchoInstance {
        fn state_one(&self, _axis: i32) -> PoolResult<AxisState> {
            Ok(AxisState::On)
        }
    }

    impl ControllerClassFactory for EchoClass {
        fn descriptor(&self) -> ControllerDescriptor {
            let mut d = ControllerDescriptor::new("EchoCtrl", ControllerCategory::Motor);
            d.property_schema = PropertySchema::default();
            d
        }

        fn create(
            &self,
            _instance_name: &str,
            _properties: &[PropertyValue],
        ) -> PoolResult<Arc<dyn ControllerInstance>> {
            Ok(Arc::new(EchoInstance))
        }
    }

    #[test]
    fn in_process_round_trip() {
        let loader = Loader::new(Vec::new());
        let backend = InProcessBackend::new().with_class("EchoCtrl", Arc::new(EchoClass));
        loader.load_backend("echo.so", Box::new(backend)).unwrap();

        let descriptor = loader.descriptor("echo.so", "EchoCtrl").unwrap();
        assert_eq!(descriptor.category, ControllerCategory::Motor);

        let (instance, _lock) = loader
            .instantiate("echo.so", "EchoCtrl", "mot01", &[])
            .unwrap();
        assert_eq!(instance.state_one(1).unwrap(), AxisState::On);
    }

    #[test]
    fn unknown_file_is_not_found() {
        let loader = Loader::new(Vec::new());
        assert!(matches!(
            loader.descriptor("missing.so", "X"),
            Err(PoolError::ControllerFileNotFound(_))
        ));
    }
}

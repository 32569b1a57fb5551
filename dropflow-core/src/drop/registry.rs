//! Mapping from `dropclass` identifiers to drop implementations.

use super::app::AppFactory;
use super::io::{FileIo, MemoryIo, NullIo};
use super::object::{DropEnv, DropObject, DropRef, Payload};
use crate::apps;
use crate::error::{DropflowError, Result};
use crate::spec::{DropCategory, DropSpec};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// A drop implementation selectable by `dropclass`.
#[derive(Clone)]
pub enum DropClass {
    /// In-memory data.
    Memory,
    /// File-backed data. The path comes from the `filepath` parameter, or
    /// defaults to `<data_dir>/<session>/<oid>`.
    File,
    /// Data that is counted and discarded.
    Null,
    /// Container of other drops.
    Container,
    /// Application built by a factory.
    Application(Arc<dyn AppFactory>),
}

impl DropClass {
    /// Wrap an application factory.
    pub fn app(factory: impl AppFactory + 'static) -> Self {
        Self::Application(Arc::new(factory))
    }

    /// Category of drops this class produces.
    pub fn category(&self) -> DropCategory {
        match self {
            Self::Memory | Self::File | Self::Null => DropCategory::Data,
            Self::Container => DropCategory::Container,
            Self::Application(_) => DropCategory::Application,
        }
    }

    /// Whether a spec declaring `category` may use this class.
    fn accepts(&self, category: DropCategory) -> bool {
        match self {
            Self::Application(_) => category == DropCategory::Application,
            _ => category != DropCategory::Application,
        }
    }
}

impl fmt::Debug for DropClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory => f.write_str("Memory"),
            Self::File => f.write_str("File"),
            Self::Null => f.write_str("Null"),
            Self::Container => f.write_str("Container"),
            Self::Application(_) => f.write_str("Application(..)"),
        }
    }
}

/// Drop classes known to a session.
///
/// Registries are plain values handed to managers at construction, so
/// different managers (and tests) can carry different classes.
#[derive(Debug, Clone, Default)]
pub struct DropClassRegistry {
    classes: HashMap<String, DropClass>,
}

impl DropClassRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in classes under their short names and
    /// their dotted names.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        let data = [
            (DropClass::Memory, ["memory", "dlg.data.drops.memory.InMemoryDROP"]),
            (DropClass::File, ["file", "dlg.data.drops.file.FileDROP"]),
            (DropClass::Null, ["null", "dlg.data.drops.data_base.NullDROP"]),
            (
                DropClass::Container,
                ["container", "dlg.data.drops.container.ContainerDROP"],
            ),
        ];
        for (class, names) in data {
            for name in names {
                registry.register(name, class.clone());
            }
        }

        let app_classes = [
            (
                DropClass::app(apps::copy_factory),
                ["copy", "dlg.apps.simple.CopyApp"],
            ),
            (
                DropClass::app(apps::sleep_factory),
                ["sleep", "dlg.apps.simple.SleepApp"],
            ),
            (
                DropClass::app(apps::sleep_and_copy_factory),
                ["sleep_and_copy", "dlg.apps.simple.SleepAndCopyApp"],
            ),
            (
                DropClass::app(apps::barrier_factory),
                ["barrier", "dlg.apps.simple.NullBarrierApp"],
            ),
        ];
        for (class, names) in app_classes {
            for name in names {
                registry.register(name, class.clone());
            }
        }
        registry
    }

    /// Register `class` under `name`, replacing any previous entry.
    pub fn register(&mut self, name: impl Into<String>, class: DropClass) -> &mut Self {
        self.classes.insert(name.into(), class);
        self
    }

    /// Look up a class.
    pub fn get(&self, name: &str) -> Option<&DropClass> {
        self.classes.get(name)
    }

    /// Whether `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.classes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Check that `spec` names a registered class of a matching category.
    pub fn validate(&self, spec: &DropSpec) -> Result<&DropClass> {
        let class = self
            .get(spec.dropclass())
            .ok_or_else(|| DropflowError::UnknownDropClass {
                oid: spec.oid().clone(),
                dropclass: spec.dropclass().to_string(),
            })?;
        if !class.accepts(spec.category()) {
            return Err(DropflowError::CategoryMismatch {
                oid: spec.oid().clone(),
                category: spec.category().to_string(),
                dropclass: spec.dropclass().to_string(),
            });
        }
        Ok(class)
    }

    /// Instantiate the drop described by `spec`.
    pub fn build(&self, spec: &DropSpec, env: &DropEnv) -> Result<DropRef> {
        let payload = match self.validate(spec)? {
            DropClass::Memory => Payload::Data(Box::new(MemoryIo::new())),
            DropClass::Null => Payload::Data(Box::new(NullIo::new())),
            DropClass::File => {
                let path = match spec.param("filepath").and_then(|v| v.as_str()) {
                    Some(p) => PathBuf::from(p),
                    None => env
                        .data_dir
                        .join(env.session_id.as_str())
                        .join(spec.oid().as_str()),
                };
                Payload::Data(Box::new(FileIo::new(path)))
            }
            DropClass::Container => Payload::Container,
            DropClass::Application(factory) => Payload::App(factory.create(spec)?),
        };
        Ok(DropObject::new(spec, payload, env))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::InlineDispatcher;

    fn env() -> DropEnv {
        DropEnv::new("s").with_dispatcher(Arc::new(InlineDispatcher))
    }

    #[test]
    fn builtins_answer_to_both_names() {
        let registry = DropClassRegistry::with_builtins();
        for name in [
            "memory",
            "dlg.data.drops.memory.InMemoryDROP",
            "sleep_and_copy",
            "dlg.apps.simple.SleepAndCopyApp",
        ] {
            assert!(registry.contains(name), "{name} missing");
        }
    }

    #[test]
    fn unknown_class_is_rejected() {
        let registry = DropClassRegistry::with_builtins();
        let err = registry
            .build(&DropSpec::data("A", "no.such.Drop"), &env())
            .unwrap_err();
        assert!(matches!(err, DropflowError::UnknownDropClass { .. }));
    }

    #[test]
    fn category_must_match_class() {
        let registry = DropClassRegistry::with_builtins();
        let err = registry
            .build(&DropSpec::data("A", "copy"), &env())
            .unwrap_err();
        assert!(matches!(err, DropflowError::CategoryMismatch { .. }));
        let err = registry
            .build(&DropSpec::app("B", "memory"), &env())
            .unwrap_err();
        assert!(matches!(err, DropflowError::CategoryMismatch { .. }));
    }

    #[test]
    fn file_drops_default_under_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let registry = DropClassRegistry::with_builtins();
        let env = env().with_data_dir(dir.path());
        let drop = registry.build(&DropSpec::data("F", "file"), &env).unwrap();
        drop.write(b"abc").unwrap();
        assert!(dir.path().join("s").join("F").exists());
    }

    #[test]
    fn registries_are_independent() {
        let mut a = DropClassRegistry::new();
        a.register("custom", DropClass::Memory);
        let b = DropClassRegistry::with_builtins();
        assert!(a.contains("custom"));
        assert!(!b.contains("custom"));
        assert_eq!(a.names(), vec!["custom"]);
    }
}

//! Registry of stage constructors.

use crate::stage::{Role, RoleKind, RoleStage, Stage, StageError};
use indexmap::IndexMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Zero-argument factory producing a fresh stage.
pub type Constructor = Arc<dyn Fn() -> Box<dyn Stage> + Send + Sync>;

type RoleMap = RwLock<IndexMap<String, Constructor>>;

/// Registry of stage constructors, one map per pipeline role.
///
/// Keys are case-insensitive and unique per role. Registering an existing
/// key replaces its constructor. Every [`resolve`](Registry::resolve) calls
/// the constructor again, so resolved stages never share state.
///
/// Registration takes `&self`: a registry shared behind an `Arc` can be
/// registered into while other threads resolve from it.
#[derive(Default)]
pub struct Registry {
    transform: RoleMap,
    compression: RoleMap,
    format: RoleMap,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor under `key` for `role`.
    ///
    /// Returns the registry so registrations can be chained.
    pub fn register<R, S, F>(&self, _role: R, key: &str, constructor: F) -> &Self
    where
        R: Role,
        S: Stage + 'static,
        F: Fn() -> S + Send + Sync + 'static,
    {
        self.register_kind(
            R::KIND,
            key,
            Arc::new(move || Box::new(constructor()) as Box<dyn Stage>),
        )
    }

    /// Register an already type-erased constructor for a runtime role.
    pub fn register_kind(&self, role: RoleKind, key: &str, constructor: Constructor) -> &Self {
        let key = key.to_lowercase();
        let previous = self.write(role).insert(key.clone(), constructor);
        if previous.is_some() {
            tracing::debug!(%role, %key, "replaced stage registration");
        }
        self
    }

    /// Build a new stage for `key` in the slot for `R`.
    pub fn resolve<R: Role>(&self, _role: R, key: &str) -> Result<RoleStage<R>, StageError> {
        self.resolve_kind(R::KIND, key).map(RoleStage::from_boxed)
    }

    /// Build a new stage for a runtime role.
    pub fn resolve_kind(&self, role: RoleKind, key: &str) -> Result<Box<dyn Stage>, StageError> {
        let constructor = self
            .read(role)
            .get(&key.to_lowercase())
            .cloned()
            .ok_or_else(|| StageError::StageNotFound {
                role,
                key: key.to_string(),
            })?;
        // Lock released before running caller code.
        Ok(constructor())
    }

    /// Whether `key` is registered for `role`.
    pub fn contains(&self, role: RoleKind, key: &str) -> bool {
        self.read(role).contains_key(&key.to_lowercase())
    }

    /// Registered keys for `role`, in registration order.
    pub fn keys(&self, role: RoleKind) -> Vec<String> {
        self.read(role).keys().cloned().collect()
    }

    /// Total number of registrations across all roles.
    pub fn len(&self) -> usize {
        RoleKind::ALL.iter().map(|r| self.read(*r).len()).sum()
    }

    /// Check if registry is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn map(&self, role: RoleKind) -> &RoleMap {
        match role {
            RoleKind::Transform => &self.transform,
            RoleKind::Compression => &self.compression,
            RoleKind::Format => &self.format,
        }
    }

    // Entries are inserted whole, so a poisoned lock still guards a
    // consistent map.
    fn read(&self, role: RoleKind) -> RwLockReadGuard<'_, IndexMap<String, Constructor>> {
        self.map(role).read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self, role: RoleKind) -> RwLockWriteGuard<'_, IndexMap<String, Constructor>> {
        self.map(role).write().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("transform", &self.keys(RoleKind::Transform))
            .field("compression", &self.keys(RoleKind::Compression))
            .field("format", &self.keys(RoleKind::Format))
            .finish()
    }
}

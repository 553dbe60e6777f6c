//! The contract consumed from a mocking engine, and a bundled in-process engine.
//!
//! Record-set preparation needs exactly two things from a mocking engine: creating a test-double
//! instance of a named type, and arranging a member access on an instance to return a given
//! value. [`MockEngine`] captures that contract; [`Arrangements`] is a small engine that records
//! instances and arrangements in memory, which is all the preparer needs to install record sets
//! into members that cannot be assigned directly.

use std::{
    any::{Any, TypeId},
    collections::HashMap,
    fmt,
    sync::{Arc, PoisonError, RwLock},
};

use tracing::debug;
use uuid::Uuid;

use crate::error::{MocksetError, MocksetResult};

/// Whether members of a test double that were not arranged run their original logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Behavior {
    /// Non-arranged members return default values.
    #[default]
    Loose,
    /// Non-arranged members run their original implementation.
    CallOriginal,
}

/// Identifies one test-double instance created by a [`MockEngine`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MockHandle {
    id: Uuid,
    type_name: &'static str,
    behavior: Behavior,
}

impl MockHandle {
    pub fn new(type_name: &'static str, behavior: Behavior) -> Self {
        Self {
            id: Uuid::new_v4(),
            type_name,
            behavior,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn behavior(&self) -> Behavior {
        self.behavior
    }
}

/// A member access on a test double whose return value can be arranged.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MemberAccess {
    /// A named property getter.
    Property { owner: Uuid, name: String },
    /// The generic "record set by element type" accessor, instantiated for `element`.
    GenericSet { owner: Uuid, element: TypeId },
}

impl MemberAccess {
    pub fn property(owner: &MockHandle, name: impl Into<String>) -> Self {
        MemberAccess::Property {
            owner: owner.id(),
            name: name.into(),
        }
    }

    pub fn generic_set(owner: &MockHandle, element: TypeId) -> Self {
        MemberAccess::GenericSet {
            owner: owner.id(),
            element,
        }
    }

    /// The instance this access is made on.
    pub fn owner(&self) -> Uuid {
        match self {
            MemberAccess::Property { owner, .. } | MemberAccess::GenericSet { owner, .. } => {
                *owner
            }
        }
    }
}

/// A value an arranged member access returns.
pub type ArrangedValue = Arc<dyn Any + Send + Sync>;

/// The mocking engine contract.
pub trait MockEngine: Send + Sync {
    /// Creates a test double of `type_name`.
    fn create_instance(
        &self,
        type_name: &'static str,
        behavior: Behavior,
    ) -> MocksetResult<MockHandle>;

    /// Makes future evaluations of `access` return `value`, replacing any earlier arrangement.
    fn arrange_member_return(&self, access: MemberAccess, value: ArrangedValue)
    -> MocksetResult<()>;

    /// The value currently arranged for `access`.
    fn arranged(&self, access: &MemberAccess) -> Option<ArrangedValue>;

    /// Returns `true` if this engine created the instance `id`.
    fn was_created(&self, id: Uuid) -> bool;
}

/// An in-process mocking engine that records instances and arrangements.
///
/// # Example
///
/// ```ignore
/// let engine = Arrangements::new();
/// let handle = engine.create_instance("Shop", Behavior::Loose)?;
///
/// engine.arrange_member_return(MemberAccess::property(&handle, "name"), Arc::new("demo"))?;
/// assert_eq!(engine.resolve::<&str>(&MemberAccess::property(&handle, "name")), Some("demo"));
/// ```
#[derive(Default)]
pub struct Arrangements {
    instances: RwLock<Vec<MockHandle>>,
    arranged: RwLock<HashMap<MemberAccess, ArrangedValue>>,
}

impl Arrangements {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluates an arranged member access, returning a clone of the arranged value.
    ///
    /// Returns `None` if nothing was arranged or the arranged value is not a `V`.
    pub fn resolve<V: Any + Clone>(&self, access: &MemberAccess) -> Option<V> {
        self.arranged(access)
            .and_then(|value| value.downcast_ref::<V>().cloned())
    }

    /// Evaluates an arranged property getter.
    pub fn resolve_property<V: Any + Clone>(&self, owner: &MockHandle, name: &str) -> Option<V> {
        self.resolve(&MemberAccess::property(owner, name))
    }

    /// Every instance created so far, in creation order.
    pub fn instances(&self) -> Vec<MockHandle> {
        self.instances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of arranged member accesses.
    pub fn arrangement_count(&self) -> usize {
        self.arranged
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl MockEngine for Arrangements {
    fn create_instance(
        &self,
        type_name: &'static str,
        behavior: Behavior,
    ) -> MocksetResult<MockHandle> {
        let handle = MockHandle::new(type_name, behavior);
        debug!(type_name, id = %handle.id(), ?behavior, "created mock instance");

        self.instances
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle.clone());

        Ok(handle)
    }

    fn arrange_member_return(
        &self,
        access: MemberAccess,
        value: ArrangedValue,
    ) -> MocksetResult<()> {
        if !self.was_created(access.owner()) {
            return Err(MocksetError::Configuration(format!(
                "cannot arrange {access:?}: instance {} was not created by this engine",
                access.owner(),
            )));
        }

        debug!(?access, "arranged member return");
        self.arranged
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(access, value);

        Ok(())
    }

    fn arranged(&self, access: &MemberAccess) -> Option<ArrangedValue> {
        self.arranged
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(access)
            .cloned()
    }

    fn was_created(&self, id: Uuid) -> bool {
        self.instances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|handle| handle.id() == id)
    }
}

impl fmt::Debug for Arrangements {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arrangements")
            .field("instances", &self.instances().len())
            .field("arranged", &self.arrangement_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arranged_property_resolves_to_latest_value() {
        let engine = Arrangements::new();
        let handle = engine.create_instance("Shop", Behavior::Loose).unwrap();

        engine
            .arrange_member_return(MemberAccess::property(&handle, "name"), Arc::new(1_i32))
            .unwrap();
        engine
            .arrange_member_return(MemberAccess::property(&handle, "name"), Arc::new(2_i32))
            .unwrap();

        assert_eq!(engine.resolve_property::<i32>(&handle, "name"), Some(2));
        assert_eq!(engine.resolve_property::<String>(&handle, "name"), None);
        assert_eq!(engine.arrangement_count(), 1);
    }

    #[test]
    fn arranging_on_a_foreign_instance_fails() {
        let engine = Arrangements::new();
        let foreign = MockHandle::new("Shop", Behavior::Loose);

        let err = engine
            .arrange_member_return(MemberAccess::property(&foreign, "name"), Arc::new(()))
            .unwrap_err();

        assert!(matches!(err, MocksetError::Configuration(_)));
        assert!(!engine.was_created(foreign.id()));
    }

    #[test]
    fn generic_set_accesses_are_keyed_by_element_type() {
        let engine = Arrangements::new();
        let handle = engine.create_instance("Shop", Behavior::CallOriginal).unwrap();

        engine
            .arrange_member_return(
                MemberAccess::generic_set(&handle, TypeId::of::<u8>()),
                Arc::new("bytes"),
            )
            .unwrap();

        let bytes = MemberAccess::generic_set(&handle, TypeId::of::<u8>());
        let words = MemberAccess::generic_set(&handle, TypeId::of::<u16>());
        assert_eq!(engine.resolve::<&str>(&bytes), Some("bytes"));
        assert_eq!(engine.resolve::<&str>(&words), None);
        assert_eq!(engine.instances(), vec![handle]);
    }
}

//! The record-proxy preparer.
//!
//! Given a record context, the [`Preparer`] installs one freshly created [`RecordSet`] into each of
//! its record-set members. Every record set is itself created through the mocking engine, so it
//! carries a [`MockHandle`] of its own. Writable members are assigned directly; read-only members
//! are installed by arranging the context's getter on the engine to return the record set. When
//! the context exposes the generic "record set by element type" accessor, that accessor is
//! arranged to return the same record set, so both access paths share one store.
//!
//! Preparation is not idempotent by default: preparing the same context again installs new,
//! unrelated record sets. [`PrepareOptions::reuse_existing`] keeps the sets installed earlier by
//! the same engine instead.
//!
//! # Example
//!
//! ```ignore
//! use mockset::prelude::*;
//!
//! #[derive(Default, RecordContext)]
//! #[record_context(set_accessor, readonly(orders = RecordSet<Order>))]
//! struct ShopContext {
//!     people: RecordSet<Person>,
//!     #[mock_handle]
//!     mock: Option<MockHandle>,
//! }
//!
//! let engine = Arrangements::new();
//! let shop = Preparer::new(&engine).create::<ShopContext>()?;
//!
//! shop.people.add(Person { id: 1, name: "A".to_string() });
//!
//! let owner = shop.mock.as_ref().unwrap();
//! assert_eq!(engine.resolve_set::<Person>(owner).unwrap().len(), 1);
//! assert!(engine.resolve_property_set::<Order>(owner, "orders").is_some());
//! ```

use std::any::TypeId;

use tracing::debug;

use mockset_core::{
    context::{
        ElementType, ErasedSet, Installation, MemberSlot, PrepareOptions, RecordContext,
        RecordMember, RecordMemberBinding,
    },
    error::{MocksetError, MocksetResult},
    mock::{Behavior, MemberAccess, MockEngine, MockHandle},
    record::Record,
};

use crate::record_set::RecordSet;

/// Installs record sets into the members of record contexts.
pub struct Preparer<'a> {
    engine: &'a dyn MockEngine,
    options: PrepareOptions,
}

impl<'a> Preparer<'a> {
    pub fn new(engine: &'a dyn MockEngine) -> Self {
        Self {
            engine,
            options: PrepareOptions::default(),
        }
    }

    pub fn with_options(mut self, options: PrepareOptions) -> Self {
        self.options = options;
        self
    }

    /// Creates a context of type `C` through the mocking engine and prepares it.
    pub fn create<C: RecordContext + Default>(&self) -> MocksetResult<C> {
        let handle = self.engine.create_instance(C::context_name(), Behavior::Loose)?;
        let mut context = C::default();
        context.attach_mock(handle);

        self.prepare(&mut context)?;
        Ok(context)
    }

    /// Installs a record set into every record-set member of `context`, in declaration order.
    ///
    /// Members are validated and their record sets created before anything is installed, so a
    /// failed preparation leaves the context's members as they were.
    ///
    /// # Errors
    ///
    /// - [`MocksetError::Configuration`] if the context has read-only members or a generic set
    ///   accessor but was not created through this mocking engine
    /// - any error the mocking engine reports while creating instances or arranging members
    pub fn prepare<C: RecordContext + ?Sized>(
        &self,
        context: &mut C,
    ) -> MocksetResult<Vec<RecordMemberBinding>> {
        let owner = context.mock_handle().cloned();
        let set_accessor = context.exposes_set_accessor();
        let members = context.record_members();

        let arranged = members
            .iter()
            .find(|member| set_accessor || matches!(member.slot, MemberSlot::ReadOnly));
        let owner = match arranged {
            Some(member) => Some(self.require_owner(owner.as_ref(), member.name)?),
            None => None,
        };

        let mut pending = Vec::with_capacity(members.len());
        for member in members {
            let (set, reused) = match &member.slot {
                MemberSlot::Writable(slot) => self.writable_set(slot.current(), member.element)?,
                MemberSlot::ReadOnly => {
                    let owner = self.require_owner(owner, member.name)?;
                    self.read_only_set(owner, member.name, member.element)?
                }
            };
            pending.push((member, set, reused));
        }

        for (member, set, reused) in &pending {
            if matches!(member.slot, MemberSlot::ReadOnly) && !reused {
                let owner = self.require_owner(owner, member.name)?;
                self.engine.arrange_member_return(
                    MemberAccess::property(owner, member.name),
                    set.to_arranged(),
                )?;
            }
            if set_accessor {
                let owner = self.require_owner(owner, member.name)?;
                self.engine.arrange_member_return(
                    MemberAccess::generic_set(owner, member.element.id),
                    set.to_arranged(),
                )?;
            }
        }

        let mut bindings = Vec::with_capacity(pending.len());
        for (
            RecordMember {
                name,
                element,
                slot,
            },
            set,
            reused,
        ) in pending
        {
            let installation = match slot {
                MemberSlot::Writable(slot) => {
                    if !reused {
                        slot.install(set.as_ref())?;
                    }
                    Installation::Assigned
                }
                MemberSlot::ReadOnly => Installation::Arranged,
            };

            debug!(
                member = name,
                record = element.name,
                ?installation,
                reused,
                "installed record set"
            );
            bindings.push(RecordMemberBinding::new(
                name,
                element,
                installation,
                reused,
                set,
            ));
        }

        Ok(bindings)
    }

    fn create_set(&self, element: ElementType) -> MocksetResult<Box<dyn ErasedSet>> {
        let handle = self
            .engine
            .create_instance(element.set_name, Behavior::CallOriginal)?;

        Ok(element.create(handle))
    }

    fn writable_set(
        &self,
        current: &dyn ErasedSet,
        element: ElementType,
    ) -> MocksetResult<(Box<dyn ErasedSet>, bool)> {
        if self.options.reuse_existing && self.created_here(current) {
            return Ok((current.clone_boxed(), true));
        }

        Ok((self.create_set(element)?, false))
    }

    fn read_only_set(
        &self,
        owner: &MockHandle,
        name: &'static str,
        element: ElementType,
    ) -> MocksetResult<(Box<dyn ErasedSet>, bool)> {
        if self.options.reuse_existing {
            let existing = self
                .engine
                .arranged(&MemberAccess::property(owner, name))
                .and_then(|value| element.from_arranged(&value));
            if let Some(set) = existing {
                return Ok((set, true));
            }
        }

        Ok((self.create_set(element)?, false))
    }

    fn created_here(&self, set: &dyn ErasedSet) -> bool {
        set.mock_handle()
            .is_some_and(|handle| self.engine.was_created(handle.id()))
    }

    fn require_owner<'h>(
        &self,
        owner: Option<&'h MockHandle>,
        member: &str,
    ) -> MocksetResult<&'h MockHandle> {
        let owner = owner.ok_or_else(|| {
            MocksetError::Configuration(format!(
                "cannot arrange record set member `{member}`: the context was not created through a mocking engine"
            ))
        })?;

        if !self.engine.was_created(owner.id()) {
            return Err(MocksetError::Configuration(format!(
                "cannot arrange record set member `{member}`: instance {} was not created by this mocking engine",
                owner.id(),
            )));
        }

        Ok(owner)
    }
}

/// Resolves record sets arranged on a mocking engine by the preparer.
pub trait MockEngineExt {
    /// The record set the generic accessor of `owner` returns for element type `T`.
    fn resolve_set<T: Record>(&self, owner: &MockHandle) -> Option<RecordSet<T>>;

    /// The record set the getter `name` of `owner` returns.
    fn resolve_property_set<T: Record>(&self, owner: &MockHandle, name: &str)
    -> Option<RecordSet<T>>;
}

impl<E: MockEngine + ?Sized> MockEngineExt for E {
    fn resolve_set<T: Record>(&self, owner: &MockHandle) -> Option<RecordSet<T>> {
        self.arranged(&MemberAccess::generic_set(owner, TypeId::of::<T>()))
            .and_then(|value| value.downcast_ref::<RecordSet<T>>().cloned())
    }

    fn resolve_property_set<T: Record>(
        &self,
        owner: &MockHandle,
        name: &str,
    ) -> Option<RecordSet<T>> {
        self.arranged(&MemberAccess::property(owner, name))
            .and_then(|value| value.downcast_ref::<RecordSet<T>>().cloned())
    }
}

//! The record-context contract: how a test double exposes its record-set members.
//!
//! A record context is any type holding record sets, typically a test double of a data-access
//! context. Instead of runtime reflection, a context describes its members at compile time
//! through [`RecordContext::record_members`], usually generated by `#[derive(RecordContext)]`.
//! Each member carries an [`ElementType`]: a registry entry able to construct a fresh record set
//! for that member, and to recover one from a value arranged on a mocking engine.

use std::{
    any::{Any, TypeId},
    fmt,
};

use crate::{
    error::MocksetResult,
    mock::{ArrangedValue, MockHandle},
    record::Record,
};

/// A record set with its element type erased.
pub trait ErasedSet: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;

    /// A handle sharing this set's store.
    fn clone_boxed(&self) -> Box<dyn ErasedSet>;

    /// A handle sharing this set's store, as a value a mocking engine can return.
    fn to_arranged(&self) -> ArrangedValue;

    /// The mock instance this set was created as, if any.
    fn mock_handle(&self) -> Option<&MockHandle>;

    /// Returns `true` if both sets share the same backing store.
    fn same_store(&self, other: &dyn ErasedSet) -> bool;

    fn len(&self) -> usize;
}

impl fmt::Debug for dyn ErasedSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErasedSet")
            .field("len", &self.len())
            .field("mock_handle", &self.mock_handle())
            .finish()
    }
}

/// A record-set type the preparer can construct.
pub trait RecordSetType: ErasedSet + Clone + Sized {
    type Record: Record;

    /// Creates an empty record set, owned by the mock instance `handle`.
    fn create(handle: MockHandle) -> Self;
}

/// Registry entry for the element type of a record-set member.
#[derive(Clone, Copy)]
pub struct ElementType {
    /// The record type stored by the member.
    pub id: TypeId,
    /// The record name of the stored type.
    pub name: &'static str,
    /// The record-set type name, as passed to the mocking engine.
    pub set_name: &'static str,
    create: fn(MockHandle) -> Box<dyn ErasedSet>,
    from_arranged: fn(&ArrangedValue) -> Option<Box<dyn ErasedSet>>,
}

impl ElementType {
    /// The registry entry of record-set type `S`.
    pub fn of<S: RecordSetType>() -> Self {
        Self {
            id: TypeId::of::<S::Record>(),
            name: S::Record::record_name(),
            set_name: std::any::type_name::<S>(),
            create: |handle| Box::new(S::create(handle)) as Box<dyn ErasedSet>,
            from_arranged: |value| {
                value
                    .downcast_ref::<S>()
                    .map(|set| Box::new(set.clone()) as Box<dyn ErasedSet>)
            },
        }
    }

    /// Constructs an empty record set of this element type.
    pub fn create(&self, handle: MockHandle) -> Box<dyn ErasedSet> {
        (self.create)(handle)
    }

    /// Recovers a record set of this element type from an arranged value.
    pub fn from_arranged(&self, value: &ArrangedValue) -> Option<Box<dyn ErasedSet>> {
        (self.from_arranged)(value)
    }
}

impl fmt::Debug for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementType")
            .field("name", &self.name)
            .field("set_name", &self.set_name)
            .finish()
    }
}

impl PartialEq for ElementType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.set_name == other.set_name
    }
}

/// A record-set member that can be assigned directly.
pub trait SetSlot: Send {
    /// Replaces the member's value with a handle on `set`.
    fn install(&mut self, set: &dyn ErasedSet) -> MocksetResult<()>;

    /// The member's current value.
    fn current(&self) -> &dyn ErasedSet;
}

/// How a member can be installed.
pub enum MemberSlot<'a> {
    /// The member has a setter.
    Writable(&'a mut dyn SetSlot),
    /// The member is getter-only; its value must be arranged on the mocking engine.
    ReadOnly,
}

impl fmt::Debug for MemberSlot<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemberSlot::Writable(_) => f.write_str("Writable"),
            MemberSlot::ReadOnly => f.write_str("ReadOnly"),
        }
    }
}

/// A record-set member of a context.
#[derive(Debug)]
pub struct RecordMember<'a> {
    pub name: &'static str,
    pub element: ElementType,
    pub slot: MemberSlot<'a>,
}

/// A type exposing record-set members for preparation.
///
/// Usually derived:
///
/// ```ignore
/// #[derive(Default, RecordContext)]
/// #[record_context(set_accessor, readonly(orders = RecordSet<Order>))]
/// struct ShopContext {
///     people: RecordSet<Person>,
///     #[mock_handle]
///     mock: Option<MockHandle>,
/// }
/// ```
pub trait RecordContext: Send {
    /// The type name passed to the mocking engine when creating this context.
    fn context_name() -> &'static str
    where
        Self: Sized;

    /// Every record-set member, in declaration order.
    fn record_members(&mut self) -> Vec<RecordMember<'_>>;

    /// The mock instance this context is, if it was created through a mocking engine.
    fn mock_handle(&self) -> Option<&MockHandle>;

    /// Records the mock instance this context is.
    fn attach_mock(&mut self, handle: MockHandle);

    /// Returns `true` if the context exposes the generic "record set by element type" accessor.
    fn exposes_set_accessor(&self) -> bool {
        false
    }
}

/// How a prepared member received its record set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Installation {
    /// Assigned through the member's setter.
    Assigned,
    /// Arranged on the mocking engine as the getter's return value.
    Arranged,
}

/// The outcome of preparing one member.
#[derive(Debug)]
pub struct RecordMemberBinding {
    pub member: &'static str,
    pub element: ElementType,
    pub installation: Installation,
    /// `true` if an existing record set was kept instead of a new one being created.
    pub reused: bool,
    set: Box<dyn ErasedSet>,
}

impl RecordMemberBinding {
    pub fn new(
        member: &'static str,
        element: ElementType,
        installation: Installation,
        reused: bool,
        set: Box<dyn ErasedSet>,
    ) -> Self {
        Self {
            member,
            element,
            installation,
            reused,
            set,
        }
    }

    /// The installed record set.
    pub fn set(&self) -> &dyn ErasedSet {
        self.set.as_ref()
    }

    /// The installed record set as its concrete type.
    pub fn downcast<S: RecordSetType>(&self) -> Option<&S> {
        self.set.as_any().downcast_ref::<S>()
    }
}

/// Options for record-set preparation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrepareOptions {
    /// Keep record sets already installed by the same engine instead of replacing them.
    pub reuse_existing: bool,
}

impl PrepareOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reuse_existing(mut self, reuse: bool) -> Self {
        self.reuse_existing = reuse;
        self
    }
}

//! Runtime type tokens for function parameters and flow arguments.

use core::any::{Any, TypeId};

/// A type-erased argument passed into a function of the office.
pub type Argument = Box<dyn Any + Send + Sync>;

/// Marker type accepted by [`ArgType::any`].
#[derive(Debug, Clone, Copy)]
pub struct AnyArgument;

/// Identifies the type a function parameter accepts or an argument carries.
///
/// Based on [`TypeId`], so compatibility is type identity. The
/// [`ArgType::any`] token accepts every argument.
///
/// # Example
///
/// ```
/// use keystone_engine::types::ArgType;
///
/// let text = ArgType::of::<String>();
/// assert!(text.accepts(&ArgType::of::<String>()));
/// assert!(!text.accepts(&ArgType::of::<u64>()));
/// assert!(ArgType::any().accepts(&ArgType::of::<u64>()));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArgType {
    type_id: TypeId,
    type_name: &'static str,
}

impl ArgType {
    /// Creates the token for `T`.
    #[must_use]
    pub fn of<T: Any>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: core::any::type_name::<T>(),
        }
    }

    /// Token accepting any argument.
    #[must_use]
    pub fn any() -> Self {
        Self::of::<AnyArgument>()
    }

    /// Returns the underlying `TypeId`.
    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Returns the type name for diagnostics.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Returns `true` for the [`ArgType::any`] token.
    #[must_use]
    pub fn is_any(&self) -> bool {
        self.type_id == TypeId::of::<AnyArgument>()
    }

    /// Returns `true` if a value of type `supplied` may be passed where `self`
    /// is expected.
    #[must_use]
    pub fn accepts(&self, supplied: &ArgType) -> bool {
        self.accepts_type_id(supplied.type_id)
    }

    /// Same as [`accepts`](Self::accepts) for a bare `TypeId`.
    #[must_use]
    pub fn accepts_type_id(&self, supplied: TypeId) -> bool {
        self.is_any() || self.type_id == supplied
    }

    /// Returns `true` if the boxed argument may be passed where `self` is expected.
    #[must_use]
    pub fn accepts_argument(&self, argument: &Argument) -> bool {
        self.accepts_type_id(Any::type_id(&**argument))
    }
}

impl core::fmt::Display for ArgType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.type_name)
    }
}

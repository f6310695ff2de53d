use core::cmp::Ordering;
use core::fmt;
use core::hash::{Hash, Hasher};
use core::marker::PhantomData;
use core::num::NonZeroU32;

/// What an [`Id`] indexes. Only used at the type level.
pub trait IdKind {
    const PREFIX: &'static str;
}

pub mod kind {
    use super::IdKind;

    pub enum Body {}
    pub enum Joint {}
    pub enum Coord {}
    pub enum Constraint {}

    impl IdKind for Body {
        const PREFIX: &'static str = "body";
    }
    impl IdKind for Joint {
        const PREFIX: &'static str = "joint";
    }
    impl IdKind for Coord {
        const PREFIX: &'static str = "coord";
    }
    impl IdKind for Constraint {
        const PREFIX: &'static str = "constraint";
    }
}

/// Index into one of the model's arenas, tagged with the arena it belongs to
/// so a body index cannot be passed where a coordinate index is expected.
///
/// Stored as `index + 1` in a `NonZeroU32`, so `Option<Id<_>>` costs nothing.
pub struct Id<T> {
    raw: NonZeroU32,
    _kind: PhantomData<fn() -> T>,
}

pub type BodyId = Id<kind::Body>;
pub type JointId = Id<kind::Joint>;
pub type CoordId = Id<kind::Coord>;
pub type ConstraintId = Id<kind::Constraint>;

impl<T> Id<T> {
    pub fn from_index(index: u32) -> Self {
        Self {
            raw: NonZeroU32::MIN.saturating_add(index),
            _kind: PhantomData,
        }
    }

    pub fn index(self) -> u32 {
        self.raw.get() - 1
    }

    /// Position in the owning arena.
    pub fn slot(self) -> usize {
        self.index() as usize
    }
}

// Manual impls: derives would demand the same traits of the marker type.
impl<T> Clone for Id<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Id<T> {}

impl<T> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<T> Eq for Id<T> {}

impl<T> PartialOrd for Id<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Id<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.raw.cmp(&other.raw)
    }
}

impl<T> Hash for Id<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl<T: IdKind> fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", T::PREFIX, self.index())
    }
}

impl<T: IdKind> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", T::PREFIX, self.index())
    }
}

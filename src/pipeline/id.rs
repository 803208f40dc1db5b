//! Identity types for the pipeline system.
//!
//! Ids are newtypes over `u32` that index directly into the pipeline's
//! component slots, in insertion order.

use std::fmt;

/// Index of any component in `Pipeline::slots`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct ComponentId(pub u32);

impl ComponentId {
    pub const INVALID: ComponentId = ComponentId(u32::MAX);

    #[inline]
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "ComponentId(INVALID)")
        } else {
            write!(f, "ComponentId({})", self.0)
        }
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A [`ComponentId`] known to refer to a sensor slot.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SensorId(pub(crate) ComponentId);

impl SensorId {
    #[inline]
    pub fn component(self) -> ComponentId {
        self.0
    }
}

impl fmt::Debug for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SensorId({})", self.0 .0)
    }
}

impl From<SensorId> for ComponentId {
    fn from(id: SensorId) -> Self {
        id.0
    }
}

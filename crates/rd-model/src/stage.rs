//! Realization stages.

/// Ordered computation tiers a [`State`](crate::State) can be realized to.
///
/// A stage depends on every stage before it. Writing a state variable drops the
/// realized stage to just below the stage that variable invalidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Empty,
    Topology,
    Model,
    Instance,
    Time,
    Position,
    Velocity,
    Dynamics,
    Acceleration,
    Report,
}

impl Stage {
    pub const ALL: [Stage; 10] = [
        Stage::Empty,
        Stage::Topology,
        Stage::Model,
        Stage::Instance,
        Stage::Time,
        Stage::Position,
        Stage::Velocity,
        Stage::Dynamics,
        Stage::Acceleration,
        Stage::Report,
    ];

    /// The stage immediately before this one (`Empty` saturates).
    pub fn prev(self) -> Stage {
        let i = self as usize;
        Stage::ALL[i.saturating_sub(1)]
    }

    /// The stage immediately after this one (`Report` saturates).
    pub fn next(self) -> Stage {
        let i = self as usize;
        Stage::ALL[(i + 1).min(Stage::ALL.len() - 1)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_follows_dependency() {
        assert!(Stage::Position < Stage::Velocity);
        assert!(Stage::Dynamics < Stage::Acceleration);
        assert_eq!(Stage::Dynamics.prev(), Stage::Velocity);
        assert_eq!(Stage::Empty.prev(), Stage::Empty);
        assert_eq!(Stage::Report.next(), Stage::Report);
        assert_eq!(Stage::Velocity.next(), Stage::Dynamics);
    }
}

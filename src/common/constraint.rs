use super::Position;

use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConstraintKind {
    /// The agent itself may not stand on the cell.
    Agent,
    /// The agent may not leave or bring a box onto the cell.
    Box,
}

/// A timed prohibition. Ordered by time step first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Constraint {
    pub time_step: usize,
    pub agent: usize,
    pub position: Position,
    pub kind: ConstraintKind,
}

impl Constraint {
    pub fn agent(agent: usize, time_step: usize, position: Position) -> Self {
        Constraint {
            time_step,
            agent,
            position,
            kind: ConstraintKind::Agent,
        }
    }

    pub fn boxed(agent: usize, time_step: usize, position: Position) -> Self {
        Constraint {
            time_step,
            agent,
            position,
            kind: ConstraintKind::Box,
        }
    }
}

/// Constraints of one CBS node, grouped by agent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConstraintSet {
    by_agent: BTreeMap<usize, BTreeSet<Constraint>>,
}

impl ConstraintSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, constraint: Constraint) -> bool {
        self.by_agent
            .entry(constraint.agent)
            .or_default()
            .insert(constraint)
    }

    pub fn is_empty(&self) -> bool {
        self.by_agent.values().all(BTreeSet::is_empty)
    }

    pub fn len(&self) -> usize {
        self.by_agent.values().map(BTreeSet::len).sum()
    }

    pub fn for_agent(&self, agent: usize) -> impl Iterator<Item = &Constraint> {
        self.by_agent.get(&agent).into_iter().flatten()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Constraint> {
        self.by_agent.values().flatten()
    }

    /// Latest constrained step over all agents.
    pub fn horizon(&self) -> Option<usize> {
        self.iter().map(|constraint| constraint.time_step).max()
    }

    pub fn is_agent_constrained(&self, agent: usize, time_step: usize, position: Position) -> bool {
        self.by_agent.get(&agent).is_some_and(|set| {
            set.contains(&Constraint::agent(agent, time_step, position))
        })
    }

    /// Copies the constraints of `agent`, renumbered as `as_agent`.
    pub fn restricted_to(&self, agent: usize, as_agent: usize) -> ConstraintSet {
        let mut restricted = ConstraintSet::new();
        for constraint in self.for_agent(agent) {
            restricted.insert(Constraint {
                agent: as_agent,
                ..*constraint
            });
        }
        restricted
    }
}

use super::Position;

use std::fmt;
use std::hash::{Hash, Hasher};

/// An obligation handed to one agent.
///
/// Boxes are named by the cell they occupied in the initial state.
#[derive(Debug, Clone)]
pub struct Subgoal {
    pub box_origin: Option<Position>,
    pub goal: Option<Position>,
    pub cost: usize,
}

impl Subgoal {
    pub fn delivery(box_origin: Position, goal: Position, cost: usize) -> Self {
        Subgoal {
            box_origin: Some(box_origin),
            goal: Some(goal),
            cost,
        }
    }

    pub fn relocation(box_origin: Position, cost: usize) -> Self {
        Subgoal {
            box_origin: Some(box_origin),
            goal: None,
            cost,
        }
    }

    pub fn agent_goal(goal: Position, cost: usize) -> Self {
        Subgoal {
            box_origin: None,
            goal: Some(goal),
            cost,
        }
    }

    pub fn is_relocation(&self) -> bool {
        self.goal.is_none()
    }
}

// Cost is bookkeeping, not identity.
impl PartialEq for Subgoal {
    fn eq(&self, other: &Self) -> bool {
        self.box_origin == other.box_origin && self.goal == other.goal
    }
}

impl Eq for Subgoal {}

impl Hash for Subgoal {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.box_origin.hash(state);
        self.goal.hash(state);
    }
}

impl fmt::Display for Subgoal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(origin) = self.box_origin {
            write!(f, "box {origin:?} -> ")?;
        }
        match self.goal {
            Some(goal) => write!(f, "goal {goal:?}")?,
            None => write!(f, "anywhere")?,
        }
        write!(f, " (cost {})", self.cost)
    }
}

mod action;
mod constraint;
mod highlevel;
mod lowlevel;
mod state;
mod subgoal;

pub use action::{Action, Direction};
pub use constraint::{Constraint, ConstraintKind, ConstraintSet};
pub use highlevel::{Conflict, ConflictType};
pub(crate) use highlevel::{simulate, HighLevelOpenNode, LowLevelContext};
pub(crate) use lowlevel::LowLevelOpenNode;
pub(crate) use state::Board;
pub use state::{BoxId, State};
pub use subgoal::Subgoal;

use serde::Serialize;
use std::fmt;
use std::rc::Rc;

/// (row, column), `(0, 0)` is the top-left cell.
pub type Position = (usize, usize);

pub(crate) fn offset((row, col): Position, (d_row, d_col): (isize, isize)) -> Option<Position> {
    Some((row.checked_add_signed(d_row)?, col.checked_add_signed(d_col)?))
}

/// A joint plan: `steps[t][agent]`. Empty when the level is already solved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Solution {
    pub steps: Vec<Vec<Action>>,
}

impl Solution {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Replays the plan on a copy of `initial`. Fails on the first step with
    /// a collision or an inexecutable action, or if the final state misses a
    /// goal.
    pub fn verify(&self, initial: &State) -> bool {
        let mut state = Rc::new(initial.clone());
        for joint_action in &self.steps {
            if joint_action.len() != state.num_agents() {
                return false;
            }
            if !highlevel::step_conflicts(&state, joint_action).is_empty() {
                return false;
            }
            state = Rc::new(state.simulate_step(joint_action));
        }
        state.is_goal_state()
    }
}

impl fmt::Display for Solution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for joint_action in &self.steps {
            let line: Vec<String> = joint_action.iter().map(Action::to_string).collect();
            writeln!(f, "{}", line.join("|"))?;
        }
        Ok(())
    }
}

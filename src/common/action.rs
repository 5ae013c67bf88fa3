use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Direction {
    N,
    S,
    E,
    W,
}

impl Direction {
    pub const ALL: [Direction; 4] = [Direction::N, Direction::S, Direction::E, Direction::W];

    /// (row delta, column delta).
    pub fn delta(self) -> (isize, isize) {
        match self {
            Direction::N => (-1, 0),
            Direction::S => (1, 0),
            Direction::E => (0, 1),
            Direction::W => (0, -1),
        }
    }

    pub fn opposite(self) -> Direction {
        match self {
            Direction::N => Direction::S,
            Direction::S => Direction::N,
            Direction::E => Direction::W,
            Direction::W => Direction::E,
        }
    }
}

/// A primitive action of a single agent.
///
/// `Push(a, b)`: the agent steps in direction `a` into the cell of a box,
/// which moves on in direction `b`.
/// `Pull(a, b)`: the agent steps in direction `a` while the box adjacent to it
/// in direction `b` follows into the cell the agent just left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Action {
    NoOp,
    Move(Direction),
    Push(Direction, Direction),
    Pull(Direction, Direction),
}

impl Action {
    /// Every well-formed primitive action: NoOp, 4 moves, 12 pushes, 12 pulls.
    pub fn all() -> impl Iterator<Item = Action> {
        let moves = Direction::ALL.into_iter().map(Action::Move);
        let pushes = Direction::ALL.into_iter().flat_map(|agent| {
            Direction::ALL
                .into_iter()
                .filter(move |&boxed| boxed != agent.opposite())
                .map(move |boxed| Action::Push(agent, boxed))
        });
        let pulls = Direction::ALL.into_iter().flat_map(|agent| {
            Direction::ALL
                .into_iter()
                .filter(move |&boxed| boxed != agent)
                .map(move |boxed| Action::Pull(agent, boxed))
        });
        std::iter::once(Action::NoOp)
            .chain(moves)
            .chain(pushes)
            .chain(pulls)
    }

    pub fn agent_delta(self) -> (isize, isize) {
        match self {
            Action::NoOp => (0, 0),
            Action::Move(dir) | Action::Push(dir, _) | Action::Pull(dir, _) => dir.delta(),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::NoOp => write!(f, "NoOp"),
            Action::Move(dir) => write!(f, "Move({dir:?})"),
            Action::Push(agent, boxed) => write!(f, "Push({agent:?},{boxed:?})"),
            Action::Pull(agent, boxed) => write!(f, "Pull({agent:?},{boxed:?})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_action_set() {
        let actions: Vec<Action> = Action::all().collect();
        assert_eq!(actions.len(), 29);
        assert_eq!(actions.iter().collect::<HashSet<_>>().len(), 29);
        assert!(!actions.contains(&Action::Push(Direction::E, Direction::W)));
        assert!(!actions.contains(&Action::Pull(Direction::E, Direction::E)));
        assert!(actions.contains(&Action::Pull(Direction::E, Direction::W)));
    }

    #[test]
    fn test_deltas() {
        assert_eq!(Action::NoOp.agent_delta(), (0, 0));
        assert_eq!(Action::Move(Direction::N).agent_delta(), (-1, 0));
        assert_eq!(Action::Push(Direction::E, Direction::S).agent_delta(), (0, 1));
        assert_eq!(Action::Pull(Direction::W, Direction::E).agent_delta(), (0, -1));
    }

    #[test]
    fn test_display() {
        assert_eq!(Action::NoOp.to_string(), "NoOp");
        assert_eq!(Action::Move(Direction::E).to_string(), "Move(E)");
        assert_eq!(
            Action::Push(Direction::N, Direction::W).to_string(),
            "Push(N,W)"
        );
        assert_eq!(
            Action::Pull(Direction::S, Direction::N).to_string(),
            "Pull(S,N)"
        );
    }
}

use crate::assign::Assignment;
use crate::common::{Board, ConstraintSet, Position, State};

use std::rc::Rc;
use tracing::debug;

/// One single-agent view per agent, renumbered as agent `0`.
///
/// A view keeps the walls and holds the agent's assigned boxes and goals. An
/// agent that was assigned nothing at all sees every box of its colour and no
/// goals. Agent goals are written as `'0'`.
pub fn split_state(state: &State, assignment: &Assignment) -> Vec<State> {
    (0..state.num_agents())
        .map(|agent| single_agent_view(state, assignment, agent))
        .collect()
}

fn single_agent_view(state: &State, assignment: &Assignment, agent: usize) -> State {
    let board = &state.board;
    let mut goals = vec![None; board.height * board.width];
    let mut placed: Vec<(Position, char)> = Vec::new();

    match assignment.subgoals.get(&agent) {
        Some(subgoals) => {
            for subgoal in subgoals {
                match (subgoal.box_origin, subgoal.goal) {
                    (Some(origin), goal) => {
                        if let Some(letter) = state.box_at(origin) {
                            placed.push((origin, letter));
                        }
                        if let Some(goal) = goal {
                            goals[board.index(goal)] = board.goal_at(goal);
                        }
                    }
                    (None, Some(goal)) => goals[board.index(goal)] = Some('0'),
                    (None, None) => {}
                }
            }
        }
        None => {
            let color = state.agent_color(agent);
            for (letter, cells) in state.boxes_by_letter() {
                if state.box_color(letter) == Some(color) {
                    placed.extend(cells.into_iter().map(|cell| (cell, letter)));
                }
            }
        }
    }

    placed.sort_unstable();
    placed.dedup();
    debug!("agent {agent} view holds {} box(es)", placed.len());

    State::assemble(
        Board::new(board.height, board.width, board.walls.clone(), goals),
        Rc::clone(&state.box_colors),
        vec![state.agent_color(agent)],
        vec![state.agent_position(agent)],
        &placed,
        ConstraintSet::new(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assign::assign;
    use crate::distance::DistanceOracle;
    use crate::level::Level;

    fn state(colors: &str, initial: &str, goal: &str) -> State {
        let level: Level = format!(
            "#domain\nhospital\n#levelname\ntest\n#colors\n{colors}\n#initial\n{initial}\n#goal\n{goal}\n#end\n"
        )
        .parse()
        .unwrap();
        State::from_level(&level).unwrap()
    }

    #[test]
    fn test_views_hold_only_assigned_entities() {
        let state = state(
            "red: 0, A\nblue: 1, B",
            "+++++++\n+0A  1+\n+  B  +\n+++++++",
            "+++++++\n+ A   +\n+   B0+\n+++++++",
        );
        let oracle = DistanceOracle::new(&state, 1);
        let assignment = assign(&state, &oracle).unwrap();
        let views = split_state(&state, &assignment);
        assert_eq!(views.len(), 2);

        let red = &views[0];
        assert_eq!(red.num_agents(), 1);
        assert_eq!(red.agent_position(0), (1, 1));
        assert_eq!(red.box_at((1, 2)), Some('A'));
        assert_eq!(red.box_at((2, 3)), None);
        assert_eq!(red.goal_at((1, 2)), Some('A'));
        assert_eq!(red.goal_at((2, 5)), Some('0'));
        assert_eq!(red.goal_at((2, 4)), None);

        let blue = &views[1];
        assert_eq!(blue.agent_position(0), (1, 5));
        assert_eq!(blue.box_at((2, 3)), Some('B'));
        assert_eq!(blue.box_at((1, 2)), None);
        assert_eq!(blue.goal_at((2, 4)), Some('B'));
        assert_eq!(blue.goal_at((2, 5)), None);
        assert!(blue.is_wall((0, 0)));
    }

    #[test]
    fn test_unassigned_agent_sees_its_color() {
        let state = state(
            "red: 0, 1, A",
            "+++++++\n+0A  1+\n+++++++",
            "+++++++\n+  A  +\n+++++++",
        );
        let oracle = DistanceOracle::new(&state, 1);
        let assignment = assign(&state, &oracle).unwrap();
        assert_eq!(assignment.subgoals_of(0).len(), 1);
        assert!(assignment.subgoals.get(&1).is_none());

        let views = split_state(&state, &assignment);
        let idle = &views[1];
        assert_eq!(idle.agent_position(0), (1, 5));
        assert_eq!(idle.box_at((1, 2)), Some('A'));
        assert!(idle.goals_by_char().is_empty());
        assert!(idle.is_goal_state());
    }
}

use super::state::Effect;
use super::{Action, Constraint, ConstraintSet, Position, State, Subgoal};
use crate::algorithm::serialized_a_star_search;
use crate::distance::DistanceOracle;
use crate::stat::Stats;

use rand::rngs::StdRng;
use std::cmp::Ordering;
use std::rc::Rc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConflictType {
    /// Two agents target the same cell, swap cells, or one follows the other.
    Agent,
    /// The same relations between two moved boxes.
    Box,
    /// A moved box meets the other agent.
    AgentBox,
    /// A single agent's action cannot be executed in the joint grid.
    Inapplicable,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Conflict {
    /// Step at which the colliding joint action lands.
    pub time_step: usize,
    pub conflict_type: ConflictType,
    /// Each involved agent with the cell it tried to enter.
    pub parties: Vec<(usize, Position)>,
}

/// Conflicts raised by one joint action from `state`, pairs first. An agent
/// already in a pairwise clash is not reported as inapplicable as well.
pub(crate) fn step_conflicts(state: &State, joint_action: &[Action]) -> Vec<Conflict> {
    let time_step = state.g + 1;
    let effects: Vec<Effect> = joint_action
        .iter()
        .enumerate()
        .map(|(agent, &action)| state.effect_or_stay(agent, action))
        .collect();

    let mut conflicts = Vec::new();
    let mut clashed = vec![false; effects.len()];
    for a1 in 0..effects.len() {
        for a2 in (a1 + 1)..effects.len() {
            if let Some(conflict_type) = effects[a1].clash(&effects[a2]) {
                clashed[a1] = true;
                clashed[a2] = true;
                conflicts.push(Conflict {
                    time_step,
                    conflict_type,
                    parties: vec![(a1, effects[a1].destination), (a2, effects[a2].destination)],
                });
            }
        }
    }

    for (agent, &action) in joint_action.iter().enumerate() {
        if !clashed[agent] && !state.can_apply(agent, action) {
            conflicts.push(Conflict {
                time_step,
                conflict_type: ConflictType::Inapplicable,
                parties: vec![(agent, effects[agent].destination)],
            });
        }
    }

    conflicts
}

pub(crate) struct Simulation {
    pub(crate) total_conflicts: usize,
    pub(crate) first_conflict: Option<Conflict>,
    pub(crate) final_state: State,
}

/// Pads the per-agent plans with `NoOp` and replays them jointly from `initial`.
pub(crate) fn simulate(initial: &State, plans: &[Vec<Action>]) -> Simulation {
    let makespan = plans.iter().map(Vec::len).max().unwrap_or(0);
    let mut state = Rc::new(initial.clone());
    let mut total_conflicts = 0;
    let mut first_conflict = None;

    for step in 0..makespan {
        let joint_action = merged_step(plans, step);
        let conflicts = step_conflicts(&state, &joint_action);
        total_conflicts += conflicts.len();
        if first_conflict.is_none() {
            first_conflict = conflicts.into_iter().next();
        }
        state = Rc::new(state.simulate_step(&joint_action));
    }

    Simulation {
        total_conflicts,
        first_conflict,
        final_state: Rc::try_unwrap(state).unwrap_or_else(|shared| (*shared).clone()),
    }
}

fn merged_step(plans: &[Vec<Action>], step: usize) -> Vec<Action> {
    plans
        .iter()
        .map(|plan| plan.get(step).copied().unwrap_or(Action::NoOp))
        .collect()
}

/// Everything a CBS node needs to replan one agent.
pub(crate) struct LowLevelContext<'a> {
    /// The joint grid plans are simulated on.
    pub(crate) initial: &'a State,
    /// Unconstrained single-agent view per agent.
    pub(crate) views: &'a [State],
    pub(crate) subgoals: &'a [Vec<Subgoal>],
    pub(crate) oracle: &'a DistanceOracle,
    pub(crate) low_level_node_limit: Option<usize>,
}

impl LowLevelContext<'_> {
    fn plan_agent(
        &self,
        agent: usize,
        constraints: &ConstraintSet,
        rng: &mut StdRng,
        stats: &mut Stats,
    ) -> Option<Vec<Action>> {
        let view = self.views[agent].with_constraints(constraints.restricted_to(agent, 0));
        serialized_a_star_search(
            &view,
            &self.subgoals[agent],
            self.oracle,
            self.low_level_node_limit,
            rng,
            stats,
        )
    }
}

#[derive(Clone, Debug)]
pub(crate) struct HighLevelOpenNode {
    pub(crate) constraints: ConstraintSet,
    pub(crate) plans: Vec<Vec<Action>>,
    pub(crate) cost: usize,
    pub(crate) total_conflicts: usize,
    pub(crate) first_conflict: Option<Conflict>,
}

impl PartialEq for HighLevelOpenNode {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HighLevelOpenNode {}

impl Ord for HighLevelOpenNode {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cost
            .cmp(&other.cost)
            // Same cost still needs the plans and constraints to tell nodes apart
            .then_with(|| self.plans.cmp(&other.plans))
            .then_with(|| self.constraints.cmp(&other.constraints))
    }
}

impl PartialOrd for HighLevelOpenNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl HighLevelOpenNode {
    /// Plans every agent without constraints. `None` if any agent fails.
    pub(crate) fn new(
        context: &LowLevelContext,
        rng: &mut StdRng,
        stats: &mut Stats,
    ) -> Option<Self> {
        let constraints = ConstraintSet::new();
        let mut plans = Vec::with_capacity(context.views.len());
        for agent in 0..context.views.len() {
            let Some(plan) = context.plan_agent(agent, &constraints, rng, stats) else {
                debug!("agent {agent} has no plan at the root");
                return None;
            };
            plans.push(plan);
        }

        let mut root = HighLevelOpenNode {
            constraints,
            plans,
            cost: 0,
            total_conflicts: 0,
            first_conflict: None,
        };
        root.cost = root.plan_cost();
        root.detect_conflicts(context.initial);
        Some(root)
    }

    pub(crate) fn plan_cost(&self) -> usize {
        self.plans.iter().map(Vec::len).sum()
    }

    pub(crate) fn makespan(&self) -> usize {
        self.plans.iter().map(Vec::len).max().unwrap_or(0)
    }

    pub(crate) fn detect_conflicts(&mut self, initial: &State) {
        let simulation = simulate(initial, &self.plans);
        debug!(
            "Detect {} conflicts, first {:?}",
            simulation.total_conflicts, simulation.first_conflict
        );
        self.total_conflicts = simulation.total_conflicts;
        self.first_conflict = simulation.first_conflict;
    }

    /// Forbids `agent` from entering `position` at `time_step` and replans it.
    pub(crate) fn update_constraint(
        &self,
        agent: usize,
        position: Position,
        time_step: usize,
        context: &LowLevelContext,
        rng: &mut StdRng,
        stats: &mut Stats,
    ) -> Option<HighLevelOpenNode> {
        let mut constraints = self.constraints.clone();
        constraints.insert(Constraint::agent(agent, time_step, position));

        let new_plan = context.plan_agent(agent, &constraints, rng, stats)?;
        debug!(
            "Update agent {agent} with plan of length {} for constraint at {position:?}, step {time_step}",
            new_plan.len()
        );

        let mut plans = self.plans.clone();
        plans[agent] = new_plan;

        let mut new_node = HighLevelOpenNode {
            constraints,
            plans,
            cost: 0,
            total_conflicts: 0,
            first_conflict: None,
        };
        new_node.cost = new_node.plan_cost() + self.total_conflicts;
        new_node.detect_conflicts(context.initial);
        Some(new_node)
    }

    /// Per-agent plans padded to a joint plan.
    pub(crate) fn merged_plan(&self) -> Vec<Vec<Action>> {
        (0..self.makespan())
            .map(|step| merged_step(&self.plans, step))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assign::assign;
    use crate::common::{offset, Direction};
    use crate::level::Level;
    use crate::split::split_state;
    use rand::SeedableRng;

    fn state(colors: &str, initial: &str) -> State {
        let blank: String = initial
            .chars()
            .map(|ch| if ch == '\n' || ch == '+' { ch } else { ' ' })
            .collect();
        let level: Level = format!(
            "#domain\nhospital\n#levelname\ntest\n#colors\n{colors}\n#initial\n{initial}\n#goal\n{blank}\n#end\n"
        )
        .parse()
        .unwrap();
        State::from_level(&level).unwrap()
    }

    /// Cell of `start` after the first `steps` actions of `plan`, idling once
    /// the plan is done.
    fn position_after(start: Position, plan: &[Action], steps: usize) -> Position {
        plan.iter()
            .take(steps)
            .fold(start, |cell, action| offset(cell, action.agent_delta()).unwrap())
    }

    fn respects_constraints(node: &HighLevelOpenNode, initial: &State) -> bool {
        node.constraints.iter().all(|constraint| {
            let start = initial.agent_position(constraint.agent);
            position_after(start, &node.plans[constraint.agent], constraint.time_step)
                != constraint.position
        })
    }

    fn two_agents() -> State {
        let level: Level = "#domain\nhospital\n#levelname\ntest\n#colors\nred: 0\nblue: 1\n#initial\n+++++\n+0 1+\n+++++\n#goal\n+++++\n+   +\n+++++\n#end\n"
            .parse()
            .unwrap();
        State::from_level(&level).unwrap()
    }

    #[test]
    fn test_vertex_conflict() {
        let state = two_agents();
        let conflicts = step_conflicts(
            &state,
            &[Action::Move(Direction::E), Action::Move(Direction::W)],
        );
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].conflict_type, ConflictType::Agent);
        assert_eq!(conflicts[0].time_step, 1);
        assert_eq!(conflicts[0].parties, vec![(0, (1, 2)), (1, (1, 2))]);
    }

    #[test]
    fn test_inapplicable_action_is_a_conflict() {
        let state = two_agents();
        let conflicts = step_conflicts(&state, &[Action::Move(Direction::N), Action::NoOp]);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].conflict_type, ConflictType::Inapplicable);
        assert_eq!(conflicts[0].parties, vec![(0, (0, 1))]);
    }

    #[test]
    fn test_simulate_pads_and_counts() {
        let state = two_agents();
        let plans = vec![vec![Action::Move(Direction::E)], vec![]];
        let simulation = simulate(&state, &plans);
        assert_eq!(simulation.total_conflicts, 0);
        assert!(simulation.first_conflict.is_none());
        assert_eq!(simulation.final_state.agent_position(0), (1, 2));

        let plans = vec![
            vec![Action::Move(Direction::E)],
            vec![Action::Move(Direction::W)],
        ];
        let simulation = simulate(&state, &plans);
        assert_eq!(simulation.total_conflicts, 1);
        assert_eq!(
            simulation.first_conflict.map(|conflict| conflict.conflict_type),
            Some(ConflictType::Agent)
        );
        // Agent 1 yields: the cell is taken once agent 0 has moved.
        assert_eq!(simulation.final_state.agent_position(1), (1, 3));
    }

    #[test]
    fn test_swap_is_one_agent_conflict() {
        let state = state("red: 0\nblue: 1", "++++\n+01+\n++++");
        let joint_action = [Action::Move(Direction::E), Action::Move(Direction::W)];
        let conflicts = step_conflicts(&state, &joint_action);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].conflict_type, ConflictType::Agent);
        assert_eq!(conflicts[0].parties, vec![(0, (1, 2)), (1, (1, 1))]);

        let plans = vec![vec![joint_action[0]], vec![joint_action[1]]];
        assert_eq!(simulate(&state, &plans).total_conflicts, 1);
    }

    #[test]
    fn test_following_into_a_vacated_cell_is_an_agent_conflict() {
        let state = state("red: 0\nblue: 1", "+++++\n+01 +\n+++++");
        let conflicts = step_conflicts(
            &state,
            &[Action::Move(Direction::E), Action::Move(Direction::E)],
        );
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].conflict_type, ConflictType::Agent);
        assert_eq!(conflicts[0].parties, vec![(0, (1, 2)), (1, (1, 3))]);
    }

    #[test]
    fn test_boxes_pushed_into_one_cell() {
        let state = state("red: 0, A\nblue: 1, B", "+++++++\n+0A B1+\n+++++++");
        let conflicts = step_conflicts(
            &state,
            &[
                Action::Push(Direction::E, Direction::E),
                Action::Push(Direction::W, Direction::W),
            ],
        );
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].conflict_type, ConflictType::Box);
        assert_eq!(conflicts[0].parties, vec![(0, (1, 2)), (1, (1, 4))]);
    }

    #[test]
    fn test_box_pushed_into_an_agent() {
        let state = state("red: 0, A\nblue: 1", "++++++\n+0A 1+\n++++++");
        let conflicts = step_conflicts(
            &state,
            &[
                Action::Push(Direction::E, Direction::E),
                Action::Move(Direction::W),
            ],
        );
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].conflict_type, ConflictType::AgentBox);
        assert_eq!(conflicts[0].parties, vec![(0, (1, 2)), (1, (1, 3))]);
    }

    #[test]
    fn test_replanned_nodes_respect_their_constraints() {
        let blank = "+++++\n+   +\n+0 1+\n+   +\n+++++";
        let level: Level = format!(
            "#domain\nhospital\n#levelname\ntest\n#colors\nred: 0\nblue: 1\n#initial\n{blank}\n#goal\n{}\n#end\n",
            "+++++\n+   +\n+1 0+\n+   +\n+++++"
        )
        .parse()
        .unwrap();
        let initial = State::from_level(&level).unwrap();
        let oracle = DistanceOracle::new(&initial, 1);
        let assignment = assign(&initial, &oracle).unwrap();
        let views = split_state(&initial, &assignment);
        let subgoals: Vec<Vec<Subgoal>> = (0..initial.num_agents())
            .map(|agent| assignment.subgoals_of(agent).to_vec())
            .collect();
        let context = LowLevelContext {
            initial: &initial,
            views: &views,
            subgoals: &subgoals,
            oracle: &oracle,
            low_level_node_limit: None,
        };
        let mut rng = StdRng::seed_from_u64(0);
        let mut stats = Stats::default();

        let root = HighLevelOpenNode::new(&context, &mut rng, &mut stats).unwrap();
        let first = root.first_conflict.clone().unwrap();
        assert_eq!(first.time_step, 1);
        assert_eq!(first.parties, vec![(0, (2, 2)), (1, (2, 2))]);

        let mut generation = vec![root];
        for _ in 0..3 {
            let mut children = Vec::new();
            for node in &generation {
                let Some(conflict) = &node.first_conflict else {
                    continue;
                };
                for &(agent, position) in &conflict.parties {
                    if let Some(child) = node.update_constraint(
                        agent,
                        position,
                        conflict.time_step,
                        &context,
                        &mut rng,
                        &mut stats,
                    ) {
                        assert!(respects_constraints(&child, &initial));
                        children.push(child);
                    }
                }
            }
            generation = children;
        }
    }
}

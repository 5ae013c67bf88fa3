use crate::algorithm::min_cost_assignment;
use crate::common::{Position, State, Subgoal};
use crate::distance::{DistanceOracle, UNREACHABLE};
use crate::error::PlanError;
use crate::level::Color;

use std::collections::BTreeMap;
use tracing::{debug, info};

/// Cost of matching a box to no goal.
const BOX_GOAL_PADDING: i64 = 1000;
/// Cost of an agent slot taking no subgoal.
const COLOR_PADDING: i64 = 10000;
/// Worse than any padding, so unreachable pairs are only matched when forced.
const UNREACHABLE_COST: i64 = 1_000_000;

fn matching_cost(distance: usize) -> i64 {
    if distance == UNREACHABLE {
        UNREACHABLE_COST
    } else {
        distance as i64
    }
}

/// Subgoals handed to each agent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Assignment {
    /// Ordered planning targets. An agent missing here was matched to nothing
    /// at all; an agent with an empty list only received relocations.
    pub subgoals: BTreeMap<usize, Vec<Subgoal>>,
    /// Boxes matched to an agent without a goal. Not planned for.
    pub relocations: BTreeMap<usize, Vec<Subgoal>>,
}

impl Assignment {
    pub fn subgoals_of(&self, agent: usize) -> &[Subgoal] {
        self.subgoals.get(&agent).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// One subgoal per box: a delivery when min-cost matching pairs the box with
/// a goal of its letter, a relocation otherwise.
pub fn build_subgoals(state: &State, oracle: &DistanceOracle) -> Result<Vec<Subgoal>, PlanError> {
    let goals = state.goals_by_char();
    let mut subgoals = Vec::new();

    for (letter, boxes) in state.boxes_by_letter() {
        let Some(goal_cells) = goals.get(&letter) else {
            subgoals.extend(boxes.iter().map(|&origin| Subgoal::relocation(origin, 0)));
            continue;
        };

        let costs: Vec<Vec<i64>> = boxes
            .iter()
            .map(|&origin| {
                goal_cells
                    .iter()
                    .map(|&goal| matching_cost(oracle.distance(origin, goal)))
                    .collect()
            })
            .collect();
        let matching = min_cost_assignment(&costs, BOX_GOAL_PADDING)?;

        for (&origin, matched) in boxes.iter().zip(matching) {
            subgoals.push(match matched {
                Some(column) => {
                    let goal = goal_cells[column];
                    Subgoal::delivery(origin, goal, oracle.distance(origin, goal))
                }
                None => Subgoal::relocation(origin, 0),
            });
        }
    }

    for (goal, cells) in &goals {
        if goal.is_ascii_uppercase() && state.box_color(*goal).is_some() {
            let delivered = subgoals
                .iter()
                .filter(|subgoal| subgoal.goal.is_some_and(|cell| cells.contains(&cell)))
                .count();
            if delivered < cells.len() {
                debug!("{} goal(s) {goal} have no movable box", cells.len() - delivered);
            }
        }
    }

    Ok(subgoals)
}

fn agent_cost(state: &State, oracle: &DistanceOracle, agent: usize, subgoal: &Subgoal) -> usize {
    let start = state.agent_position(agent);
    match (subgoal.box_origin, subgoal.goal) {
        (Some(origin), Some(goal)) => oracle
            .distance(start, origin)
            .saturating_add(oracle.distance(origin, goal)),
        (Some(origin), None) => oracle.distance(start, origin),
        (None, Some(goal)) => oracle.distance(start, goal),
        (None, None) => 0,
    }
}

/// Distributes box subgoals among same-coloured agents, orders each agent's
/// deliveries greedily and appends its own goal cell last.
pub fn assign(state: &State, oracle: &DistanceOracle) -> Result<Assignment, PlanError> {
    let mut by_color: BTreeMap<Color, Vec<Subgoal>> = BTreeMap::new();
    for subgoal in build_subgoals(state, oracle)? {
        let Some(origin) = subgoal.box_origin else {
            continue;
        };
        let letter = state
            .box_at(origin)
            .ok_or(PlanError::InconsistentDimensions)?;
        let color = state
            .box_color(letter)
            .ok_or(PlanError::MissingBoxColor(letter))?;
        by_color.entry(color).or_default().push(subgoal);
    }

    let mut agents_by_color: BTreeMap<Color, Vec<usize>> = BTreeMap::new();
    for agent in 0..state.num_agents() {
        agents_by_color
            .entry(state.agent_color(agent))
            .or_default()
            .push(agent);
    }

    let mut matched: BTreeMap<usize, Vec<Subgoal>> = BTreeMap::new();
    for (color, tasks) in &by_color {
        let Some(agents) = agents_by_color.get(color) else {
            continue;
        };

        // Row `slot * agents.len() + k` is the slot-th pick of agents[k], so
        // one agent may take every task.
        let costs: Vec<Vec<i64>> = (0..agents.len() * tasks.len())
            .map(|row| {
                let agent = agents[row % agents.len()];
                tasks
                    .iter()
                    .map(|task| matching_cost(agent_cost(state, oracle, agent, task)))
                    .collect()
            })
            .collect();
        let matching = min_cost_assignment(&costs, COLOR_PADDING)?;

        for (row, column) in matching.into_iter().enumerate() {
            if let Some(column) = column {
                let agent = agents[row % agents.len()];
                matched.entry(agent).or_default().push(tasks[column].clone());
            }
        }
        debug!("{color} tasks {} over agents {agents:?}", tasks.len());
    }

    let mut assignment = Assignment::default();
    for (agent, tasks) in matched {
        let (relocations, deliveries): (Vec<Subgoal>, Vec<Subgoal>) =
            tasks.into_iter().partition(Subgoal::is_relocation);
        if !relocations.is_empty() {
            debug!("agent {agent} keeps {} relocation(s) out of its plan", relocations.len());
            assignment.relocations.insert(agent, relocations);
        }
        let ordered = order_subgoals(state.agent_position(agent), deliveries, oracle);
        assignment.subgoals.insert(agent, ordered);
    }

    for (goal, cells) in state.goals_by_char() {
        let Some(agent) = goal.to_digit(10).map(|digit| digit as usize) else {
            continue;
        };
        if agent >= state.num_agents() {
            continue;
        }
        for cell in cells {
            let subgoal = Subgoal::agent_goal(cell, oracle.distance(state.agent_position(agent), cell));
            assignment.subgoals.entry(agent).or_default().push(subgoal);
        }
    }

    info!(
        "assigned {} subgoal(s) to {} agent(s)",
        assignment.subgoals.values().map(Vec::len).sum::<usize>(),
        assignment.subgoals.len()
    );
    Ok(assignment)
}

/// Nearest-first ordering of deliveries. Each chosen subgoal's cost becomes
/// the cumulative travel estimate up to its completion.
pub(crate) fn order_subgoals(
    start: Position,
    mut remaining: Vec<Subgoal>,
    oracle: &DistanceOracle,
) -> Vec<Subgoal> {
    let mut ordered: Vec<Subgoal> = Vec::with_capacity(remaining.len());

    while !remaining.is_empty() {
        let (from, spent) = match ordered.last() {
            Some(previous) => (previous.goal.unwrap_or(start), previous.cost),
            None => (start, 0),
        };

        let mut best: Option<(usize, usize)> = None;
        for (index, subgoal) in remaining.iter().enumerate() {
            let (Some(origin), Some(goal)) = (subgoal.box_origin, subgoal.goal) else {
                continue;
            };
            let cost = spent
                .saturating_add(oracle.distance(from, origin))
                .saturating_add(oracle.distance(origin, goal));
            if best.map_or(true, |(_, best_cost)| cost < best_cost) {
                best = Some((index, cost));
            }
        }

        let Some((index, cost)) = best else {
            // Nothing left with both a box and a goal.
            ordered.append(&mut remaining);
            break;
        };
        let mut next = remaining.remove(index);
        next.cost = cost;
        ordered.push(next);
    }

    ordered
}

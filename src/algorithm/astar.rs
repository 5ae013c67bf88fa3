use crate::common::{Action, LowLevelOpenNode, State, Subgoal};
use crate::distance::DistanceOracle;
use crate::stat::Stats;

use rand::rngs::StdRng;
use std::collections::{BTreeSet, HashSet};
use std::rc::Rc;
use tracing::{debug, instrument, trace};

/// Distance-table estimate for the active subgoal of a single-agent state.
fn heuristic(state: &State, subgoal: Option<&Subgoal>, oracle: &DistanceOracle) -> usize {
    let Some(subgoal) = subgoal else {
        return 0;
    };
    match (subgoal.box_origin, subgoal.goal) {
        (Some(origin), Some(goal)) => match state.box_position(origin) {
            Some(cell) => oracle
                .distance(state.agent_position(0), cell)
                .saturating_add(oracle.distance(cell, goal)),
            None => 0,
        },
        (None, Some(goal)) => oracle.distance(state.agent_position(0), goal),
        _ => 0,
    }
}

/// Best-first search from `start`. With `full_goal` the search ends in a
/// state meeting every goal of the view, otherwise in one completing `subgoal`.
#[instrument(skip_all, name = "a_star", fields(subgoal = subgoal.map(|s| s.to_string()), full_goal = full_goal), level = "debug")]
fn a_star_search(
    start: Rc<State>,
    subgoal: Option<&Subgoal>,
    full_goal: bool,
    oracle: &DistanceOracle,
    node_limit: Option<usize>,
    rng: &mut StdRng,
    stats: &mut Stats,
) -> Option<Rc<State>> {
    let is_goal = |state: &State| {
        if full_goal {
            state.is_goal_state()
        } else {
            subgoal.is_some_and(|subgoal| state.is_subgoal_state(subgoal))
        }
    };

    let mut open_list = BTreeSet::new();
    let mut in_open: HashSet<Rc<State>> = HashSet::new();
    let mut closed_list: HashSet<Rc<State>> = HashSet::new();
    let mut order = 0;
    let mut expanded = 0;

    open_list.insert(LowLevelOpenNode {
        f_cost: start.g().saturating_add(heuristic(&start, subgoal, oracle)),
        g_cost: start.g(),
        order,
        state: Rc::clone(&start),
    });
    in_open.insert(start);

    while let Some(current) = open_list.pop_first() {
        in_open.remove(&current.state);
        trace!("expand state g {} f {}", current.g_cost, current.f_cost);

        if is_goal(&current.state) {
            debug!("found after {expanded} expansions, g {}", current.g_cost);
            return Some(current.state);
        }

        if node_limit.is_some_and(|limit| expanded >= limit) {
            debug!("node limit reached after {expanded} expansions");
            return None;
        }
        expanded += 1;
        stats.low_level_expand_nodes += 1;

        for child in current.state.expand(rng) {
            if closed_list.contains(&child) || in_open.contains(&child) {
                continue;
            }
            let child = Rc::new(child);
            order += 1;
            open_list.insert(LowLevelOpenNode {
                f_cost: child.g().saturating_add(heuristic(&child, subgoal, oracle)),
                g_cost: child.g(),
                order,
                state: Rc::clone(&child),
            });
            in_open.insert(child);
        }
        closed_list.insert(current.state);
    }

    debug!("cannot find solution");
    None
}

/// Plans the agent of a single-agent view through its ordered subgoals.
///
/// Each subgoal is searched from where the previous one ended; a delivered
/// box's goal cell is then sealed into a wall. The last subgoal, or a search
/// without subgoals, must reach a state meeting every goal of the view with
/// all constrained steps in the past. `None` if any stage fails.
#[instrument(skip_all, name = "serialized_a_star", fields(subgoals = subgoals.len(), constraints = initial.constraints().len()), level = "debug")]
pub(crate) fn serialized_a_star_search(
    initial: &State,
    subgoals: &[Subgoal],
    oracle: &DistanceOracle,
    node_limit: Option<usize>,
    rng: &mut StdRng,
    stats: &mut Stats,
) -> Option<Vec<Action>> {
    let mut current = Rc::new(initial.clone());

    if subgoals.is_empty() {
        current = a_star_search(current, None, true, oracle, node_limit, rng, stats)?;
        return Some(current.extract_agent_plan(0));
    }

    for (index, subgoal) in subgoals.iter().enumerate() {
        let last = index + 1 == subgoals.len();
        let terminal = a_star_search(current, Some(subgoal), last, oracle, node_limit, rng, stats)?;

        current = match (last, subgoal.box_origin, subgoal.goal) {
            (false, Some(_), Some(goal)) => Rc::new(terminal.with_sealed_goal(goal)),
            _ => terminal,
        };
    }

    Some(current.extract_agent_plan(0))
}

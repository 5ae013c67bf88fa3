use super::Solver;
use crate::assign::assign;
use crate::common::{
    simulate, Action, ConstraintSet, HighLevelOpenNode, LowLevelContext, Solution, State, Subgoal,
};
use crate::config::Config;
use crate::distance::DistanceOracle;
use crate::error::PlanError;
use crate::level::Level;
use crate::split::split_state;
use crate::stat::Stats;

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::{BTreeSet, HashSet};
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Conflict-based search over independently planned single-agent views.
///
/// Construction does the per-level work: the distance table, the subgoal
/// assignment and the split into one view per agent. [`Solver::solve`] then
/// searches the constraint tree, replanning one agent per child node.
pub struct CBS {
    initial: State,
    oracle: DistanceOracle,
    views: Vec<State>,
    subgoals: Vec<Vec<Subgoal>>,
    stats: Stats,
}

impl CBS {
    pub fn new(level: &Level, config: &Config) -> Result<Self, PlanError> {
        let initial = State::from_level(level)?;
        let mut stats = Stats::default();

        let distance_start_time = Instant::now();
        let oracle = DistanceOracle::new(&initial, config.threads);
        stats.distance_time_ms = distance_start_time.elapsed().as_secs_f64() * 1000.0;

        let assignment = assign(&initial, &oracle)?;
        let views = split_state(&initial, &assignment);
        let subgoals = (0..initial.num_agents())
            .map(|agent| assignment.subgoals_of(agent).to_vec())
            .collect();

        Ok(CBS {
            initial,
            oracle,
            views,
            subgoals,
            stats,
        })
    }

    pub fn initial_state(&self) -> &State {
        &self.initial
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }
}

impl Solver for CBS {
    #[instrument(skip_all, name = "cbs", fields(agents = self.initial.num_agents(), seed = config.seed), level = "debug")]
    fn solve(&mut self, config: &Config) -> Option<Solution> {
        let total_solve_start_time = Instant::now();
        let solution = self.search(config);
        self.stats.time_ms = total_solve_start_time.elapsed().as_secs_f64() * 1000.0;
        self.stats.print();
        solution
    }
}

impl CBS {
    fn search(&mut self, config: &Config) -> Option<Solution> {
        let mut rng = StdRng::seed_from_u64(config.seed);
        let context = LowLevelContext {
            initial: &self.initial,
            views: &self.views,
            subgoals: &self.subgoals,
            oracle: &self.oracle,
            low_level_node_limit: config.low_level_node_limit,
        };

        let mut open = BTreeSet::new();
        let mut generated: HashSet<(ConstraintSet, Vec<Vec<Action>>)> = HashSet::new();

        let Some(root) = HighLevelOpenNode::new(&context, &mut rng, &mut self.stats) else {
            info!("no plan for the unconstrained root");
            return None;
        };
        generated.insert((root.constraints.clone(), root.plans.clone()));
        open.insert(root);

        while let Some(current_node) = open.pop_first() {
            if config
                .high_level_node_limit
                .is_some_and(|limit| self.stats.high_level_expand_nodes >= limit)
            {
                warn!(
                    "high-level node limit reached after {} expansions",
                    self.stats.high_level_expand_nodes
                );
                return None;
            }
            self.stats.high_level_expand_nodes += 1;

            if current_node.total_conflicts == 0 {
                let final_state = simulate(&self.initial, &current_node.plans).final_state;
                if !final_state.is_goal_state() {
                    warn!("conflict-free plan leaves goals unmet");
                }

                self.stats.costs = current_node.plan_cost();
                self.stats.makespan = current_node.makespan();
                return Some(Solution {
                    steps: current_node.merged_plan(),
                });
            }

            let Some(conflict) = &current_node.first_conflict else {
                continue;
            };
            debug!("conflict: {conflict:?}");

            for &(agent, position) in &conflict.parties {
                let Some(child) = current_node.update_constraint(
                    agent,
                    position,
                    conflict.time_step,
                    &context,
                    &mut rng,
                    &mut self.stats,
                ) else {
                    continue;
                };
                if generated.insert((child.constraints.clone(), child.plans.clone())) {
                    open.insert(child);
                }
            }
        }

        info!("constraint tree exhausted");
        None
    }
}

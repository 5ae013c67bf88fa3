mod astar;
mod hungarian;

pub(crate) use astar::serialized_a_star_search;
pub(crate) use hungarian::min_cost_assignment;

use super::State;

use std::cmp::Ordering;
use std::rc::Rc;

#[derive(Clone, Debug)]
pub(crate) struct LowLevelOpenNode {
    pub(crate) f_cost: usize,
    pub(crate) g_cost: usize,
    /// Insertion counter, breaks the remaining ties in generation order.
    pub(crate) order: usize,
    pub(crate) state: Rc<State>,
}

impl PartialEq for LowLevelOpenNode {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for LowLevelOpenNode {}

impl PartialOrd for LowLevelOpenNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LowLevelOpenNode {
    fn cmp(&self, other: &Self) -> Ordering {
        self.f_cost
            .cmp(&other.f_cost)
            // Higher g cost has higher priority
            .then_with(|| other.g_cost.cmp(&self.g_cost))
            .then_with(|| self.order.cmp(&other.order))
    }
}

use super::{offset, Action, ConflictType, ConstraintKind, ConstraintSet, Position, Subgoal};
use crate::error::PlanError;
use crate::level::{Color, Level};

use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;
use tracing::debug;

/// Dense box index. `Level::validate` bounds the box count to fit.
pub type BoxId = u16;

/// Walls and goals, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Board {
    pub(crate) height: usize,
    pub(crate) width: usize,
    pub(crate) walls: Vec<bool>,
    pub(crate) goals: Vec<Option<char>>,
    fingerprint: u64,
}

impl Board {
    pub(crate) fn new(height: usize, width: usize, walls: Vec<bool>, goals: Vec<Option<char>>) -> Self {
        let mut hasher = DefaultHasher::new();
        walls.hash(&mut hasher);
        goals.hash(&mut hasher);
        Board {
            height,
            width,
            walls,
            goals,
            fingerprint: hasher.finish(),
        }
    }

    pub(crate) fn contains(&self, (row, col): Position) -> bool {
        row < self.height && col < self.width
    }

    pub(crate) fn index(&self, (row, col): Position) -> usize {
        row * self.width + col
    }

    pub(crate) fn position(&self, index: usize) -> Position {
        (index / self.width, index % self.width)
    }

    /// Cells outside the grid count as walls.
    pub(crate) fn is_wall(&self, position: Position) -> bool {
        !self.contains(position) || self.walls[self.index(position)]
    }

    pub(crate) fn goal_at(&self, position: Position) -> Option<char> {
        if self.contains(position) {
            self.goals[self.index(position)]
        } else {
            None
        }
    }

    pub(crate) fn goal_cells(&self) -> impl Iterator<Item = (Position, char)> + '_ {
        self.goals
            .iter()
            .enumerate()
            .filter_map(|(index, goal)| goal.map(|goal| (self.position(index), goal)))
    }

    /// A copy where `cell` is a wall without a goal.
    fn sealed(&self, cell: Position) -> Board {
        let mut walls = self.walls.clone();
        let mut goals = self.goals.clone();
        let index = self.index(cell);
        walls[index] = true;
        goals[index] = None;
        Board::new(self.height, self.width, walls, goals)
    }
}

/// Letters of the boxes present when a search space was built, and the id of
/// each box by its original cell.
#[derive(Debug, Clone)]
pub(crate) struct BoxTable {
    letters: Vec<char>,
    by_origin: HashMap<Position, BoxId>,
}

impl BoxTable {
    fn new(placed: &[(Position, char)]) -> Self {
        BoxTable {
            letters: placed.iter().map(|&(_, letter)| letter).collect(),
            by_origin: placed
                .iter()
                .enumerate()
                .map(|(id, &(origin, _))| (origin, id as BoxId))
                .collect(),
        }
    }

    pub(crate) fn id_of(&self, origin: Position) -> Option<BoxId> {
        self.by_origin.get(&origin).copied()
    }

    pub(crate) fn letter(&self, id: BoxId) -> char {
        self.letters[usize::from(id)]
    }
}

/// Cells touched by one agent's action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Effect {
    pub(crate) origin: Position,
    pub(crate) destination: Position,
    pub(crate) box_origin: Option<Position>,
    pub(crate) box_destination: Option<Position>,
}

impl Effect {
    fn stationary(origin: Position) -> Self {
        Effect {
            origin,
            destination: origin,
            box_origin: None,
            box_destination: None,
        }
    }

    /// Classifies how two simultaneous actions collide, agents first, then
    /// boxes, then boxes against agents.
    pub(crate) fn clash(&self, other: &Effect) -> Option<ConflictType> {
        if self.destination == other.destination
            || self.destination == other.origin
            || other.destination == self.origin
        {
            return Some(ConflictType::Agent);
        }

        if let (Some(from_1), Some(to_1), Some(from_2), Some(to_2)) = (
            self.box_origin,
            self.box_destination,
            other.box_origin,
            other.box_destination,
        ) {
            if to_1 == to_2 || to_1 == from_2 || to_2 == from_1 {
                return Some(ConflictType::Box);
            }
        }

        let box_hits_agent = |mover: &Effect, agent: &Effect| match (mover.box_origin, mover.box_destination) {
            (Some(from), Some(to)) => {
                to == agent.destination || to == agent.origin || agent.destination == from
            }
            _ => false,
        };
        if box_hits_agent(self, other) || box_hits_agent(other, self) {
            return Some(ConflictType::AgentBox);
        }

        None
    }
}

/// A grid configuration reached after `g` joint actions.
///
/// States are immutable once built. Equality covers walls, goals, box
/// placement (by identity), agent positions and colours; single-agent states
/// additionally compare the time step, clamped to one past the latest
/// constraint.
#[derive(Clone)]
pub struct State {
    pub(crate) board: Rc<Board>,
    pub(crate) box_table: Rc<BoxTable>,
    pub(crate) box_colors: Rc<BTreeMap<char, Color>>,
    pub(crate) agent_colors: Rc<Vec<Color>>,
    pub(crate) agents: Vec<Position>,
    /// Box id per cell.
    pub(crate) boxes: Vec<Option<BoxId>>,
    /// Current cell per box id; `None` once the box is sealed into a wall.
    pub(crate) box_cells: Vec<Option<Position>>,
    pub(crate) constraints: Rc<ConstraintSet>,
    pub(crate) g: usize,
    pub(crate) parent: Option<Rc<State>>,
    pub(crate) joint_action: Option<Vec<Action>>,
    horizon: Option<usize>,
    time_step: usize,
    hash: u64,
}

impl State {
    /// Builds the root state of a level. Boxes whose colour matches no agent
    /// can never move and are turned into walls.
    pub fn from_level(level: &Level) -> Result<State, PlanError> {
        level.validate()?;

        let agent_colors = (0..level.agents.len())
            .map(|agent| {
                level
                    .agent_color(agent)
                    .ok_or(PlanError::MissingAgentColor(agent))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let box_colors: BTreeMap<char, Color> = level
            .colors
            .iter()
            .filter(|(entity, _)| entity.is_ascii_uppercase())
            .map(|(&letter, &color)| (letter, color))
            .collect();

        let mut walls: Vec<bool> = level.walls.iter().flatten().copied().collect();
        let goals: Vec<Option<char>> = level.goals.iter().flatten().copied().collect();

        let mut placed = Vec::new();
        for (row, line) in level.boxes.iter().enumerate() {
            for (col, letter) in line.iter().enumerate() {
                let Some(letter) = *letter else { continue };
                let color = box_colors
                    .get(&letter)
                    .ok_or(PlanError::MissingBoxColor(letter))?;
                if agent_colors.contains(color) {
                    placed.push(((row, col), letter));
                } else {
                    debug!("box {letter} at {:?} has no agent of its color, frozen into a wall", (row, col));
                    walls[row * level.width + col] = true;
                }
            }
        }

        Ok(State::assemble(
            Board::new(level.height, level.width, walls, goals),
            Rc::new(box_colors),
            agent_colors,
            level.agents.clone(),
            &placed,
            ConstraintSet::new(),
        ))
    }

    /// Builds a root state from its parts. Box ids follow the order of `placed`.
    pub(crate) fn assemble(
        board: Board,
        box_colors: Rc<BTreeMap<char, Color>>,
        agent_colors: Vec<Color>,
        agents: Vec<Position>,
        placed: &[(Position, char)],
        constraints: ConstraintSet,
    ) -> State {
        let mut boxes = vec![None; board.height * board.width];
        for (id, &(position, _)) in placed.iter().enumerate() {
            boxes[board.index(position)] = Some(id as BoxId);
        }

        State {
            box_table: Rc::new(BoxTable::new(placed)),
            box_colors,
            agent_colors: Rc::new(agent_colors),
            agents,
            boxes,
            box_cells: placed.iter().map(|&(position, _)| Some(position)).collect(),
            horizon: constraints.horizon(),
            constraints: Rc::new(constraints),
            g: 0,
            parent: None,
            joint_action: None,
            time_step: 0,
            hash: 0,
            board: Rc::new(board),
        }
        .finish()
    }

    pub fn num_agents(&self) -> usize {
        self.agents.len()
    }

    pub fn agent_position(&self, agent: usize) -> Position {
        self.agents[agent]
    }

    pub fn agent_color(&self, agent: usize) -> Color {
        self.agent_colors[agent]
    }

    pub fn box_color(&self, letter: char) -> Option<Color> {
        self.box_colors.get(&letter).copied()
    }

    pub fn g(&self) -> usize {
        self.g
    }

    pub fn height(&self) -> usize {
        self.board.height
    }

    pub fn width(&self) -> usize {
        self.board.width
    }

    pub fn constraints(&self) -> &ConstraintSet {
        &self.constraints
    }

    pub fn is_wall(&self, position: Position) -> bool {
        self.board.is_wall(position)
    }

    pub fn goal_at(&self, position: Position) -> Option<char> {
        self.board.goal_at(position)
    }

    fn box_id_at(&self, position: Position) -> Option<BoxId> {
        if self.board.contains(position) {
            self.boxes[self.board.index(position)]
        } else {
            None
        }
    }

    pub fn box_at(&self, position: Position) -> Option<char> {
        self.box_id_at(position)
            .map(|id| self.box_table.letter(id))
    }

    pub fn agent_at(&self, position: Position) -> Option<usize> {
        self.agents.iter().position(|&agent| agent == position)
    }

    pub fn cell_is_free(&self, position: Position) -> bool {
        !self.board.is_wall(position)
            && self.box_id_at(position).is_none()
            && self.agent_at(position).is_none()
    }

    /// Current cell of the box that started at `origin`.
    pub fn box_position(&self, origin: Position) -> Option<Position> {
        self.box_table
            .id_of(origin)
            .and_then(|id| self.box_cells[usize::from(id)])
    }

    /// Current box cells grouped by letter, in row-major order.
    pub fn boxes_by_letter(&self) -> BTreeMap<char, Vec<Position>> {
        let mut by_letter: BTreeMap<char, Vec<Position>> = BTreeMap::new();
        for (index, id) in self.boxes.iter().enumerate() {
            if let Some(id) = id {
                by_letter
                    .entry(self.box_table.letter(*id))
                    .or_default()
                    .push(self.board.position(index));
            }
        }
        by_letter
    }

    /// Goal cells grouped by goal character, in row-major order.
    pub fn goals_by_char(&self) -> BTreeMap<char, Vec<Position>> {
        let mut by_char: BTreeMap<char, Vec<Position>> = BTreeMap::new();
        for (position, goal) in self.board.goal_cells() {
            by_char.entry(goal).or_default().push(position);
        }
        by_char
    }

    fn is_box_of_color(&self, position: Position, color: Color) -> bool {
        self.box_at(position)
            .and_then(|letter| self.box_color(letter))
            == Some(color)
    }

    pub(crate) fn effect(&self, agent: usize, action: Action) -> Option<Effect> {
        let origin = self.agents[agent];
        let destination = offset(origin, action.agent_delta())?;
        let (box_origin, box_destination) = match action {
            Action::NoOp | Action::Move(_) => (None, None),
            Action::Push(_, dir) => (Some(destination), Some(offset(destination, dir.delta())?)),
            Action::Pull(_, dir) => (Some(offset(origin, dir.delta())?), Some(origin)),
        };
        Some(Effect {
            origin,
            destination,
            box_origin,
            box_destination,
        })
    }

    /// Effect of the action, or standing still if it would leave the grid.
    pub(crate) fn effect_or_stay(&self, agent: usize, action: Action) -> Effect {
        self.effect(agent, action)
            .unwrap_or_else(|| Effect::stationary(self.agents[agent]))
    }

    /// Movement and colour rules, ignoring constraints.
    pub(crate) fn can_apply(&self, agent: usize, action: Action) -> bool {
        let Some(effect) = self.effect(agent, action) else {
            return false;
        };
        let color = self.agent_colors[agent];

        match (action, effect.box_origin, effect.box_destination) {
            (Action::NoOp, _, _) => true,
            (Action::Move(_), _, _) => self.cell_is_free(effect.destination),
            (Action::Push(..), Some(from), Some(to)) => {
                self.is_box_of_color(from, color) && self.cell_is_free(to)
            }
            (Action::Pull(..), Some(from), Some(_)) => {
                self.cell_is_free(effect.destination) && self.is_box_of_color(from, color)
            }
            _ => false,
        }
    }

    /// Whether a box would occupy `cell` after the action.
    fn leaves_box_at(&self, effect: &Effect, cell: Position) -> bool {
        match (effect.box_origin, effect.box_destination) {
            (Some(from), Some(to)) => to == cell || (cell != from && self.box_id_at(cell).is_some()),
            _ => self.box_id_at(cell).is_some(),
        }
    }

    /// Whether `agent` may take `action` from this state, constraints on the
    /// next time step included.
    pub fn is_applicable(&self, agent: usize, action: Action) -> bool {
        if !self.can_apply(agent, action) {
            return false;
        }
        let effect = self.effect_or_stay(agent, action);
        let next = self.g + 1;

        self.constraints
            .for_agent(agent)
            .filter(|constraint| constraint.time_step == next)
            .all(|constraint| match constraint.kind {
                ConstraintKind::Agent => effect.destination != constraint.position,
                ConstraintKind::Box => !self.leaves_box_at(&effect, constraint.position),
            })
    }

    /// Whether the actions of a joint action collide with each other.
    pub(crate) fn is_conflicting(&self, joint_action: &[Action]) -> bool {
        let effects: Vec<Effect> = joint_action
            .iter()
            .enumerate()
            .map(|(agent, &action)| self.effect_or_stay(agent, action))
            .collect();

        for a1 in 0..effects.len() {
            if joint_action[a1] == Action::NoOp {
                continue;
            }
            for a2 in (a1 + 1)..effects.len() {
                if joint_action[a2] == Action::NoOp {
                    continue;
                }
                if effects[a1].clash(&effects[a2]).is_some() {
                    return true;
                }
            }
        }
        false
    }

    fn apply(&mut self, agent: usize, action: Action) {
        let Some(effect) = self.effect(agent, action) else {
            return;
        };
        if let (Some(from), Some(to)) = (effect.box_origin, effect.box_destination) {
            let from_index = self.board.index(from);
            if let Some(id) = self.boxes[from_index].take() {
                let to_index = self.board.index(to);
                self.boxes[to_index] = Some(id);
                self.box_cells[usize::from(id)] = Some(to);
            }
        }
        self.agents[agent] = effect.destination;
    }

    fn successor(self: &Rc<Self>, joint_action: &[Action]) -> State {
        State {
            board: Rc::clone(&self.board),
            box_table: Rc::clone(&self.box_table),
            box_colors: Rc::clone(&self.box_colors),
            agent_colors: Rc::clone(&self.agent_colors),
            agents: self.agents.clone(),
            boxes: self.boxes.clone(),
            box_cells: self.box_cells.clone(),
            constraints: Rc::clone(&self.constraints),
            g: self.g + 1,
            parent: Some(Rc::clone(self)),
            joint_action: Some(joint_action.to_vec()),
            horizon: self.horizon,
            time_step: 0,
            hash: 0,
        }
    }

    /// Recomputes the derived time step and the memoised hash.
    fn finish(mut self) -> State {
        self.time_step = match (self.agents.len(), self.horizon) {
            (1, Some(horizon)) => self.g.min(horizon + 1),
            _ => 0,
        };
        let mut hasher = DefaultHasher::new();
        self.board.fingerprint.hash(&mut hasher);
        self.agent_colors.hash(&mut hasher);
        self.agents.hash(&mut hasher);
        self.boxes.hash(&mut hasher);
        self.time_step.hash(&mut hasher);
        self.hash = hasher.finish();
        self
    }

    /// Applies a joint action whose actions are all applicable and mutually
    /// non-conflicting.
    pub(crate) fn child(self: &Rc<Self>, joint_action: &[Action]) -> State {
        let mut next = self.successor(joint_action);
        for (agent, &action) in joint_action.iter().enumerate() {
            next.apply(agent, action);
        }
        next.finish()
    }

    /// Applies a joint action of a merged plan. Agents whose action cannot be
    /// executed on the partially updated state stay where they are.
    pub(crate) fn simulate_step(self: &Rc<Self>, joint_action: &[Action]) -> State {
        let mut next = self.successor(joint_action);
        for (agent, &action) in joint_action.iter().enumerate() {
            if next.can_apply(agent, action) {
                next.apply(agent, action);
            }
        }
        next.finish()
    }

    /// Successors over every applicable, non-conflicting joint action, shuffled.
    pub(crate) fn expand<R: Rng + ?Sized>(self: &Rc<Self>, rng: &mut R) -> Vec<State> {
        let num_agents = self.agents.len();
        let mut applicable: Vec<Vec<Action>> = Vec::with_capacity(num_agents);
        for agent in 0..num_agents {
            let actions: Vec<Action> = Action::all()
                .filter(|&action| self.is_applicable(agent, action))
                .collect();
            if actions.is_empty() {
                return Vec::new();
            }
            applicable.push(actions);
        }

        let mut expanded = Vec::new();
        let mut permutation = vec![0; num_agents];
        let mut joint_action = vec![Action::NoOp; num_agents];
        loop {
            for ((slot, actions), &choice) in joint_action
                .iter_mut()
                .zip(&applicable)
                .zip(&permutation)
            {
                *slot = actions[choice];
            }
            if !self.is_conflicting(&joint_action) {
                expanded.push(self.child(&joint_action));
            }

            // Advance the mixed-radix counter over per-agent choices.
            let mut agent = 0;
            loop {
                if agent == num_agents {
                    expanded.shuffle(rng);
                    return expanded;
                }
                if permutation[agent] + 1 < applicable[agent].len() {
                    permutation[agent] += 1;
                    break;
                }
                permutation[agent] = 0;
                agent += 1;
            }
        }
    }

    fn goal_satisfied(&self, position: Position, goal: char) -> bool {
        match goal.to_digit(10) {
            Some(agent) => self.agents.get(agent as usize) == Some(&position),
            None => self.box_at(position) == Some(goal),
        }
    }

    /// Every goal is met and every constrained step lies in the past.
    pub fn is_goal_state(&self) -> bool {
        if self.horizon.is_some_and(|horizon| self.g <= horizon) {
            return false;
        }
        self.board
            .goal_cells()
            .all(|(position, goal)| self.goal_satisfied(position, goal))
    }

    /// Whether the single agent of this state has completed `subgoal`.
    pub fn is_subgoal_state(&self, subgoal: &Subgoal) -> bool {
        let Some(&agent) = self.agents.first() else {
            return false;
        };
        if self.constraints.is_agent_constrained(0, self.g, agent) {
            return false;
        }
        match (subgoal.box_origin, subgoal.goal) {
            (None, Some(goal)) => agent == goal,
            (Some(origin), Some(goal)) => self.box_position(origin) == Some(goal),
            _ => false,
        }
    }

    /// The same state with `cell` turned into a wall, dropping any goal or box
    /// on it. Plan history is kept.
    pub(crate) fn with_sealed_goal(&self, cell: Position) -> State {
        let mut sealed = self.clone();
        sealed.board = Rc::new(self.board.sealed(cell));
        let index = self.board.index(cell);
        if let Some(id) = sealed.boxes[index].take() {
            sealed.box_cells[usize::from(id)] = None;
        }
        sealed.finish()
    }

    /// A fresh root of the same configuration under new constraints.
    pub(crate) fn with_constraints(&self, constraints: ConstraintSet) -> State {
        let mut constrained = self.clone();
        constrained.horizon = constraints.horizon();
        constrained.constraints = Rc::new(constraints);
        constrained.g = 0;
        constrained.parent = None;
        constrained.joint_action = None;
        constrained.finish()
    }

    /// Joint actions from the root to this state.
    pub fn extract_plan(&self) -> Vec<Vec<Action>> {
        let mut plan = Vec::with_capacity(self.g);
        let mut state: &State = self;
        while let (Some(joint_action), Some(parent)) = (&state.joint_action, &state.parent) {
            plan.push(joint_action.clone());
            state = parent;
        }
        plan.reverse();
        plan
    }

    /// Actions of one agent from the root to this state.
    pub fn extract_agent_plan(&self, agent: usize) -> Vec<Action> {
        self.extract_plan()
            .into_iter()
            .map(|joint_action| joint_action[agent])
            .collect()
    }
}

impl PartialEq for State {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
            && self.time_step == other.time_step
            && self.agents == other.agents
            && self.boxes == other.boxes
            && self.agent_colors == other.agent_colors
            && (Rc::ptr_eq(&self.board, &other.board) || self.board == other.board)
    }
}

impl Eq for State {}

impl Hash for State {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("g", &self.g)
            .field("agents", &self.agents)
            .field("constraints", &self.constraints.len())
            .finish_non_exhaustive()
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in 0..self.board.height {
            for col in 0..self.board.width {
                let position = (row, col);
                let ch = if let Some(letter) = self.box_at(position) {
                    letter
                } else if self.board.is_wall(position) {
                    '+'
                } else if let Some(agent) = self.agent_at(position) {
                    char::from_digit(agent as u32, 10).unwrap_or('?')
                } else {
                    ' '
                };
                write!(f, "{ch}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

use thiserror::Error;

/// Failures while reading a level description.
#[derive(Debug, Error)]
pub enum LevelError {
    #[error("cannot read level file: {0}")]
    Io(#[from] std::io::Error),

    #[error("missing section `{0}`")]
    MissingSection(&'static str),

    #[error("unknown color `{0}`")]
    UnknownColor(String),

    #[error("malformed color line `{0}`")]
    MalformedColorLine(String),

    #[error("unexpected character `{ch}` at ({row}, {col})")]
    UnexpectedCharacter { ch: char, row: usize, col: usize },

    #[error("agent {0} appears more than once")]
    DuplicateAgent(usize),

    #[error("agents must be numbered contiguously from 0, agent {0} is missing")]
    MissingAgent(usize),

    #[error("goal layer has {goal} rows but initial layer has {initial}")]
    GoalLayerMismatch { initial: usize, goal: usize },
}

/// Structural problems detected at planner entry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("grid layers have inconsistent dimensions")]
    InconsistentDimensions,

    #[error("box `{0}` has no color binding")]
    MissingBoxColor(char),

    #[error("agent {0} has no color binding")]
    MissingAgentColor(usize),

    #[error("goal `{0}` has no matching box or agent")]
    OrphanGoal(char),

    #[error("assignment matrix is empty")]
    EmptyAssignment,

    #[error("level has {0} boxes, at most {max} are supported", max = crate::common::BoxId::MAX)]
    TooManyBoxes(usize),
}

use crate::common::{BoxId, Position};
use crate::error::{LevelError, PlanError};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    Blue,
    Red,
    Cyan,
    Purple,
    Green,
    Orange,
    Pink,
    Grey,
    Lightblue,
    Brown,
}

impl FromStr for Color {
    type Err = LevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "blue" => Ok(Color::Blue),
            "red" => Ok(Color::Red),
            "cyan" => Ok(Color::Cyan),
            "purple" => Ok(Color::Purple),
            "green" => Ok(Color::Green),
            "orange" => Ok(Color::Orange),
            "pink" => Ok(Color::Pink),
            "grey" | "gray" => Ok(Color::Grey),
            "lightblue" => Ok(Color::Lightblue),
            "brown" => Ok(Color::Brown),
            other => Err(LevelError::UnknownColor(other.to_string())),
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// A parsed level: static layout plus the initial placement of every entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Level {
    pub name: String,
    pub height: usize,
    pub width: usize,
    pub walls: Vec<Vec<bool>>,
    pub boxes: Vec<Vec<Option<char>>>,
    pub goals: Vec<Vec<Option<char>>>,
    /// Indexed by agent number.
    pub agents: Vec<Position>,
    /// Colour of every agent digit and box letter named in `#colors`.
    pub colors: BTreeMap<char, Color>,
}

impl Level {
    pub fn from_file(path: &str) -> Result<Self, LevelError> {
        let text = fs::read_to_string(path)?;
        text.parse()
    }

    pub fn agent_color(&self, agent: usize) -> Option<Color> {
        let digit = char::from_digit(agent as u32, 10)?;
        self.colors.get(&digit).copied()
    }

    pub fn box_color(&self, letter: char) -> Option<Color> {
        self.colors.get(&letter).copied()
    }

    /// Checks the structural preconditions the planner relies on.
    pub fn validate(&self) -> Result<(), PlanError> {
        let layers_consistent = [self.walls.len(), self.boxes.len(), self.goals.len()]
            .iter()
            .all(|&rows| rows == self.height)
            && self.walls.iter().all(|row| row.len() == self.width)
            && self.boxes.iter().all(|row| row.len() == self.width)
            && self.goals.iter().all(|row| row.len() == self.width);
        if !layers_consistent {
            return Err(PlanError::InconsistentDimensions);
        }

        for (agent, &(row, col)) in self.agents.iter().enumerate() {
            if row >= self.height || col >= self.width {
                return Err(PlanError::InconsistentDimensions);
            }
            if self.agent_color(agent).is_none() {
                return Err(PlanError::MissingAgentColor(agent));
            }
        }

        let mut box_letters = Vec::new();
        for letter in self.boxes.iter().flatten().flatten() {
            if self.box_color(*letter).is_none() {
                return Err(PlanError::MissingBoxColor(*letter));
            }
            box_letters.push(*letter);
        }
        if box_letters.len() > usize::from(BoxId::MAX) {
            return Err(PlanError::TooManyBoxes(box_letters.len()));
        }

        for &goal in self.goals.iter().flatten().flatten() {
            let satisfiable = match goal.to_digit(10) {
                Some(agent) => (agent as usize) < self.agents.len(),
                None => box_letters.contains(&goal),
            };
            if !satisfiable {
                return Err(PlanError::OrphanGoal(goal));
            }
        }

        Ok(())
    }
}

impl FromStr for Level {
    type Err = LevelError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let lines: Vec<&str> = text.lines().map(|line| line.trim_end_matches('\r')).collect();

        let name = section(&lines, "#levelname")?
            .first()
            .map(|line| line.trim().to_string())
            .unwrap_or_default();

        let mut colors = BTreeMap::new();
        for line in section(&lines, "#colors")? {
            if line.trim().is_empty() {
                continue;
            }
            let (color, entities) = line
                .split_once(':')
                .ok_or_else(|| LevelError::MalformedColorLine(line.to_string()))?;
            let color: Color = color.parse()?;
            for entity in entities.split(',').map(str::trim).filter(|e| !e.is_empty()) {
                let mut chars = entity.chars();
                match (chars.next(), chars.next()) {
                    (Some(ch), None) if ch.is_ascii_digit() || ch.is_ascii_uppercase() => {
                        colors.insert(ch, color);
                    }
                    _ => return Err(LevelError::MalformedColorLine(line.to_string())),
                }
            }
        }

        let initial = section(&lines, "#initial")?;
        let goal = section(&lines, "#goal")?;
        if initial.len() != goal.len() {
            return Err(LevelError::GoalLayerMismatch {
                initial: initial.len(),
                goal: goal.len(),
            });
        }

        let height = initial.len();
        let width = initial
            .iter()
            .chain(goal.iter())
            .map(|line| line.chars().count())
            .max()
            .unwrap_or(0);

        // Short rows are padded with walls.
        let mut walls = vec![vec![true; width]; height];
        let mut boxes = vec![vec![None; width]; height];
        let mut goals = vec![vec![None; width]; height];
        let mut found_agents = BTreeMap::new();

        for (row, line) in initial.iter().enumerate() {
            for (col, ch) in line.chars().enumerate() {
                match ch {
                    '+' => {}
                    ' ' => walls[row][col] = false,
                    '0'..='9' => {
                        walls[row][col] = false;
                        let agent = ch as usize - '0' as usize;
                        if found_agents.insert(agent, (row, col)).is_some() {
                            return Err(LevelError::DuplicateAgent(agent));
                        }
                    }
                    'A'..='Z' => {
                        walls[row][col] = false;
                        boxes[row][col] = Some(ch);
                    }
                    _ => return Err(LevelError::UnexpectedCharacter { ch, row, col }),
                }
            }
        }

        for (row, line) in goal.iter().enumerate() {
            for (col, ch) in line.chars().enumerate() {
                match ch {
                    '+' | ' ' => {}
                    '0'..='9' | 'A'..='Z' => goals[row][col] = Some(ch),
                    _ => return Err(LevelError::UnexpectedCharacter { ch, row, col }),
                }
            }
        }

        let mut agents = Vec::with_capacity(found_agents.len());
        for (expected, (agent, position)) in found_agents.into_iter().enumerate() {
            if agent != expected {
                return Err(LevelError::MissingAgent(expected));
            }
            agents.push(position);
        }

        Ok(Level {
            name,
            height,
            width,
            walls,
            boxes,
            goals,
            agents,
            colors,
        })
    }
}

/// Lines between `header` and the next `#` header.
fn section<'a>(lines: &[&'a str], header: &'static str) -> Result<Vec<&'a str>, LevelError> {
    let start = lines
        .iter()
        .position(|line| line.trim() == header)
        .ok_or(LevelError::MissingSection(header))?;
    Ok(lines[start + 1..]
        .iter()
        .take_while(|line| !line.starts_with('#'))
        .copied()
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEVEL: &str = "#domain
hospital
#levelname
sample
#colors
red: 0, A
blue: 1, B
#initial
+++++++
+0A  B+
+   1 +
+++++
#goal
+++++++
+  A  +
+B    +
+++++++
#end
";

    #[test]
    fn test_read_level() {
        let level: Level = LEVEL.parse().unwrap();

        assert_eq!(level.name, "sample");
        assert_eq!(level.height, 4);
        assert_eq!(level.width, 7);
        assert_eq!(level.agents, vec![(1, 1), (2, 4)]);
        assert_eq!(level.boxes[1][2], Some('A'));
        assert_eq!(level.boxes[1][5], Some('B'));
        assert_eq!(level.goals[1][3], Some('A'));
        assert_eq!(level.goals[2][1], Some('B'));
        assert_eq!(level.agent_color(0), Some(Color::Red));
        assert_eq!(level.box_color('B'), Some(Color::Blue));

        // The short last row is padded with walls.
        assert!(level.walls[3][5]);
        assert!(level.walls[3][6]);
        assert!(!level.walls[2][1]);
        assert!(level.validate().is_ok());
    }

    #[test]
    fn test_unknown_color() {
        let text = LEVEL.replace("blue: 1, B", "violet: 1, B");
        assert!(matches!(
            text.parse::<Level>(),
            Err(LevelError::UnknownColor(color)) if color == "violet"
        ));
    }

    #[test]
    fn test_missing_agent_number() {
        let text = LEVEL.replace("+   1 +", "+   2 +");
        assert!(matches!(
            text.parse::<Level>(),
            Err(LevelError::MissingAgent(1))
        ));
    }

    #[test]
    fn test_validate_missing_box_color() {
        let text = LEVEL.replace("blue: 1, B", "blue: 1");
        let level: Level = text.parse().unwrap();
        assert_eq!(level.validate(), Err(PlanError::MissingBoxColor('B')));
    }

    #[test]
    fn test_validate_orphan_goal() {
        let text = LEVEL.replace("+B    +", "+C    +");
        let level: Level = text.parse().unwrap();
        assert_eq!(level.validate(), Err(PlanError::OrphanGoal('C')));

        let text = LEVEL.replace("+B    +", "+7    +");
        let level: Level = text.parse().unwrap();
        assert_eq!(level.validate(), Err(PlanError::OrphanGoal('7')));
    }

    #[test]
    fn test_validate_too_many_boxes() {
        let row = "A".repeat(300);
        let mut initial = vec![row; 220];
        initial[0].replace_range(0..1, "0");
        let goal = vec![" ".repeat(300); 220];
        let text = format!(
            "#domain\nhospital\n#levelname\nfull\n#colors\nred: 0, A\n#initial\n{}\n#goal\n{}\n#end\n",
            initial.join("\n"),
            goal.join("\n")
        );
        let level: Level = text.parse().unwrap();
        assert_eq!(level.validate(), Err(PlanError::TooManyBoxes(300 * 220 - 1)));
    }

    #[test]
    fn test_validate_inconsistent_dimensions() {
        let mut level: Level = LEVEL.parse().unwrap();
        level.goals.pop();
        assert_eq!(level.validate(), Err(PlanError::InconsistentDimensions));
    }
}

use crate::common::{Position, State};

use std::thread;
use tracing::{debug, info};

/// Returned by [`DistanceOracle::distance`] when no path exists.
pub const UNREACHABLE: usize = usize::MAX;

const INF: u32 = u32::MAX;
// Below this many free cells the fork-join overhead outweighs the relaxation.
const PARALLEL_THRESHOLD: usize = 256;

/// All-pairs shortest 4-connected path lengths between free cells.
#[derive(Debug, Clone)]
pub struct DistanceOracle {
    height: usize,
    width: usize,
    /// Dense index per cell, `None` for walls.
    index: Vec<Option<usize>>,
    cells: usize,
    dist: Vec<u32>,
}

impl DistanceOracle {
    /// Builds the table over the walls of `state`. Boxes and agents are ignored.
    /// `threads == 0` uses the available parallelism.
    pub fn new(state: &State, threads: usize) -> Self {
        let board = &state.board;
        Self::from_walls(board.height, board.width, &board.walls, threads)
    }

    pub(crate) fn from_walls(height: usize, width: usize, walls: &[bool], threads: usize) -> Self {
        let mut index = vec![None; height * width];
        let mut cells = 0;
        for (cell, &wall) in walls.iter().enumerate() {
            if !wall {
                index[cell] = Some(cells);
                cells += 1;
            }
        }

        let mut dist = vec![INF; cells * cells];
        for row in 0..height {
            for col in 0..width {
                let Some(from) = index[row * width + col] else {
                    continue;
                };
                dist[from * cells + from] = 0;
                // East and south neighbours, written both ways.
                for (n_row, n_col) in [(row, col + 1), (row + 1, col)] {
                    if n_row >= height || n_col >= width {
                        continue;
                    }
                    if let Some(to) = index[n_row * width + n_col] {
                        dist[from * cells + to] = 1;
                        dist[to * cells + from] = 1;
                    }
                }
            }
        }

        let threads = if threads == 0 {
            thread::available_parallelism().map_or(1, usize::from)
        } else {
            threads
        };
        let threads = if cells < PARALLEL_THRESHOLD { 1 } else { threads };
        debug!("floyd-warshall over {cells} free cells with {threads} threads");
        floyd_warshall(&mut dist, cells, threads);
        info!("distance table built for {height}x{width} grid");

        DistanceOracle {
            height,
            width,
            index,
            cells,
            dist,
        }
    }

    fn dense(&self, (row, col): Position) -> Option<usize> {
        if row < self.height && col < self.width {
            self.index[row * self.width + col]
        } else {
            None
        }
    }

    /// Shortest path length, or [`UNREACHABLE`] if either cell is a wall or
    /// no path exists.
    pub fn distance(&self, from: Position, to: Position) -> usize {
        match (self.dense(from), self.dense(to)) {
            (Some(from), Some(to)) => match self.dist[from * self.cells + to] {
                INF => UNREACHABLE,
                d => d as usize,
            },
            _ => UNREACHABLE,
        }
    }
}

/// In-place relaxation. Each pivot `k` is finished by every worker before the
/// next one starts; row `k` does not change while `k` is the pivot, so workers
/// share a snapshot of it and own disjoint row ranges.
fn floyd_warshall(dist: &mut [u32], n: usize, threads: usize) {
    if n == 0 {
        return;
    }
    let rows_per_worker = n.div_ceil(threads.max(1));

    for k in 0..n {
        let pivot = dist[k * n..(k + 1) * n].to_vec();
        if threads <= 1 {
            relax(dist, n, &pivot, k);
            continue;
        }
        thread::scope(|scope| {
            for rows in dist.chunks_mut(rows_per_worker * n) {
                let pivot = &pivot;
                scope.spawn(move || relax(rows, n, pivot, k));
            }
        });
    }
}

fn relax(rows: &mut [u32], n: usize, pivot: &[u32], k: usize) {
    for row in rows.chunks_mut(n) {
        let through = row[k];
        if through == INF {
            continue;
        }
        for (cell, &onward) in row.iter_mut().zip(pivot) {
            if onward == INF {
                continue;
            }
            let candidate = through.saturating_add(onward);
            if candidate < *cell {
                *cell = candidate;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::Level;

    fn state(initial: &str) -> State {
        let blank: String = initial
            .chars()
            .map(|ch| if ch == '\n' || ch == '+' { ch } else { ' ' })
            .collect();
        let level: Level = format!(
            "#domain\nhospital\n#levelname\ntest\n#colors\nred: 0\n#initial\n{initial}\n#goal\n{blank}\n#end\n"
        )
        .parse()
        .unwrap();
        State::from_level(&level).unwrap()
    }

    fn free_cells(state: &State) -> Vec<Position> {
        (0..state.height())
            .flat_map(|row| (0..state.width()).map(move |col| (row, col)))
            .filter(|&cell| !state.is_wall(cell))
            .collect()
    }

    #[test]
    fn test_corridor_distances() {
        let state = state("+++++++\n+0    +\n+++++++");
        let oracle = DistanceOracle::new(&state, 1);
        assert_eq!(oracle.distance((1, 1), (1, 1)), 0);
        assert_eq!(oracle.distance((1, 1), (1, 5)), 4);
        assert_eq!(oracle.distance((1, 5), (1, 2)), 3);
        assert_eq!(oracle.distance((0, 0), (1, 1)), UNREACHABLE);
        assert_eq!(oracle.distance((1, 1), (9, 9)), UNREACHABLE);
    }

    #[test]
    fn test_walls_force_detours_and_split_regions() {
        let state = state("+++++\n+0 ++\n++ ++\n+  ++\n+++++\n+  ++\n+++++");
        let oracle = DistanceOracle::new(&state, 1);
        assert_eq!(oracle.distance((1, 1), (3, 1)), 4);
        assert_eq!(oracle.distance((1, 1), (5, 1)), UNREACHABLE);
        assert_eq!(oracle.distance((5, 1), (5, 2)), 1);
    }

    #[test]
    fn test_symmetry_and_triangle_inequality() {
        let state = state("+++++++\n+0 +  +\n+  +  +\n+     +\n+++ + +\n+++++++");
        let oracle = DistanceOracle::new(&state, 1);
        let cells = free_cells(&state);

        for &a in &cells {
            for &b in &cells {
                assert_eq!(oracle.distance(a, b), oracle.distance(b, a));
                for &c in &cells {
                    let ab = oracle.distance(a, b);
                    let bc = oracle.distance(b, c);
                    if ab != UNREACHABLE && bc != UNREACHABLE {
                        assert!(oracle.distance(a, c) <= ab + bc);
                    }
                }
            }
        }
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let mut rows = vec!["+".repeat(22)];
        for row in 0..20 {
            let mut line = String::from("+");
            for col in 0..20 {
                line.push(if row % 4 == 1 && col % 5 != 2 { '+' } else { ' ' });
            }
            line.push('+');
            rows.push(line);
        }
        rows.push("+".repeat(22));
        rows[1].replace_range(1..2, "0");
        let state = state(&rows.join("\n"));

        let sequential = DistanceOracle::new(&state, 1);
        let parallel = DistanceOracle::new(&state, 4);
        assert!(free_cells(&state).len() >= PARALLEL_THRESHOLD);
        assert_eq!(sequential.dist, parallel.dist);
    }
}

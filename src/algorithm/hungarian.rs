use crate::error::PlanError;

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use tracing::trace;

/// Minimum-cost assignment of rows to columns.
///
/// The matrix is padded to an `n x n` square with `padding`; ragged rows are
/// padded too. Returns, per original row, the matched original column or
/// `None` when the row was matched to padding.
pub(crate) fn min_cost_assignment(
    costs: &[Vec<i64>],
    padding: i64,
) -> Result<Vec<Option<usize>>, PlanError> {
    let rows = costs.len();
    let cols = costs.iter().map(Vec::len).max().unwrap_or(0);
    if rows == 0 || cols == 0 {
        return Err(PlanError::EmptyAssignment);
    }

    let n = rows.max(cols);
    let mut cost = vec![vec![padding; n]; n];
    for (row, line) in costs.iter().enumerate() {
        cost[row][..line.len()].copy_from_slice(line);
    }

    // Row reduction.
    for line in cost.iter_mut() {
        let min = line.iter().copied().min().unwrap_or(0);
        line.iter_mut().for_each(|c| *c -= min);
    }

    // Feasible labels: cost[i][j] - u[i] - v[j] >= 0 everywhere.
    let mut v: Vec<i64> = (0..n)
        .map(|j| (0..n).map(|i| cost[i][j]).min().unwrap_or(0))
        .collect();
    let mut u: Vec<i64> = (0..n)
        .map(|i| (0..n).map(|j| cost[i][j] - v[j]).min().unwrap_or(0))
        .collect();

    let mut match_row: Vec<Option<usize>> = vec![None; n];
    let mut match_col: Vec<Option<usize>> = vec![None; n];

    for i in 0..n {
        for j in 0..n {
            if match_row[i].is_none() && match_col[j].is_none() && cost[i][j] - u[i] - v[j] == 0 {
                match_row[i] = Some(j);
                match_col[j] = Some(i);
            }
        }
    }

    for w in 0..n {
        if match_row[w].is_none() {
            augment(&cost, &mut u, &mut v, &mut match_row, &mut match_col, w);
        }
    }

    Ok(match_row
        .into_iter()
        .take(rows)
        .map(|col| col.filter(|&col| col < cols))
        .collect())
}

/// Shortest augmenting path from the free row `w` over reduced costs, then
/// relabels so every edge on the path and every matched edge stays tight.
fn augment(
    cost: &[Vec<i64>],
    u: &mut [i64],
    v: &mut [i64],
    match_row: &mut [Option<usize>],
    match_col: &mut [Option<usize>],
    w: usize,
) {
    let n = cost.len();
    let reduced = |u: &[i64], v: &[i64], i: usize, j: usize| cost[i][j] - u[i] - v[j];

    let mut dist: Vec<i64> = (0..n).map(|j| reduced(u, v, w, j)).collect();
    let mut prev_row = vec![w; n];
    let mut visited = vec![false; n];
    let mut settled = Vec::new();
    let mut slack: BinaryHeap<Reverse<(i64, usize)>> =
        dist.iter().enumerate().map(|(j, &d)| Reverse((d, j))).collect();

    let (sink, shortest) = loop {
        let Some(Reverse((d, j))) = slack.pop() else {
            return;
        };
        if visited[j] || d != dist[j] {
            continue;
        }
        visited[j] = true;
        settled.push(j);

        let Some(i) = match_col[j] else {
            break (j, d);
        };
        for k in 0..n {
            if visited[k] {
                continue;
            }
            let candidate = d + reduced(u, v, i, k) - reduced(u, v, i, j);
            if candidate < dist[k] {
                dist[k] = candidate;
                prev_row[k] = i;
                slack.push(Reverse((candidate, k)));
            }
        }
    };
    trace!("augmenting row {w} through column {sink}, distance {shortest}");

    u[w] += shortest;
    for &k in &settled {
        let delta = shortest - dist[k];
        v[k] -= delta;
        if let Some(i) = match_col[k] {
            u[i] += delta;
        }
    }

    let mut col = sink;
    loop {
        let row = prev_row[col];
        let previous = match_row[row].replace(col);
        match_col[col] = Some(row);
        match previous {
            Some(next) => col = next,
            None => break,
        }
    }
}

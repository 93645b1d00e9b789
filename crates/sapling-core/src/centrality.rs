//! Centrality measures over a dense, deduplicated adjacency view
//!
//! Conventions follow the usual directed-graph definitions: degree centrality
//! is normalised by `n - 1`, PageRank spreads dangling mass uniformly,
//! closeness uses inward distances, betweenness is normalised by
//! `(n - 1)(n - 2)`. Iterative measures report non-convergence as an error so
//! callers can zero-fill.

use std::collections::VecDeque;

use crate::error::ScoreError;

pub const PAGERANK_DAMPING: f64 = 0.85;
pub const MAX_ITERATIONS: usize = 100;
pub const TOLERANCE: f64 = 1.0e-6;

/// Directed simple graph on nodes `0..n` with at most one edge per ordered pair.
#[derive(Debug, Clone, Default)]
pub struct Adjacency {
    out: Vec<Vec<(usize, f64)>>,
    inc: Vec<Vec<(usize, f64)>>,
}

impl Adjacency {
    pub fn new(n: usize) -> Self {
        Adjacency {
            out: vec![Vec::new(); n],
            inc: vec![Vec::new(); n],
        }
    }

    /// Insert `source -> target`. A repeated pair keeps the larger weight.
    pub fn add_edge(&mut self, source: usize, target: usize, weight: f64) {
        if source >= self.len() || target >= self.len() {
            return;
        }
        if let Some(existing) = self.out[source].iter_mut().find(|(t, _)| *t == target) {
            if weight > existing.1 {
                existing.1 = weight;
                if let Some(back) = self.inc[target].iter_mut().find(|(s, _)| *s == source) {
                    back.1 = weight;
                }
            }
            return;
        }
        self.out[source].push((target, weight));
        self.inc[target].push((source, weight));
    }

    pub fn len(&self) -> usize {
        self.out.len()
    }

    pub fn is_empty(&self) -> bool {
        self.out.is_empty()
    }

    pub fn in_degree(&self, node: usize) -> usize {
        self.inc[node].len()
    }

    pub fn out_degree(&self, node: usize) -> usize {
        self.out[node].len()
    }
}

pub fn in_degree_centrality(adj: &Adjacency) -> Vec<f64> {
    degree_centrality(adj, Adjacency::in_degree)
}

pub fn out_degree_centrality(adj: &Adjacency) -> Vec<f64> {
    degree_centrality(adj, Adjacency::out_degree)
}

fn degree_centrality(adj: &Adjacency, degree: fn(&Adjacency, usize) -> usize) -> Vec<f64> {
    let n = adj.len();
    if n <= 1 {
        return vec![1.0; n];
    }
    let scale = 1.0 / (n - 1) as f64;
    (0..n).map(|v| degree(adj, v) as f64 * scale).collect()
}

/// Weighted PageRank by power iteration, giving up after `max_iterations`.
pub fn pagerank(adj: &Adjacency, alpha: f64, max_iterations: usize) -> Result<Vec<f64>, ScoreError> {
    let n = adj.len();
    if n == 0 {
        return Ok(Vec::new());
    }
    let nf = n as f64;
    let out_weight: Vec<f64> = adj
        .out
        .iter()
        .map(|edges| edges.iter().map(|(_, w)| w).sum())
        .collect();

    let mut x = vec![1.0 / nf; n];
    for _ in 0..max_iterations {
        let last = std::mem::replace(&mut x, vec![0.0; n]);
        let dangling: f64 = (0..n)
            .filter(|&u| out_weight[u] <= 0.0)
            .map(|u| last[u])
            .sum::<f64>()
            * alpha;

        for u in 0..n {
            if out_weight[u] <= 0.0 {
                continue;
            }
            for &(v, w) in &adj.out[u] {
                x[v] += alpha * last[u] * w / out_weight[u];
            }
        }
        let base = dangling / nf + (1.0 - alpha) / nf;
        for value in x.iter_mut() {
            *value += base;
        }

        let err: f64 = x.iter().zip(&last).map(|(a, b)| (a - b).abs()).sum();
        if err < nf * TOLERANCE {
            return Ok(x);
        }
    }

    Err(ScoreError::NotConverged {
        measure: "pagerank",
        iterations: max_iterations,
    })
}

/// Eigenvector centrality on incoming edges, iterating `(A^T + I)` to avoid
/// oscillation on bipartite structures.
pub fn eigenvector(adj: &Adjacency, max_iterations: usize) -> Result<Vec<f64>, ScoreError> {
    let n = adj.len();
    if n == 0 {
        return Ok(Vec::new());
    }
    let nf = n as f64;
    let mut x = vec![1.0 / nf; n];
    for _ in 0..max_iterations {
        let last = x.clone();
        for u in 0..n {
            for &(v, w) in &adj.out[u] {
                x[v] += last[u] * w;
            }
        }
        let norm = x.iter().map(|v| v * v).sum::<f64>().sqrt();
        let norm = if norm == 0.0 { 1.0 } else { norm };
        for value in x.iter_mut() {
            *value /= norm;
        }
        let err: f64 = x.iter().zip(&last).map(|(a, b)| (a - b).abs()).sum();
        if err < nf * TOLERANCE {
            return Ok(x);
        }
    }

    Err(ScoreError::NotConverged {
        measure: "eigenvector",
        iterations: max_iterations,
    })
}

/// Brandes betweenness on the unweighted graph.
pub fn betweenness(adj: &Adjacency) -> Vec<f64> {
    let n = adj.len();
    let mut centrality = vec![0.0; n];

    for s in 0..n {
        let mut stack = Vec::with_capacity(n);
        let mut preds: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut sigma = vec![0.0_f64; n];
        let mut dist = vec![-1_i64; n];
        sigma[s] = 1.0;
        dist[s] = 0;

        let mut queue = VecDeque::from([s]);
        while let Some(v) = queue.pop_front() {
            stack.push(v);
            for &(w, _) in &adj.out[v] {
                if dist[w] < 0 {
                    dist[w] = dist[v] + 1;
                    queue.push_back(w);
                }
                if dist[w] == dist[v] + 1 {
                    sigma[w] += sigma[v];
                    preds[w].push(v);
                }
            }
        }

        let mut delta = vec![0.0_f64; n];
        while let Some(w) = stack.pop() {
            for &v in &preds[w] {
                delta[v] += sigma[v] / sigma[w] * (1.0 + delta[w]);
            }
            if w != s {
                centrality[w] += delta[w];
            }
        }
    }

    if n > 2 {
        let scale = 1.0 / ((n - 1) * (n - 2)) as f64;
        for value in centrality.iter_mut() {
            *value *= scale;
        }
    }
    centrality
}

/// Closeness using distances *to* each node, scaled by the reachable fraction.
pub fn closeness(adj: &Adjacency) -> Vec<f64> {
    let n = adj.len();
    if n <= 1 {
        return vec![0.0; n];
    }
    (0..n)
        .map(|u| {
            let mut dist = vec![usize::MAX; n];
            dist[u] = 0;
            let mut queue = VecDeque::from([u]);
            let mut total = 0usize;
            let mut reached = 1usize;
            while let Some(v) = queue.pop_front() {
                for &(p, _) in &adj.inc[v] {
                    if dist[p] == usize::MAX {
                        dist[p] = dist[v] + 1;
                        total += dist[p];
                        reached += 1;
                        queue.push_back(p);
                    }
                }
            }
            if total == 0 {
                return 0.0;
            }
            let r = (reached - 1) as f64;
            (r / total as f64) * (r / (n - 1) as f64)
        })
        .collect()
}

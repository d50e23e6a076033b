//! Path files.
//!
//! A path is one or more segments (strokes) of points. Two formats are
//! accepted:
//!
//! ```text
//! # text: one point per line; a blank line starts a new segment
//! 0.0, 0.0
//! 1.5, -2
//!
//! 4, 4
//! ```
//!
//! ```json
//! [[0.0, 0.0], [1.5, -2.0]]
//! [[[0.0, 0.0], [1.5, -2.0]], [[4.0, 4.0]]]
//! ```
//!
//! A file is read as JSON when its extension is `.json` or its first
//! non-blank character is `[`.
//!
//! Segments are sent in file order, or reordered with [`order_segments`] to
//! shorten the travel between strokes.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PathError {
    #[error("cannot read path file: {0}")]
    Io(#[from] std::io::Error),

    #[error("line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error("invalid JSON path: {0}")]
    Json(#[from] serde_json::Error),

    #[error("point {index} is not finite")]
    NonFinite { index: usize },

    #[error("scale divisor must be positive and finite, got {0}")]
    InvalidScale(f64),

    #[error("path is empty")]
    Empty,
}

/// One target in caller units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct PathPoint {
    pub x: f64,
    pub y: f64,
}

impl PathPoint {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_sq(&self, other: &Self) -> f64 {
        let (dx, dy) = (self.x - other.x, self.y - other.y);
        dx * dx + dy * dy
    }
}

impl From<[f64; 2]> for PathPoint {
    fn from([x, y]: [f64; 2]) -> Self {
        Self { x, y }
    }
}

impl From<PathPoint> for [f64; 2] {
    fn from(p: PathPoint) -> Self {
        [p.x, p.y]
    }
}

/// A path as an ordered list of segments.
pub type Segments = Vec<Vec<PathPoint>>;

#[derive(Deserialize)]
#[serde(untagged)]
enum JsonPath {
    Points(Vec<PathPoint>),
    Segments(Segments),
}

/// Parse the line-oriented text format into segments.
pub fn parse_text_segments(content: &str) -> Result<Segments, PathError> {
    let mut segments: Segments = vec![Vec::new()];
    for (idx, raw) in content.lines().enumerate() {
        let line = idx + 1;
        if raw.trim().is_empty() {
            if segments.last().is_some_and(|s| !s.is_empty()) {
                segments.push(Vec::new());
            }
            continue;
        }
        let text = raw.split('#').next().unwrap_or_default().trim();
        if text.is_empty() {
            continue;
        }

        let fields: Vec<&str> = text.split(',').map(str::trim).collect();
        let [x, y] = fields.as_slice() else {
            return Err(PathError::Parse {
                line,
                reason: format!("expected `x,y`, found {} fields", fields.len()),
            });
        };
        let coord = |s: &str| {
            s.parse::<f64>().map_err(|e| PathError::Parse {
                line,
                reason: format!("{s:?}: {e}"),
            })
        };
        if let Some(segment) = segments.last_mut() {
            segment.push(PathPoint::new(coord(*x)?, coord(*y)?));
        }
    }
    finish(segments)
}

/// Parse the text format as one flat path.
pub fn parse_text(content: &str) -> Result<Vec<PathPoint>, PathError> {
    parse_text_segments(content).map(flatten)
}

/// Parse a JSON array of `[x, y]` pairs, or an array of such arrays.
pub fn parse_json_segments(content: &str) -> Result<Segments, PathError> {
    let segments = match serde_json::from_str(content)? {
        JsonPath::Points(points) => vec![points],
        JsonPath::Segments(segments) => segments,
    };
    finish(segments)
}

/// Parse the JSON format as one flat path.
pub fn parse_json(content: &str) -> Result<Vec<PathPoint>, PathError> {
    parse_json_segments(content).map(flatten)
}

/// Load a path file as segments, picking the format from extension or
/// content.
pub fn load_segments(path: &Path) -> Result<Segments, PathError> {
    let content = fs::read_to_string(path)?;
    let is_json = path.extension().is_some_and(|ext| ext == "json")
        || content.trim_start().starts_with('[');
    if is_json {
        parse_json_segments(&content)
    } else {
        parse_text_segments(&content)
    }
}

/// Load a path file as one flat path in file order.
pub fn load_path(path: &Path) -> Result<Vec<PathPoint>, PathError> {
    load_segments(path).map(flatten)
}

pub fn flatten(segments: Segments) -> Vec<PathPoint> {
    segments.into_iter().flatten().collect()
}

/// Join segments into one path with short hops between them.
///
/// Segments are weighted by the distance between their closest pair of
/// points. The visiting order is a depth-first walk of the minimum spanning
/// tree over those weights, starting at the first segment. Each segment is
/// entered from whichever end lies closer to the previous exit point.
pub fn order_segments(segments: Segments) -> Vec<PathPoint> {
    let mut segments: Vec<Option<Vec<PathPoint>>> = segments
        .into_iter()
        .filter(|s| !s.is_empty())
        .map(Some)
        .collect();
    let n = segments.len();
    if n <= 1 {
        return segments.into_iter().flatten().flatten().collect();
    }

    let mut weights = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in (i + 1)..n {
            let (Some(a), Some(b)) = (&segments[i], &segments[j]) else {
                continue;
            };
            let d = segment_gap(a, b);
            weights[i][j] = d;
            weights[j][i] = d;
        }
    }

    let mut path: Vec<PathPoint> = Vec::new();
    for idx in depth_first(&spanning_tree(&weights)) {
        let Some(mut segment) = segments[idx].take() else {
            continue;
        };
        let reverse = match (path.last(), segment.first(), segment.last()) {
            (Some(exit), Some(first), Some(last)) => {
                exit.distance_sq(last) < exit.distance_sq(first)
            }
            _ => false,
        };
        if reverse {
            segment.reverse();
        }
        path.extend(segment);
    }
    path
}

/// Squared distance between the closest points of two segments.
fn segment_gap(a: &[PathPoint], b: &[PathPoint]) -> f64 {
    a.iter()
        .flat_map(|p| b.iter().map(move |q| p.distance_sq(q)))
        .fold(f64::INFINITY, f64::min)
}

/// Prim's algorithm over a dense weight matrix, rooted at node 0. Returns
/// the children of every node in the order they joined the tree.
fn spanning_tree(weights: &[Vec<f64>]) -> Vec<Vec<usize>> {
    let n = weights.len();
    let mut in_tree = vec![false; n];
    let mut key = vec![f64::INFINITY; n];
    let mut parent: Vec<Option<usize>> = vec![None; n];
    let mut children = vec![Vec::new(); n];
    key[0] = 0.0;

    for _ in 0..n {
        let Some(u) = (0..n)
            .filter(|&i| !in_tree[i])
            .min_by(|&a, &b| key[a].total_cmp(&key[b]))
        else {
            break;
        };
        in_tree[u] = true;
        if let Some(p) = parent[u] {
            children[p].push(u);
        }
        for v in 0..n {
            if !in_tree[v] && weights[u][v] < key[v] {
                key[v] = weights[u][v];
                parent[v] = Some(u);
            }
        }
    }
    children
}

/// Pre-order walk from node 0.
fn depth_first(children: &[Vec<usize>]) -> Vec<usize> {
    let mut order = Vec::with_capacity(children.len());
    let mut stack = vec![0];
    while let Some(node) = stack.pop() {
        order.push(node);
        stack.extend(children[node].iter().rev());
    }
    order
}

fn finish(mut segments: Segments) -> Result<Segments, PathError> {
    segments.retain(|s| !s.is_empty());
    let points: Vec<PathPoint> = segments.iter().flatten().copied().collect();
    validate(&points)?;
    Ok(segments)
}

/// Divide every coordinate by `divisor` (e.g. pixels to machine units).
pub fn scale(points: &mut [PathPoint], divisor: f64) -> Result<(), PathError> {
    if !divisor.is_finite() || divisor <= 0.0 {
        return Err(PathError::InvalidScale(divisor));
    }
    for p in points.iter_mut() {
        p.x /= divisor;
        p.y /= divisor;
    }
    Ok(())
}

/// Keep every `stride`-th point. The last point is always kept so the path
/// ends where the file does.
pub fn decimate(points: Vec<PathPoint>, stride: usize) -> Vec<PathPoint> {
    if stride <= 1 || points.len() <= 1 {
        return points;
    }
    let last = points.len() - 1;
    points
        .into_iter()
        .enumerate()
        .filter(|(i, _)| i % stride == 0 || *i == last)
        .map(|(_, p)| p)
        .collect()
}

fn validate(points: &[PathPoint]) -> Result<(), PathError> {
    if points.is_empty() {
        return Err(PathError::Empty);
    }
    match points
        .iter()
        .position(|p| !p.x.is_finite() || !p.y.is_finite())
    {
        Some(index) => Err(PathError::NonFinite { index }),
        None => Ok(()),
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The source finder (§4.6): a dual-threshold connected-component detector
//! with spatial/spectral merging, optional growth, and rejection rules.

mod error;
pub use error::FinderError;
#[cfg(test)]
mod tests;

use std::collections::VecDeque;

use crate::cube::Cube;
use crate::detection::{Detection, Object2D, Scan};
use crate::math::stats::{Statistics, Threshold};

/// Which axis primary runs are formed along first.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchKind {
    /// Runs are extracted along rows (x) within each channel.
    Spatial,
    /// Runs are extracted along the spectral axis (z) for each pixel,
    /// then folded back into per-channel scans.
    Spectral,
}

/// The spatial/spectral gap tolerance used when deciding whether two
/// footprints are adjacent.
#[derive(Clone, Copy, Debug)]
pub enum Adjacency {
    /// Explicit pixel/channel gaps.
    Gaps { spatial: usize, velocity: usize },
    /// Only strictly touching voxels merge (equivalent to zero gaps).
    AdjacentOnly,
}

impl Adjacency {
    fn spatial_gap(self) -> usize {
        match self {
            Adjacency::Gaps { spatial, .. } => spatial,
            Adjacency::AdjacentOnly => 0,
        }
    }

    fn velocity_gap(self) -> usize {
        match self {
            Adjacency::Gaps { velocity, .. } => velocity,
            Adjacency::AdjacentOnly => 0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct FinderOptions {
    pub primary: Threshold,
    pub secondary: Threshold,
    pub search_kind: SearchKind,
    pub adjacency: Adjacency,
    pub min_channels: usize,
    pub min_pixels_per_channel: usize,
    pub min_voxels: usize,
    pub max_channels: usize,
    pub grow: bool,
    /// When set, a relaxed adjacency policy used for a second 3D-linking
    /// pass over the surviving detections.
    pub two_stage: Option<Adjacency>,
}

impl Default for FinderOptions {
    fn default() -> Self {
        Self {
            primary: Threshold::SnrCut(5.0),
            secondary: Threshold::SnrCut(3.0),
            search_kind: SearchKind::Spatial,
            adjacency: Adjacency::AdjacentOnly,
            min_channels: 1,
            min_pixels_per_channel: 1,
            min_voxels: 1,
            max_channels: usize::MAX,
            grow: true,
            two_stage: None,
        }
    }
}

/// Per-voxel growth state (§4.6 step 4).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum VoxelState {
    Blank,
    Available,
    Detected,
}

/// Run the finder over `cube`, returning detections sorted by descending
/// voxel count.
pub fn find(cube: &Cube, options: &FinderOptions) -> Result<Vec<Detection>, FinderError> {
    let (nx, ny, nz) = cube.dims();
    if nx == 0 || ny == 0 || nz == 0 {
        return Err(FinderError::EmptyCube);
    }

    let values: Vec<f64> = cube
        .data()
        .iter()
        .copied()
        .map(|v| v as f64)
        .filter(|v| v.is_finite())
        .collect();
    let sigma = Statistics::compute(&values).robust_sigma();
    let primary = options.primary.resolve(sigma);
    let secondary = options.secondary.resolve(sigma);
    if secondary > primary {
        return Err(FinderError::InvalidThresholds);
    }

    let mut per_channel_objects: Vec<Vec<Object2D>> = Vec::with_capacity(nz);
    for z in 0..nz {
        let raw = raw_scans(cube, z, primary, options.search_kind);
        per_channel_objects.push(merge_2d(raw, options.adjacency.spatial_gap()));
    }

    let mut detections = link_3d(&per_channel_objects, options.adjacency);

    if options.grow {
        for det in &mut detections {
            grow(cube, det, secondary);
        }
    }

    detections.retain(|d| {
        d.channel_count() >= options.min_channels
            && d.channel_count() <= options.max_channels
            && d.voxel_count() >= options.min_voxels
            && d.planes
                .values()
                .map(Object2D::voxel_count)
                .max()
                .unwrap_or(0)
                >= options.min_pixels_per_channel
    });

    if let Some(relaxed) = options.two_stage {
        detections = relink(detections, relaxed);
    }

    detections.sort_by(|a, b| b.voxel_count().cmp(&a.voxel_count()));
    Ok(detections)
}

/// Extract raw, unmerged scans for one channel.
fn raw_scans(cube: &Cube, z: usize, primary: f64, search_kind: SearchKind) -> Vec<Scan> {
    let (nx, ny, _) = cube.dims();
    let mut scans = Vec::new();
    match search_kind {
        SearchKind::Spatial => {
            for y in 0..ny {
                let mut run_start: Option<usize> = None;
                for x in 0..nx {
                    let above = !cube.is_blank(x, y, z) && cube.get(x, y, z) as f64 > primary;
                    match (above, run_start) {
                        (true, None) => run_start = Some(x),
                        (false, Some(s)) => {
                            scans.push(Scan { y, x_start: s, x_end: x });
                            run_start = None;
                        }
                        _ => {}
                    }
                }
                if let Some(s) = run_start {
                    scans.push(Scan { y, x_start: s, x_end: nx });
                }
            }
        }
        SearchKind::Spectral => {
            // A spectral run through (x, y) contributes a single-voxel
            // scan to this channel if z lies inside the run.
            let (_, _, nz) = cube.dims();
            for y in 0..ny {
                for x in 0..nx {
                    let mut run_start: Option<usize> = None;
                    for zz in 0..nz {
                        let above = !cube.is_blank(x, y, zz) && cube.get(x, y, zz) as f64 > primary;
                        if above && run_start.is_none() {
                            run_start = Some(zz);
                        } else if !above {
                            if let Some(s) = run_start {
                                if (s..zz).contains(&z) {
                                    scans.push(Scan { y, x_start: x, x_end: x + 1 });
                                }
                                run_start = None;
                            }
                        }
                    }
                    if let Some(s) = run_start {
                        if (s..nz).contains(&z) {
                            scans.push(Scan { y, x_start: x, x_end: x + 1 });
                        }
                    }
                }
            }
        }
    }
    scans
}

/// Merge raw scans within one channel into connected [`Object2D`]s, using
/// union-find over the `touches` relation.
fn merge_2d(raw: Vec<Scan>, gap: usize) -> Vec<Object2D> {
    let n = raw.len();
    let mut parent: Vec<usize> = (0..n).collect();
    fn find(parent: &mut [usize], i: usize) -> usize {
        if parent[i] != i {
            parent[i] = find(parent, parent[i]);
        }
        parent[i]
    }
    for i in 0..n {
        for j in (i + 1)..n {
            if raw[i].touches(&raw[j], gap) {
                let ri = find(&mut parent, i);
                let rj = find(&mut parent, j);
                if ri != rj {
                    parent[ri] = rj;
                }
            }
        }
    }
    let mut groups: std::collections::HashMap<usize, Object2D> = std::collections::HashMap::new();
    for (i, scan) in raw.into_iter().enumerate() {
        let root = find(&mut parent, i);
        groups.entry(root).or_default().scans.push(scan);
    }
    groups.into_values().collect()
}

/// Link per-channel [`Object2D`]s into [`Detection`]s when their footprints
/// overlap within `adjacency`'s velocity gap and spatial gap. Union-find over
/// all (channel, object) pairs, mirroring `merge_2d`'s approach, so an object
/// that bridges two otherwise-separate detections merges both into one.
fn link_3d(per_channel: &[Vec<Object2D>], adjacency: Adjacency) -> Vec<Detection> {
    let velocity_gap = adjacency.velocity_gap();
    let spatial_gap = adjacency.spatial_gap();

    let items: Vec<(usize, Object2D)> = per_channel
        .iter()
        .enumerate()
        .flat_map(|(z, objects)| objects.iter().cloned().map(move |obj| (z, obj)))
        .collect();
    let n = items.len();

    let mut parent: Vec<usize> = (0..n).collect();
    fn find(parent: &mut [usize], i: usize) -> usize {
        if parent[i] != i {
            parent[i] = find(parent, parent[i]);
        }
        parent[i]
    }
    for i in 0..n {
        for j in (i + 1)..n {
            let (zi, oi) = &items[i];
            let (zj, oj) = &items[j];
            if zi.abs_diff(*zj) <= velocity_gap && oi.overlaps(oj, spatial_gap) {
                let ri = find(&mut parent, i);
                let rj = find(&mut parent, j);
                if ri != rj {
                    parent[ri] = rj;
                }
            }
        }
    }

    let mut groups: std::collections::HashMap<usize, Detection> = std::collections::HashMap::new();
    for (i, (z, obj)) in items.into_iter().enumerate() {
        let root = find(&mut parent, i);
        groups
            .entry(root)
            .or_default()
            .planes
            .entry(z)
            .or_default()
            .merge(obj);
    }
    groups.into_values().collect()
}

/// Re-run 3D linking over already-formed detections with a relaxed
/// adjacency policy (§4.6 step 6, "two-stage merging").
fn relink(detections: Vec<Detection>, relaxed: Adjacency) -> Vec<Detection> {
    let spatial_gap = relaxed.spatial_gap();
    let velocity_gap = relaxed.velocity_gap();

    let mut merged: Vec<Detection> = Vec::new();
    'outer: for det in detections {
        for existing in merged.iter_mut() {
            if detections_are_adjacent(existing, &det, spatial_gap, velocity_gap) {
                for (z, obj) in det.planes {
                    existing.planes.entry(z).or_default().merge(obj);
                }
                continue 'outer;
            }
        }
        merged.push(det);
    }
    merged
}

fn detections_are_adjacent(a: &Detection, b: &Detection, spatial_gap: usize, velocity_gap: usize) -> bool {
    for (&za, obj_a) in &a.planes {
        for (&zb, obj_b) in &b.planes {
            if za.abs_diff(zb) <= velocity_gap && obj_a.overlaps(obj_b, spatial_gap) {
                return true;
            }
        }
    }
    false
}

/// Grow a detection into neighbouring voxels above the secondary threshold
/// (§4.6 step 4), using 6-connectivity, independently of other detections.
fn grow(cube: &Cube, detection: &mut Detection, secondary: f64) {
    let (nx, ny, nz) = cube.dims();
    let state_at = |x: usize, y: usize, z: usize| -> VoxelState {
        if cube.is_blank(x, y, z) {
            VoxelState::Blank
        } else if cube.get(x, y, z) as f64 > secondary {
            VoxelState::Available
        } else {
            VoxelState::Blank
        }
    };

    let mut queue: VecDeque<(usize, usize, usize)> = VecDeque::new();
    for (&z, obj) in &detection.planes {
        for (x, y) in obj.iter_voxels() {
            queue.push_back((x, y, z));
        }
    }

    while let Some((x, y, z)) = queue.pop_front() {
        let neighbours = [
            (x.wrapping_sub(1), y, z),
            (x + 1, y, z),
            (x, y.wrapping_sub(1), z),
            (x, y + 1, z),
            (x, y, z.wrapping_sub(1)),
            (x, y, z + 1),
        ];
        for (nx2, ny2, nz2) in neighbours {
            if nx2 >= nx || ny2 >= ny || nz2 >= nz {
                continue;
            }
            let already = detection
                .planes
                .get(&nz2)
                .map(|obj| obj.iter_voxels().any(|(vx, vy)| vx == nx2 && vy == ny2))
                .unwrap_or(false);
            if already {
                continue;
            }
            if state_at(nx2, ny2, nz2) == VoxelState::Available {
                detection
                    .planes
                    .entry(nz2)
                    .or_default()
                    .scans
                    .push(Scan { y: ny2, x_start: nx2, x_end: nx2 + 1 });
                queue.push_back((nx2, ny2, nz2));
            }
        }
    }
}

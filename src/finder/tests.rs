// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use super::*;
use crate::math::stats::Threshold;
use ndarray::Array3;

fn cube_with_blob() -> Cube {
    let mut data = Array3::<f32>::from_elem((20, 20, 10), 0.1);
    for z in 3..7 {
        for x in 8..12 {
            for y in 8..12 {
                data[[x, y, z]] = 10.0;
            }
        }
    }
    Cube::from_array(data, f32::NAN)
}

#[test]
fn empty_cube_is_rejected() {
    let cube = Cube::from_array(Array3::<f32>::zeros((0, 0, 0)), f32::NAN);
    let result = find(&cube, &FinderOptions::default());
    assert!(matches!(result, Err(FinderError::EmptyCube)));
}

#[test]
fn secondary_above_primary_is_rejected() {
    let cube = cube_with_blob();
    let options = FinderOptions {
        primary: Threshold::Absolute(1.0),
        secondary: Threshold::Absolute(2.0),
        ..Default::default()
    };
    assert!(matches!(find(&cube, &options), Err(FinderError::InvalidThresholds)));
}

#[test]
fn finds_single_blob() {
    let cube = cube_with_blob();
    let options = FinderOptions {
        primary: Threshold::Absolute(5.0),
        secondary: Threshold::Absolute(1.0),
        min_voxels: 1,
        grow: false,
        ..Default::default()
    };
    let detections = find(&cube, &options).unwrap();
    assert_eq!(detections.len(), 1);
    assert_eq!(detections[0].voxel_count(), 4 * 4 * 4);
}

#[test]
fn rejects_detections_below_min_voxels() {
    let cube = cube_with_blob();
    let options = FinderOptions {
        primary: Threshold::Absolute(5.0),
        secondary: Threshold::Absolute(1.0),
        min_voxels: 10_000,
        grow: false,
        ..Default::default()
    };
    let detections = find(&cube, &options).unwrap();
    assert!(detections.is_empty());
}

#[test]
fn growth_extends_detection_into_secondary_threshold_voxels() {
    let mut data = Array3::<f32>::from_elem((20, 20, 10), 0.1);
    for z in 4..6 {
        for x in 9..11 {
            for y in 9..11 {
                data[[x, y, z]] = 10.0;
            }
        }
    }
    // A skirt of secondary-threshold flux around the core.
    for z in 3..7 {
        for x in 7..13 {
            for y in 7..13 {
                if data[[x, y, z]] < 1.0 {
                    data[[x, y, z]] = 2.0;
                }
            }
        }
    }
    let cube = Cube::from_array(data, f32::NAN);
    let options = FinderOptions {
        primary: Threshold::Absolute(5.0),
        secondary: Threshold::Absolute(1.0),
        grow: true,
        ..Default::default()
    };
    let detections = find(&cube, &options).unwrap();
    assert_eq!(detections.len(), 1);
    assert!(detections[0].voxel_count() > 2 * 2 * 2);
}

#[test]
fn link_3d_merges_detections_bridged_by_a_later_object() {
    // Two disjoint objects at channel 0, bridged by a single wider object
    // at channel 1 that overlaps both. A correct 3D link must fold all
    // three into one detection rather than leaving the second behind.
    let ch0 = vec![
        Object2D {
            scans: vec![Scan { y: 0, x_start: 0, x_end: 2 }],
        },
        Object2D {
            scans: vec![Scan { y: 0, x_start: 5, x_end: 7 }],
        },
    ];
    let ch1 = vec![Object2D {
        scans: vec![Scan { y: 0, x_start: 1, x_end: 6 }],
    }];
    let per_channel = vec![ch0, ch1];

    let detections = link_3d(&per_channel, Adjacency::Gaps { spatial: 0, velocity: 1 });
    assert_eq!(detections.len(), 1, "bridging object should merge both detections");
    assert_eq!(detections[0].voxel_count(), 2 + 2 + 5);
}

#[test]
fn results_are_sorted_by_descending_voxel_count() {
    let mut data = Array3::<f32>::from_elem((30, 10, 10), 0.1);
    for z in 2..4 {
        for x in 2..4 {
            data[[x, 2, z]] = 10.0;
        }
    }
    for z in 2..8 {
        for x in 20..26 {
            data[[x, 7, z]] = 10.0;
        }
    }
    let cube = Cube::from_array(data, f32::NAN);
    let options = FinderOptions {
        primary: Threshold::Absolute(5.0),
        secondary: Threshold::Absolute(1.0),
        grow: false,
        ..Default::default()
    };
    let detections = find(&cube, &options).unwrap();
    assert!(detections.len() >= 2);
    assert!(detections[0].voxel_count() >= detections[1].voxel_count());
}

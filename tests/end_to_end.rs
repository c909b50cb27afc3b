//! Whole-pipeline runs on synthetic phantoms

mod common;

use common::*;
use float_eq::assert_float_eq;
use vessel_core::graph::arc_cost;
use vessel_core::marching::StopReason;
use vessel_core::pipeline::{dijkstra_votes, vessel_marching_votes, vesselness_from_intensity};
use vessel_core::utils::mask::{ball_mask, create_box_mask, mask_from_coords};
use vessel_core::{parse_config, NiftiStore, PipelineConfig, Volume, VolumeMeta, VolumeStore};

fn small_scales() -> PipelineConfig {
    parse_config(r#"{ "multiscale": { "sigma_min": 1.0, "sigma_max": 2.0, "num_steps": 2 } }"#).unwrap()
}

#[test]
fn test_line_vesselness_peaks_on_the_line() {
    let dims = (5, 5, 5);
    let intensity = line_z(dims, 2, 2, 100.0);
    let fields = vesselness_from_intensity(&intensity, &full_mask(dims), &small_scales()).unwrap();

    let centre = fields.vesselness[[2, 2, 2]];
    assert!(centre > 0.0);
    for corner in [[0, 0, 2], [4, 0, 2], [0, 4, 2], [4, 4, 2]] {
        assert!(centre > fields.vesselness[corner], "corner {:?}", corner);
    }
    let scale = fields.scale[[2, 2, 2]];
    assert!((scale - 1.0).abs() < 1e-9 || (scale - 2.0).abs() < 1e-9, "scale {}", scale);

    // tube axis along z
    let o = fields.orientation[[2, 2, 2]];
    assert_float_eq!(o[2].abs(), 1.0, abs <= 1e-6);
}

#[test]
fn test_dark_object_setting_suppresses_bright_tube() {
    let dims = (7, 7, 5);
    let intensity = tube_z(dims, 1.0, 100.0);
    let mut config = small_scales();
    config.multiscale.objectness.bright_object = false;
    let fields = vesselness_from_intensity(&intensity, &full_mask(dims), &config).unwrap();
    assert_eq!(fields.vesselness[[3, 3, 2]], 0.0);
}

#[test]
fn test_vesselness_is_zero_outside_mask() {
    let dims = (7, 7, 5);
    let intensity = tube_z(dims, 1.0, 100.0);
    let mask = create_box_mask(dims, VolumeMeta::default(), [2, 2, 0], [4, 4, 4]);
    let fields = vesselness_from_intensity(&intensity, &mask, &small_scales()).unwrap();
    assert!(fields.vesselness[[3, 3, 2]] > 0.0);
    for ijk in fields.vesselness.iter_coords() {
        if mask[ijk] == 0 {
            assert_eq!(fields.vesselness[ijk], 0.0);
            assert_eq!(fields.scale[ijk], 0.0);
        }
    }
}

#[test]
fn test_corridor_distance_and_votes() {
    let dims = (7, 3, 3);
    let vesselness = Volume::new(dims, VolumeMeta::default(), 1.0);
    let corridor = row_mask(dims, 1, 1);
    let target = mask_from_coords(dims, VolumeMeta::default(), &[[6, 1, 1]]);

    for connectivity in [6, 18, 26] {
        let mut config = PipelineConfig::default();
        config.graph.connectivity = connectivity;
        let out = dijkstra_votes(&vesselness, &corridor, &target, [0, 1, 1], &config).unwrap();

        assert_eq!(out.reached, 1);
        assert_float_eq!(out.cost_volume[[6, 1, 1]], 6.0 * arc_cost(1.0, 1.0), rmax <= 1e-12);
        for i in 0..7 {
            assert_eq!(out.votes[[i, 1, 1]], 1);
        }
        assert_eq!(out.votes.total_votes(), 7);
    }
}

#[test]
fn test_dijkstra_paths_follow_the_tube() {
    let dims = (9, 9, 9);
    let intensity = tube_z(dims, 1.5, 100.0);
    let mask = full_mask(dims);
    let config = small_scales();
    let fields = vesselness_from_intensity(&intensity, &mask, &config).unwrap();

    let top = create_box_mask(dims, VolumeMeta::default(), [0, 0, 8], [8, 8, 8]);
    let out = dijkstra_votes(&fields.vesselness, &mask, &top, [4, 4, 0], &config).unwrap();
    assert_eq!(out.reached, 81);
    assert_eq!(out.unreached, 0);

    // every path crosses the middle slice, through the tube rather than the corners
    assert!(slice_sum(&out.votes, 4) >= 81);
    let peak = argmax_in_slice(&out.votes, 4);
    assert!(peak[0].abs_diff(4) <= 1 && peak[1].abs_diff(4) <= 1, "peak at {:?}", peak);
    assert_eq!(out.votes[[0, 0, 4]], 0);
}

#[test]
fn test_marching_trace_descends_the_tube() {
    let dims = (9, 9, 9);
    let intensity = tube_z(dims, 1.5, 100.0);
    let mask = full_mask(dims);
    let seeds = mask_from_coords(dims, VolumeMeta::default(), &[[4, 4, 0]]);
    let target = mask_from_coords(dims, VolumeMeta::default(), &[[4, 4, 8]]);
    let mut config = small_scales();
    config.marching.speed_offset = 0.05;

    let (fields, out) = vessel_marching_votes(&intensity, &mask, &seeds, &target, &config).unwrap();
    assert!(fields.vesselness[[4, 4, 4]] > 0.0);

    let counts = out.summary.counts;
    assert_eq!(counts.total(), 1);
    assert_eq!(counts.get(StopReason::ReachedSeed), 1);
    assert_eq!(out.summary.votes[[4, 4, 8]], 1);
    assert_eq!(out.summary.votes[[4, 4, 0]], 1);
    // one voxel per slice at least, since no step jumps a slice
    assert!(out.summary.votes.total_votes() >= 9);
    assert_eq!(out.arrival.time[[4, 4, 0]], 0.0);
}

#[test]
fn test_marching_from_a_seed_ball() {
    let dims = (9, 9, 9);
    let intensity = tube_z(dims, 1.5, 100.0);
    let mask = full_mask(dims);
    let seeds = ball_mask(dims, VolumeMeta::default(), [4, 4, 1], 1.0);
    assert_eq!(seeds.foreground_count(), 7);
    let target = mask_from_coords(dims, VolumeMeta::default(), &[[4, 4, 8]]);
    let mut config = small_scales();
    config.marching.speed_offset = 0.05;

    let (_, out) = vessel_marching_votes(&intensity, &mask, &seeds, &target, &config).unwrap();
    for ijk in seeds.foreground_coords() {
        assert_eq!(out.arrival.time[ijk], 0.0);
    }
    assert_eq!(out.summary.counts.get(StopReason::ReachedSeed), 1);
    assert_eq!(out.summary.votes[[4, 4, 8]], 1);
    // the trace stops at the first seed voxel it enters
    assert_eq!(out.summary.votes[[4, 4, 0]], 0);
}

#[test]
fn test_results_roundtrip_through_nifti() {
    let dir = tempfile::tempdir().unwrap();
    let store = NiftiStore;
    let dims = (7, 7, 5);
    let intensity = tube_z(dims, 1.0, 100.0);
    let fields = vesselness_from_intensity(&intensity, &full_mask(dims), &small_scales()).unwrap();

    let v_path = dir.path().join("vesselness.nii.gz");
    store.save(&fields.vesselness, &v_path).unwrap();
    assert_eq!(store.load(&v_path).unwrap().data, fields.vesselness.data);

    let o_path = dir.path().join("orientation.nii");
    store.save_vectors(&fields.orientation, &o_path).unwrap();
    assert_eq!(store.load_vectors(&o_path).unwrap().data, fields.orientation.data);

    let mut votes = fields.vesselness.like(0u32);
    votes.vote([3, 3, 2]);
    votes.vote([3, 3, 2]);
    let votes_path = dir.path().join("votes.nii");
    store.save_votes(&votes, &votes_path).unwrap();
    let loaded = store.load(&votes_path).unwrap();
    assert_eq!(loaded[[3, 3, 2]], 2.0);
    assert_eq!(loaded.data.iter().sum::<f64>(), 2.0);
}

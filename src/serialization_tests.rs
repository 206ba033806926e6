use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use glam::Vec3;

use crate::test_mesh_helpers::{grid_mesh, tile_center};
use crate::{
    load_navmesh, save_navmesh, LoadOutcome, NavMesh, QueryFilter, VERSION_LATEST,
    VERSION_MIN_COMPATIBLE,
};

fn save_to_vec(mesh: &NavMesh) -> Vec<u8> {
    let mut out = Vec::new();
    save_navmesh(mesh, &mut out).expect("serialize");
    out
}

#[test]
fn round_trip_preserves_the_mesh() {
    let mesh = grid_mesh(2, 2);
    let bytes = save_to_vec(&mesh);

    let loaded = match load_navmesh(&mut Cursor::new(&bytes)).expect("read") {
        LoadOutcome::Loaded(m) => m,
        LoadOutcome::NeedsRebuild => panic!("current version must load"),
    };

    assert_eq!(loaded.params(), mesh.params());
    assert_eq!(loaded.tile_count(), mesh.tile_count());
    assert_eq!(loaded.total_data_size(), mesh.total_data_size());

    let filter = QueryFilter::default();
    let before = mesh.find_path(tile_center(0, 0), tile_center(1, 1), &filter);
    let after = loaded.find_path(tile_center(0, 0), tile_center(1, 1), &filter);
    assert_eq!(
        before.path().expect("path").points,
        after.path().expect("path").points
    );
}

#[test]
fn round_trip_preserves_slot_salts() {
    let mesh = grid_mesh(2, 1);
    // Churn a slot so its salt is no longer zero.
    mesh.remove_tile(0);
    let filter = QueryFilter::default();
    let live = mesh
        .find_nearest_polygon(tile_center(1, 0), Vec3::splat(0.5), &filter)
        .expect("tile present");

    let bytes = save_to_vec(&mesh);
    let loaded = match load_navmesh(&mut Cursor::new(&bytes)).expect("read") {
        LoadOutcome::Loaded(m) => m,
        LoadOutcome::NeedsRebuild => panic!("current version must load"),
    };

    // A ref taken before saving still resolves after loading.
    assert!(loaded.is_valid_ref(live.poly));
}

#[test]
fn old_versions_are_skipped_not_parsed() {
    let mut bytes = Vec::new();
    bytes
        .write_u32::<LittleEndian>(VERSION_MIN_COMPATIBLE - 1)
        .unwrap();
    let junk = [0xAAu8; 40];
    bytes.write_u32::<LittleEndian>(junk.len() as u32).unwrap();
    bytes.extend_from_slice(&junk);
    // Sentinel after the navigation block.
    bytes.write_u32::<LittleEndian>(0xDEAD_BEEF).unwrap();

    let mut cursor = Cursor::new(&bytes);
    assert!(matches!(
        load_navmesh(&mut cursor).expect("skips cleanly"),
        LoadOutcome::NeedsRebuild
    ));
    // The stream is positioned just past the stale block.
    assert_eq!(cursor.read_u32::<LittleEndian>().unwrap(), 0xDEAD_BEEF);
}

#[test]
fn future_versions_need_a_rebuild() {
    let mut bytes = Vec::new();
    bytes.write_u32::<LittleEndian>(VERSION_LATEST + 1).unwrap();
    bytes.write_u32::<LittleEndian>(4).unwrap();
    bytes.extend_from_slice(&[0u8; 4]);

    assert!(matches!(
        load_navmesh(&mut Cursor::new(&bytes)).expect("skips cleanly"),
        LoadOutcome::NeedsRebuild
    ));
}

#[test]
fn saving_during_rebuilds_writes_an_empty_block() {
    let mesh = grid_mesh(1, 1);
    mesh.begin_tile_rebuild();
    let bytes = save_to_vec(&mesh);
    mesh.cancel_tile_rebuild();

    // Version plus a zero-sized block.
    assert_eq!(bytes.len(), 8);
    assert!(matches!(
        load_navmesh(&mut Cursor::new(&bytes)).expect("read"),
        LoadOutcome::NeedsRebuild
    ));
}

#[test]
fn truncated_stream_is_an_error() {
    let mesh = grid_mesh(2, 1);
    let bytes = save_to_vec(&mesh);
    let truncated = &bytes[..bytes.len() / 2];
    assert!(load_navmesh(&mut Cursor::new(truncated)).is_err());
}

#[test]
fn garbage_block_is_an_error_not_a_panic() {
    let mut bytes = Vec::new();
    bytes.write_u32::<LittleEndian>(VERSION_LATEST).unwrap();
    let junk = [0xFFu8; 64];
    bytes.write_u32::<LittleEndian>(junk.len() as u32).unwrap();
    bytes.extend_from_slice(&junk);

    assert!(load_navmesh(&mut Cursor::new(&bytes)).is_err());
}

#[test]
fn empty_grid_round_trips() {
    let mesh = NavMesh::new(crate::test_mesh_helpers::grid_params(0, 0));
    let bytes = save_to_vec(&mesh);
    let loaded = match load_navmesh(&mut Cursor::new(&bytes)).expect("read") {
        LoadOutcome::Loaded(m) => m,
        LoadOutcome::NeedsRebuild => panic!("current version must load"),
    };
    assert_eq!(loaded.tile_count(), 0);
}

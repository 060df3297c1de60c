#![allow(clippy::cast_possible_truncation)]
mod common;

use common::{run_worker, small_geometry, synthetic_shower, vertical_header, WorkerOutput};
use showertile_algorithms::{InterpolationDisk, MergeAccumulator, MergedTiles};
use showertile_core::{EventHeader, TileGeometry, TileRecord, TimeTable};
use std::collections::HashMap;

const BIN_WIDTH_NS: f64 = 20.0;
const MAX_BINS: usize = 1280;

fn merge_in_order(
    geometry: TileGeometry,
    workers: &[&WorkerOutput],
    header: &EventHeader,
) -> MergedTiles {
    let mut merger = MergeAccumulator::new(geometry, BIN_WIDTH_NS, MAX_BINS);
    for worker in workers {
        merger
            .add_file(header, &worker.table, worker.records.iter().copied())
            .unwrap();
    }
    merger.finish().unwrap()
}

fn by_key(records: &[TileRecord]) -> HashMap<(u16, u16, i16), TileRecord> {
    records.iter().map(|r| ((r.m, r.n, r.bin), *r)).collect()
}

#[test]
fn test_self_merge_doubles_counts() {
    let geometry = small_geometry();
    let header = vertical_header();
    let particles = synthetic_shower(&header, 2000, 5);
    let worker = run_worker(&geometry, &header, &particles, 100, 17).unwrap();
    assert!(!worker.records.is_empty());

    let disk = InterpolationDisk::locate(&geometry, &worker.table).unwrap();
    assert_eq!(disk.tiles(), worker.disk.tiles());
    let mask = disk.mask();
    let accumulated: Vec<&TileRecord> = worker
        .records
        .iter()
        .filter(|r| !mask[(usize::from(r.m), usize::from(r.n))])
        .collect();
    assert!(accumulated.len() < worker.records.len());

    let mut merger = MergeAccumulator::new(geometry, BIN_WIDTH_NS, MAX_BINS);
    for _ in 0..2 {
        merger
            .add_file(&header, &worker.table, worker.records.iter().copied())
            .unwrap();
    }
    // extrapolated core records are left out until the merge re-synthesizes them
    assert_eq!(merger.len(), accumulated.len());
    for record in &accumulated {
        let cell = merger.get(record.m, record.n, i32::from(record.bin)).unwrap();
        assert_eq!(cell.top, 2 * record.top);
        assert_eq!(cell.bottom, 2 * record.bottom);
        assert_eq!(cell.inclination, 2 * record.inclination);
    }
    assert_eq!(merger.minimum_times(), &worker.table);

    let merged = merger.finish().unwrap();
    let merged_by_key = by_key(&merged.records);
    for record in accumulated {
        let doubled = merged_by_key[&(record.m, record.n, record.bin)];
        assert_eq!(doubled.top, 2 * record.top);
        assert_eq!(doubled.bottom, 2 * record.bottom);
    }
}

#[test]
fn test_merge_is_order_independent() {
    let geometry = small_geometry();
    let header = vertical_header();
    let particles = synthetic_shower(&header, 6000, 9);

    let workers: Vec<WorkerOutput> = (0..3)
        .map(|w| {
            let subset: Vec<_> = particles.iter().skip(w).step_by(3).copied().collect();
            run_worker(&geometry, &header, &subset, 200, 100 + w as u64).unwrap()
        })
        .collect();

    let reference = merge_in_order(geometry, &[&workers[0], &workers[1], &workers[2]], &header);
    assert!(!reference.records.is_empty());
    assert!(reference
        .records
        .windows(2)
        .all(|pair| (pair[0].m, pair[0].n, pair[0].bin) < (pair[1].m, pair[1].n, pair[1].bin)));

    for order in [[2, 0, 1], [1, 2, 0], [2, 1, 0]] {
        let merged = merge_in_order(
            geometry,
            &[&workers[order[0]], &workers[order[1]], &workers[order[2]]],
            &header,
        );
        assert_eq!(merged.records, reference.records, "order {order:?}");
        assert_eq!(merged.minimum_times, reference.minimum_times);
    }
}

#[test]
fn test_disjoint_workers_union() {
    let geometry = small_geometry();
    let header = vertical_header();
    let mut table = TimeTable::unvisited(&geometry);
    for m in 60..72 {
        table[(m, 50)] = 40_000.0;
    }

    let record = |m: u16, bin: i16| TileRecord {
        m,
        n: 50,
        top: 100 + m,
        bottom: 80 + m,
        bin,
        inclination: 60,
    };
    let even: Vec<TileRecord> = (60..72)
        .step_by(2)
        .flat_map(|m| (330..334).map(move |bin| record(m, bin)))
        .collect();
    let odd: Vec<TileRecord> = (61..72)
        .step_by(2)
        .flat_map(|m| (330..334).map(move |bin| record(m, bin)))
        .collect();

    let mask = InterpolationDisk::locate(&geometry, &table).unwrap().mask();
    let outside: Vec<&TileRecord> = even
        .iter()
        .chain(&odd)
        .filter(|r| !mask[(usize::from(r.m), usize::from(r.n))])
        .collect();
    assert!(!outside.is_empty());
    assert!(outside.len() < even.len() + odd.len());

    let mut merger = MergeAccumulator::new(geometry, BIN_WIDTH_NS, MAX_BINS);
    merger.add_file(&header, &table, even.clone()).unwrap();
    merger.add_file(&header, &table, odd.clone()).unwrap();
    assert_eq!(merger.len(), outside.len());
    for r in &outside {
        let cell = merger.get(r.m, r.n, i32::from(r.bin)).unwrap();
        assert_eq!(*cell, r.counts());
    }

    let merged = by_key(&merger.finish().unwrap().records);
    for r in outside {
        assert_eq!(merged[&(r.m, r.n, r.bin)], *r);
    }
}

#[test]
fn test_worker_core_extrapolation_not_summed() {
    let geometry = small_geometry();
    let header = vertical_header();
    let particles = synthetic_shower(&header, 6000, 21);

    // far worker sees nothing within 80 m, so its core disk is much wider
    let far: Vec<_> = particles
        .iter()
        .filter(|p| f64::from(p[4]).hypot(f64::from(p[5])) > 8_000.0)
        .copied()
        .collect();
    let far_worker = run_worker(&geometry, &header, &far, 1280, 3).unwrap();
    let full_worker = run_worker(&geometry, &header, &particles, 1280, 4).unwrap();
    assert!(far_worker.disk.radius_m() > full_worker.disk.radius_m());

    let merged = merge_in_order(geometry, &[&far_worker, &full_worker], &header);
    let merged_disk = InterpolationDisk::locate(&geometry, &merged.minimum_times).unwrap();
    assert_eq!(merged_disk.tiles(), full_worker.disk.tiles());

    // tiles the far worker extrapolated but the merge keeps as accumulated
    let far_mask = far_worker.disk.mask();
    let full_mask = full_worker.disk.mask();
    let in_ring = |r: &TileRecord| {
        let tile = (usize::from(r.m), usize::from(r.n));
        far_mask[tile] && !full_mask[tile]
    };
    let expected: Vec<&TileRecord> = full_worker.records.iter().filter(|r| in_ring(*r)).collect();
    assert!(!expected.is_empty());
    assert!(far_worker.records.iter().any(in_ring));

    let ring: Vec<&TileRecord> = merged.records.iter().filter(|r| in_ring(*r)).collect();
    assert_eq!(ring.len(), expected.len());
    let merged_by_key = by_key(&merged.records);
    for record in expected {
        let cell = merged_by_key[&(record.m, record.n, record.bin)];
        assert_eq!(cell.top, record.top);
        assert_eq!(cell.bottom, record.bottom);
    }
}

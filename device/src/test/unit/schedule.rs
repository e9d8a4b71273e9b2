use test_case::test_case;

use crate::ScheduleInfo;

fn info(global: [usize; 3], local: [usize; 3], slice_index: usize, total_slices: usize) -> ScheduleInfo {
    ScheduleInfo { global_size: global, global_offset: [0; 3], local_size: local, work_dim: 3, slice_index, total_slices }
}

/// Every work item of the global extent must be owned by exactly one slice,
/// for slice counts below, at and above the work-group count.
#[test_case(1; "single slice")]
#[test_case(4; "one per worker")]
#[test_case(8; "oversubscribed")]
#[test_case(64; "slice per item")]
#[test_case(100; "more slices than items")]
fn items_covered_exactly_once(total_slices: usize) {
    let global = [64usize, 1, 1];
    let local = [8usize, 1, 1];
    let mut visits = vec![0u32; 64];

    for slice in 0..total_slices {
        let si = info(global, local, slice, total_slices);
        for linear in si.slice_groups() {
            let group = si.group_id(linear);
            let origin = si.group_origin(group);
            let extent = si.group_extent(group);
            for x in 0..extent[0] {
                visits[origin[0] + x] += 1;
            }
        }
    }

    assert!(visits.iter().all(|&n| n == 1), "uneven cover: {visits:?}");
}

#[test_case([7, 3, 2], [2, 2, 1], 5)]
#[test_case([16, 16, 1], [4, 4, 1], 3)]
#[test_case([1, 1, 1], [1, 1, 1], 4)]
fn groups_covered_exactly_once(global: [usize; 3], local: [usize; 3], total_slices: usize) {
    let total = info(global, local, 0, total_slices).total_workgroups();
    let mut visits = vec![0u32; total];

    for slice in 0..total_slices {
        for linear in info(global, local, slice, total_slices).slice_groups() {
            visits[linear] += 1;
        }
    }

    assert!(visits.iter().all(|&n| n == 1), "uneven cover: {visits:?}");
}

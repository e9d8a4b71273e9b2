use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use parking_lot::Mutex;
use test_case::test_case;

use veles_device::{EntryPoint, Kernel, ScheduleInfo};

use crate::test::test_device;
use crate::{Command, CommandBuffer, NDRange};

/// Entry point that marks every 1-D global item its slice owns.
fn visiting_entry(visits: Arc<Vec<AtomicU32>>) -> EntryPoint {
    Arc::new(move |_args, info| {
        for linear in info.slice_groups() {
            let group = info.group_id(linear);
            let origin = info.group_origin(group);
            let extent = info.group_extent(group);
            for x in 0..extent[0] {
                visits[origin[0] + x].fetch_add(1, Ordering::Relaxed);
            }
        }
    })
}

fn dispatch_and_wait(workers: usize, slice_multiplier: usize, nd: NDRange) {
    let device = test_device(workers, slice_multiplier);
    let queue = device.create_queue();
    let commands = Arc::new(CommandBuffer::new(vec![Command::NDRangeDispatch(nd)]));
    queue.dispatch(&commands, None, &[], &[], None).unwrap();
    queue.wait_all().unwrap();
}

#[test_case(1, 1; "single worker")]
#[test_case(2, 1; "two workers")]
#[test_case(4, 1; "slice per worker")]
#[test_case(4, 4; "oversubscribed")]
#[test_case(16, 4; "more slices than groups")]
fn every_item_visited_exactly_once(workers: usize, slice_multiplier: usize) {
    let visits: Arc<Vec<AtomicU32>> = Arc::new((0..64).map(|_| AtomicU32::new(0)).collect());
    let kernel = Arc::new(Kernel::new("visit", visiting_entry(Arc::clone(&visits))));

    dispatch_and_wait(workers, slice_multiplier, NDRange::new_1d(kernel, Arc::from([]), 64, 8));

    let counts: Vec<u32> = visits.iter().map(|v| v.load(Ordering::Relaxed)).collect();
    assert!(counts.iter().all(|&n| n == 1), "uneven cover: {counts:?}");
}

#[test]
fn schedule_info_matches_fanout_shape() {
    // 4 workers, multiplier 1, 8 work-groups: exactly 4 slices, each seeing
    // total_slices == 4, covering the 64 items disjointly.
    let infos: Arc<Mutex<Vec<ScheduleInfo>>> = Arc::new(Mutex::new(Vec::new()));
    let visits: Arc<Vec<AtomicU32>> = Arc::new((0..64).map(|_| AtomicU32::new(0)).collect());

    let entry: EntryPoint = {
        let infos = Arc::clone(&infos);
        let inner = visiting_entry(Arc::clone(&visits));
        Arc::new(move |args, info| {
            infos.lock().push(info.clone());
            inner(args, info);
        })
    };
    let kernel = Arc::new(Kernel::new("scheduled", entry));

    dispatch_and_wait(4, 1, NDRange::new_1d(kernel, Arc::from([]), 64, 8));

    let infos = infos.lock();
    assert_eq!(infos.len(), 4);
    let mut indices: Vec<usize> = infos.iter().map(|i| i.slice_index).collect();
    indices.sort_unstable();
    assert_eq!(indices, vec![0, 1, 2, 3]);
    for info in infos.iter() {
        assert_eq!(info.total_slices, 4);
        assert_eq!(info.global_size, [64, 1, 1]);
        assert_eq!(info.local_size, [8, 1, 1]);
    }
    assert!(visits.iter().all(|v| v.load(Ordering::Relaxed) == 1));
}

#[test]
fn zero_extent_dispatch_is_noop() {
    let calls = Arc::new(AtomicUsize::new(0));
    let entry: EntryPoint = {
        let calls = Arc::clone(&calls);
        Arc::new(move |_, _| {
            calls.fetch_add(1, Ordering::Relaxed);
        })
    };
    let kernel = Arc::new(Kernel::new("noop", entry));

    let nd = NDRange::new_3d(kernel, Arc::from([]), [4, 0, 2], [1, 1, 1]);
    dispatch_and_wait(2, 2, nd);

    assert_eq!(calls.load(Ordering::Relaxed), 0);
}

#[test]
fn specialized_variant_wins_for_exact_shape() {
    let generic_calls = Arc::new(AtomicUsize::new(0));
    let special_calls = Arc::new(AtomicUsize::new(0));

    let count_into = |counter: &Arc<AtomicUsize>| -> EntryPoint {
        let counter = Arc::clone(counter);
        Arc::new(move |_, _| {
            counter.fetch_add(1, Ordering::Relaxed);
        })
    };

    let kernel =
        Arc::new(Kernel::new("pick", count_into(&generic_calls)).with_variant([8, 1, 1], count_into(&special_calls)));

    dispatch_and_wait(2, 1, NDRange::new_1d(Arc::clone(&kernel), Arc::from([]), 64, 8));
    assert!(special_calls.load(Ordering::Relaxed) > 0);
    assert_eq!(generic_calls.load(Ordering::Relaxed), 0);

    dispatch_and_wait(2, 1, NDRange::new_1d(kernel, Arc::from([]), 64, 4));
    assert!(generic_calls.load(Ordering::Relaxed) > 0);
}

#[test]
fn global_offset_shifts_item_ids() {
    let visits: Arc<Vec<AtomicU32>> = Arc::new((0..32).map(|_| AtomicU32::new(0)).collect());
    let kernel = Arc::new(Kernel::new("offset", visiting_entry(Arc::clone(&visits))));

    let nd = NDRange::new_1d(kernel, Arc::from([]), 16, 4).with_offset([8, 0, 0]);
    dispatch_and_wait(2, 2, nd);

    let counts: Vec<u32> = visits.iter().map(|v| v.load(Ordering::Relaxed)).collect();
    assert!(counts[..8].iter().all(|&n| n == 0));
    assert!(counts[8..24].iter().all(|&n| n == 1));
    assert!(counts[24..].iter().all(|&n| n == 0));
}

#[test]
fn args_reach_the_entry_point() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let entry: EntryPoint = {
        let seen = Arc::clone(&seen);
        Arc::new(move |args, _| {
            *seen.lock() = args.to_vec();
        })
    };
    let kernel = Arc::new(Kernel::new("args", entry));

    dispatch_and_wait(2, 1, NDRange::new_1d(kernel, Arc::from([1u8, 2, 3]), 1, 1));
    assert_eq!(*seen.lock(), vec![1, 2, 3]);
}

#[test]
fn transfers_stay_ordered_around_fanout() {
    // The fan-out happens inside one step of the command loop: a transfer
    // recorded after the dispatch must observe the kernel's writes.
    let device = test_device(4, 2);
    let queue = device.create_queue();

    let data = Arc::new(veles_device::Buffer::new(64));
    let snapshot = Arc::new(veles_device::Buffer::new(64));

    let entry: EntryPoint = {
        let data = Arc::clone(&data);
        Arc::new(move |_, info| {
            for linear in info.slice_groups() {
                let origin = info.group_origin(info.group_id(linear));
                let extent = info.group_extent(info.group_id(linear));
                for x in 0..extent[0] {
                    let index = origin[0] + x;
                    data.memory().write(index, &[index as u8]).unwrap();
                }
            }
        })
    };
    let kernel = Arc::new(Kernel::new("iota", entry));

    let commands = Arc::new(CommandBuffer::new(vec![
        Command::NDRangeDispatch(NDRange::new_1d(kernel, Arc::from([]), 64, 8)),
        Command::CopyBuffer { src: Arc::clone(&data), dst: Arc::clone(&snapshot), src_offset: 0, dst_offset: 0, size: 64 },
    ]));

    queue.dispatch(&commands, None, &[], &[], None).unwrap();
    queue.wait_all().unwrap();

    let expected: Vec<u8> = (0..64).map(|i| i as u8).collect();
    assert_eq!(snapshot.contents(), expected);
}

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use veles_device::Buffer;

use crate::test::test_device;
use crate::{Command, CommandBuffer, CompletionStatus, Error, Fence, Semaphore};

fn fill(dst: &Arc<Buffer>, offset: usize, size: usize, byte: u8) -> Command {
    Command::FillBuffer { dst: Arc::clone(dst), offset, size, pattern: [byte].into_iter().collect() }
}

#[test]
fn commands_execute_in_recorded_order() {
    let device = test_device(4, 2);
    let queue = device.create_queue();

    let src = Arc::new(Buffer::from_bytes(&[3u8; 16]));
    let dst = Arc::new(Buffer::new(64));

    let commands = Arc::new(CommandBuffer::new(vec![
        fill(&dst, 0, 64, 1),
        Command::CopyBuffer { src: Arc::clone(&src), dst: Arc::clone(&dst), src_offset: 0, dst_offset: 8, size: 16 },
        fill(&dst, 12, 4, 4),
    ]));

    let fence = Arc::new(Fence::new());
    queue.dispatch(&commands, Some(Arc::clone(&fence)), &[], &[], None).unwrap();
    fence.try_wait(Duration::from_secs(5)).unwrap();

    // Same operations applied sequentially.
    let mut expected = [1u8; 64];
    expected[8..24].copy_from_slice(&[3; 16]);
    expected[12..16].copy_from_slice(&[4; 4]);
    assert_eq!(dst.contents(), expected);
}

#[test]
fn and_join_requires_every_signal() {
    let device = test_device(4, 2);
    let queue = device.create_queue();

    let waits: Vec<Arc<Semaphore>> = (0..3).map(|_| Arc::new(Semaphore::new())).collect();
    let target = Arc::new(Buffer::new(4));
    let buffer = Arc::new(CommandBuffer::new(vec![fill(&target, 0, 4, 0xff)]));

    let fence = Arc::new(Fence::new());
    queue.dispatch(&buffer, Some(Arc::clone(&fence)), &waits, &[], None).unwrap();

    // Two of three signals must not release the buffer.
    waits[0].signal();
    waits[1].signal();
    assert!(matches!(fence.try_wait(Duration::from_millis(50)), Err(Error::WaitTimeout { .. })));
    assert_eq!(target.contents(), vec![0; 4]);

    waits[2].signal();
    fence.try_wait(Duration::from_secs(5)).unwrap();
    assert_eq!(target.contents(), vec![0xff; 4]);
}

#[test]
fn and_join_signals_may_race() {
    let device = test_device(4, 2);
    let queue = device.create_queue();

    let waits: Vec<Arc<Semaphore>> = (0..4).map(|_| Arc::new(Semaphore::new())).collect();
    let runs = Arc::new(AtomicUsize::new(0));
    let buffer = Arc::new(CommandBuffer::new(Vec::new()));

    let runs_in_callback = Arc::clone(&runs);
    queue
        .dispatch(
            &buffer,
            None,
            &waits,
            &[],
            Some(Box::new(move |status| {
                assert_eq!(status, CompletionStatus::Complete);
                runs_in_callback.fetch_add(1, Ordering::Relaxed);
            })),
        )
        .unwrap();

    let signalers: Vec<_> = waits
        .iter()
        .map(|semaphore| {
            let semaphore = Arc::clone(semaphore);
            std::thread::spawn(move || semaphore.signal())
        })
        .collect();
    for handle in signalers {
        handle.join().unwrap();
    }

    queue.wait_all().unwrap();
    assert_eq!(runs.load(Ordering::Relaxed), 1);
}

#[test]
fn signal_before_registration_does_not_count() {
    let device = test_device(2, 1);
    let queue = device.create_queue();

    let semaphore = Arc::new(Semaphore::new());
    // Edge-triggered: this signal has no waiters and must be forgotten.
    semaphore.signal();

    let buffer = Arc::new(CommandBuffer::new(Vec::new()));
    let fence = Arc::new(Fence::new());
    queue.dispatch(&buffer, Some(Arc::clone(&fence)), &[Arc::clone(&semaphore)], &[], None).unwrap();

    assert!(matches!(fence.try_wait(Duration::from_millis(50)), Err(Error::WaitTimeout { .. })));

    semaphore.signal();
    fence.try_wait(Duration::from_secs(5)).unwrap();
}

#[test]
fn upstream_completion_releases_downstream() {
    let device = test_device(4, 2);
    let queue = device.create_queue();

    let order = Arc::new(Mutex::new(Vec::new()));
    let semaphore = Arc::new(Semaphore::new());

    let callback = |order: &Arc<Mutex<Vec<&'static str>>>, name: &'static str| {
        let order = Arc::clone(order);
        Box::new(move |_| order.lock().push(name)) as crate::CompletionCallback
    };

    let a = Arc::new(CommandBuffer::new(Vec::new()));
    let b = Arc::new(CommandBuffer::new(Vec::new()));

    // Park the dependent first; it must not run before its upstream.
    queue.dispatch(&b, None, &[Arc::clone(&semaphore)], &[], Some(callback(&order, "b"))).unwrap();
    queue.dispatch(&a, None, &[], &[Arc::clone(&semaphore)], Some(callback(&order, "a"))).unwrap();

    queue.wait_all().unwrap();
    assert_eq!(*order.lock(), vec!["a", "b"]);
}

#[test]
fn terminate_fails_fence_but_unblocks_dependents() {
    let device = test_device(2, 1);
    let queue = device.create_queue();

    let gate = Arc::new(Semaphore::new());
    let downstream_gate = Arc::new(Semaphore::new());

    // A parks behind `gate` (which never fires) and would signal
    // `downstream_gate`; B waits on `downstream_gate`.
    let a = Arc::new(CommandBuffer::new(Vec::new()));
    let b = Arc::new(CommandBuffer::new(Vec::new()));

    let fence_a = Arc::new(Fence::new());
    let fence_b = Arc::new(Fence::new());
    queue
        .dispatch(&a, Some(Arc::clone(&fence_a)), &[Arc::clone(&gate)], &[Arc::clone(&downstream_gate)], None)
        .unwrap();
    queue.dispatch(&b, Some(Arc::clone(&fence_b)), &[Arc::clone(&downstream_gate)], &[], None).unwrap();

    queue.terminate(&a);

    assert!(matches!(fence_a.try_wait(Duration::from_secs(5)), Err(Error::FenceFailure)));
    // B still became runnable and completed normally.
    fence_b.try_wait(Duration::from_secs(5)).unwrap();
    queue.wait_all().unwrap();
}

#[test]
fn failed_buffer_still_signals_semaphores() {
    let device = test_device(2, 2);
    let queue = device.create_queue();

    let target = Arc::new(Buffer::new(8));
    let semaphore = Arc::new(Semaphore::new());

    // Second command writes out of bounds and fails the buffer.
    let failing = Arc::new(CommandBuffer::new(vec![fill(&target, 0, 8, 1), fill(&target, 4, 64, 2)]));
    let dependent = Arc::new(CommandBuffer::new(vec![fill(&target, 0, 4, 9)]));

    let fence_a = Arc::new(Fence::new());
    let fence_b = Arc::new(Fence::new());
    queue.dispatch(&failing, Some(Arc::clone(&fence_a)), &[], &[Arc::clone(&semaphore)], None).unwrap();
    queue.dispatch(&dependent, Some(Arc::clone(&fence_b)), &[Arc::clone(&semaphore)], &[], None).unwrap();

    assert!(matches!(fence_a.try_wait(Duration::from_secs(5)), Err(Error::FenceFailure)));
    fence_b.try_wait(Duration::from_secs(5)).unwrap();
    assert_eq!(target.contents(), vec![9, 9, 9, 9, 1, 1, 1, 1]);
}

#[test]
fn failed_command_aborts_remainder() {
    let device = test_device(2, 2);
    let queue = device.create_queue();

    let target = Arc::new(Buffer::new(8));
    let status = Arc::new(Mutex::new(None));

    let commands = Arc::new(CommandBuffer::new(vec![
        fill(&target, 0, 8, 1),
        fill(&target, 8, 8, 2), // out of bounds
        fill(&target, 0, 8, 3), // must never run
    ]));

    let status_in_callback = Arc::clone(&status);
    queue
        .dispatch(&commands, None, &[], &[], Some(Box::new(move |s| *status_in_callback.lock() = Some(s))))
        .unwrap();
    queue.wait_all().unwrap();

    assert_eq!(*status.lock(), Some(CompletionStatus::Failed));
    assert_eq!(target.contents(), vec![1; 8]);
}

#[test]
fn fire_and_forget_is_valid() {
    let device = test_device(2, 2);
    let queue = device.create_queue();

    let target = Arc::new(Buffer::new(4));
    let commands = Arc::new(CommandBuffer::new(vec![fill(&target, 0, 4, 7)]));

    queue.dispatch(&commands, None, &[], &[], None).unwrap();
    queue.wait_all().unwrap();
    assert_eq!(target.contents(), vec![7; 4]);
}

#[test]
fn duplicate_wait_semaphore_rejected() {
    let device = test_device(2, 2);
    let queue = device.create_queue();

    let semaphore = Arc::new(Semaphore::new());
    let buffer = Arc::new(CommandBuffer::new(Vec::new()));

    let result = queue.dispatch(&buffer, None, &[Arc::clone(&semaphore), Arc::clone(&semaphore)], &[], None);
    assert!(matches!(result, Err(Error::InvalidDependency { .. })));

    // Rejection left no state behind; the buffer is still dispatchable.
    queue.dispatch(&buffer, None, &[], &[], None).unwrap();
    queue.wait_all().unwrap();
}

#[test]
fn overlapping_dispatch_rejected() {
    let device = test_device(2, 2);
    let queue = device.create_queue();

    let semaphore = Arc::new(Semaphore::new());
    let buffer = Arc::new(CommandBuffer::new(Vec::new()));

    queue.dispatch(&buffer, None, &[Arc::clone(&semaphore)], &[], None).unwrap();
    let second = queue.dispatch(&buffer, None, &[], &[], None);
    assert!(matches!(second, Err(Error::InvalidDependency { .. })));

    semaphore.signal();
    queue.wait_all().unwrap();

    // After completion the buffer may be submitted again.
    queue.dispatch(&buffer, None, &[], &[], None).unwrap();
    queue.wait_all().unwrap();
}

#[test]
fn fence_reset_reports_new_result() {
    let device = test_device(2, 2);
    let queue = device.create_queue();

    let target = Arc::new(Buffer::new(4));
    let fence = Arc::new(Fence::new());

    let ok = Arc::new(CommandBuffer::new(vec![fill(&target, 0, 4, 1)]));
    queue.dispatch(&ok, Some(Arc::clone(&fence)), &[], &[], None).unwrap();
    // Deliberately never waits on the first result.
    queue.wait_all().unwrap();

    fence.reset();
    let failing = Arc::new(CommandBuffer::new(vec![fill(&target, 4, 8, 2)]));
    queue.dispatch(&failing, Some(Arc::clone(&fence)), &[], &[], None).unwrap();
    assert!(matches!(fence.try_wait(Duration::from_secs(5)), Err(Error::FenceFailure)));
}

#[test]
fn user_callback_runs_in_command_order() {
    let device = test_device(4, 2);
    let queue = device.create_queue();

    let target = Arc::new(Buffer::new(1));
    let observed = Arc::new(Mutex::new(Vec::new()));

    let snapshot = {
        let observed = Arc::clone(&observed);
        let target = Arc::clone(&target);
        Arc::new(move || observed.lock().push(target.contents()[0]))
    };

    let commands = Arc::new(CommandBuffer::new(vec![
        Command::UserCallback { callback: Arc::clone(&snapshot) as Arc<dyn Fn() + Send + Sync> },
        fill(&target, 0, 1, 5),
        Command::UserCallback { callback: snapshot },
    ]));

    queue.dispatch(&commands, None, &[], &[], None).unwrap();
    queue.wait_all().unwrap();
    assert_eq!(*observed.lock(), vec![0, 5]);
}

#[test]
fn semaphores_clear_across_resubmission() {
    let device = test_device(2, 2);
    let queue = device.create_queue();

    let downstream = Arc::new(Semaphore::new());
    let counter = Arc::new(AtomicUsize::new(0));

    let producer = Arc::new(CommandBuffer::new(Vec::new()));
    let consumer = Arc::new(CommandBuffer::new(Vec::new()));

    queue.dispatch(&producer, None, &[], &[Arc::clone(&downstream)], None).unwrap();
    queue.wait_all().unwrap();

    // The signal list was cleared at completion: a plain re-submission with
    // no signal semaphores must not fire `downstream` again.
    let counter_in_callback = Arc::clone(&counter);
    queue
        .dispatch(
            &consumer,
            None,
            &[Arc::clone(&downstream)],
            &[],
            Some(Box::new(move |_| {
                counter_in_callback.fetch_add(1, Ordering::Relaxed);
            })),
        )
        .unwrap();
    queue.dispatch(&producer, None, &[], &[], None).unwrap();

    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(counter.load(Ordering::Relaxed), 0);

    downstream.signal();
    queue.wait_all().unwrap();
    assert_eq!(counter.load(Ordering::Relaxed), 1);
}

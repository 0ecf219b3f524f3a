use std::time::Duration;

use parfold_device::{
    AccessMode, AccessScope, AccessTarget, Buffer, DeviceError, GroupContext, GroupKernel,
    NdItem, NdRange, Placeholder, Queue, QueueConfig, TaskStatus, WorkSize,
};

/// Every item adds its group's first element to itself.
struct AddGroupHead;

impl GroupKernel<i64> for AddGroupHead {
    fn phases(&self, _local_range: usize) -> usize {
        1
    }

    fn run(&self, _phase: usize, item: &NdItem, ctx: &mut GroupContext<'_, i64>) {
        let head = item.group_id * item.local_range;
        if let (Some(&h), Some(&v)) = (ctx.global(head), ctx.global(item.global_id)) {
            ctx.write_global(item.global_id, v + h);
        }
    }
}

#[test]
fn test_grouped_launch_through_queue() {
    let queue = Queue::new(QueueConfig::default()).unwrap();
    let data = Buffer::from_vec(vec![1i64, 2, 3, 10, 20, 30]);
    let range = NdRange::new(6, 3).unwrap();

    let task = queue
        .submit("add_head", |h| {
            let acc = h.read_write(&data);
            h.parallel_for_work_group(range, acc, AddGroupHead)
        })
        .unwrap();

    assert_eq!(task.work_size(), WorkSize::Grouped(range));
    assert_eq!(
        task.scopes(),
        &[AccessScope::new(data.id(), AccessMode::ReadWrite, AccessTarget::Global)]
    );
    // Writes land together, so every item saw the unmodified head.
    assert_eq!(data.to_vec().unwrap(), vec![2, 3, 4, 20, 30, 40]);
}

#[test]
fn test_grouped_launch_needs_read_write() {
    let queue = Queue::new(QueueConfig::default()).unwrap();
    let data = Buffer::from_vec(vec![1i64; 4]);
    let err = queue
        .submit("add_head", |h| {
            let acc = h.read(&data);
            h.parallel_for_work_group(NdRange::new(4, 2)?, acc, AddGroupHead)
        })
        .unwrap_err();
    assert!(matches!(err, DeviceError::AccessDenied { mode: "read", .. }));
}

#[test]
fn test_host_write_waits_for_readers() {
    let queue = Queue::new(QueueConfig::default()).unwrap();
    let src = Buffer::from_vec(vec![7u32; 8]);
    let dst: Buffer<u32> = Buffer::new(8);

    let task = queue
        .submit("slow_copy", |h| {
            let (s, d) = (h.read(&src), h.discard_write(&dst));
            h.parallel_for(s, d, |x: &u32, _| {
                std::thread::sleep(Duration::from_millis(10));
                *x
            })
        })
        .unwrap();

    {
        let mut w = src.host_write().unwrap();
        assert!(task.status().is_retired());
        w[0] = 0;
    }
    assert_eq!(dst.to_vec().unwrap(), vec![7; 8]);
    assert_eq!(src.to_vec().unwrap()[0], 0);
}

#[test]
fn test_placeholder_scope_recorded() {
    let queue = Queue::new(QueueConfig::default()).unwrap();
    let scale = Buffer::from_vec(vec![3.0f64]);
    let input = Buffer::from_vec(vec![1.0f64, 2.0]);
    let output: Buffer<f64> = Buffer::new(2);
    let s = Placeholder::new(&scale);

    let task = queue
        .submit("scale", |h| {
            let factor = h.capture(&s);
            h.bind(&s.bind());
            let (src, dst) = (h.read(&input), h.discard_write(&output));
            h.parallel_for(src, dst, move |x: &f64, c| x * c.read(&factor)[0])
        })
        .unwrap();

    assert!(task.scopes().contains(&AccessScope::new(
        scale.id(),
        AccessMode::Read,
        AccessTarget::Placeholder
    )));
    task.wait().unwrap();
    assert_eq!(task.status(), TaskStatus::Complete);
    assert_eq!(output.to_vec().unwrap(), vec![3.0, 6.0]);
}

#[test]
fn test_drop_drains_queued_work() {
    let src = Buffer::from_vec(vec![1u8; 4]);
    let dst: Buffer<u8> = Buffer::new(4);
    {
        let queue = Queue::new(QueueConfig::default()).unwrap();
        queue
            .submit("copy", |h| {
                let (s, d) = (h.read(&src), h.discard_write(&dst));
                h.copy(s, d, 4)
            })
            .unwrap();
    }
    assert_eq!(dst.to_vec().unwrap(), vec![1; 4]);
}

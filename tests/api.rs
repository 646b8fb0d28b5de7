use power2_alloc::{Error, Power2Allocator};

// rows of a hardware table handed out in power-of-two aligned groups
#[test]
fn snapshot_and_rollback() {
    let mut table = Power2Allocator::new(64, 8).unwrap();
    let base = table.allocate(12).unwrap();

    let snapshot = table.make_copy();

    // a transaction that gets rolled back
    let rows = table.allocate_multiple(64, 2).unwrap();
    table.release(base).unwrap();
    table.reserve(base, 3).unwrap();
    assert_eq!(table.alloc_count(), 3);

    table = snapshot.make_copy();
    assert_eq!(table, snapshot);
    assert_eq!(table.index_size(base), Ok(12));
    assert_eq!(table.index_size(rows), Err(Error::NotAllocated(rows)));
    table.check().unwrap();
}

#[test]
fn restore_layout_with_reserve() {
    let mut live = Power2Allocator::new(256, 4).unwrap();
    for &size in [1, 100, 7, 256, 33, 2, 64, 5].iter() {
        live.allocate(size).unwrap();
    }
    let x = live.allocate(9).unwrap();
    live.release(x).unwrap();

    // replay every allocation into a fresh allocator
    let mut restored = Power2Allocator::new(256, 4).unwrap();
    for (offset, size) in live.allocations() {
        restored.reserve(offset, size).unwrap();
    }

    assert_eq!(restored.usage(), live.usage());
    assert_eq!(
        restored.allocations().collect::<Vec<_>>(),
        live.allocations().collect::<Vec<_>>()
    );
    // the free space ends up split the same way
    assert_eq!(restored, live);
    restored.check().unwrap();

    // and both hand out the same offsets from here on
    assert_eq!(restored.allocate(20), live.allocate(20));
}

#[test]
fn fill_and_drain() {
    let mut alloc = Power2Allocator::new(16, 4).unwrap();

    let mut offsets = vec![];
    while let Ok(offset) = alloc.allocate(3) {
        assert_eq!(offset % 4, 0);
        offsets.push(offset);
    }

    // 3 of every 4 indices are used; the leftovers are too small for anything but single indices
    assert_eq!(offsets.len(), 16);
    assert_eq!(alloc.usage(), 48);
    assert_eq!(
        alloc.allocate(2),
        Err(Error::OutOfSpace { size: 2, count: 1 })
    );
    assert_eq!(alloc.alloc_count_by_size(3), 16);

    for offset in offsets {
        alloc.release(offset).unwrap();
    }
    assert_eq!(alloc, Power2Allocator::new(16, 4).unwrap());
}

#[test]
fn errors_display() {
    assert_eq!(
        Error::NotPowerOfTwo(12).to_string(),
        "base size 12 is not a power of two"
    );
    assert_eq!(Error::NotAllocated(7).to_string(), "index 7 is not allocated");
    assert_eq!(
        Error::Conflict {
            offset: 4,
            size: 2
        }
        .to_string(),
        "range 4+2 is not entirely free"
    );
    assert_eq!(
        Error::OutOfSpace { size: 5, count: 1 }.to_string(),
        "no free space for 1 run(s) of 5 indices"
    );
}

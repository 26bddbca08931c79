use std::sync::Arc;
use std::thread;

use vdb_core::MetricKind;
use vdb_index::HnswIndex;

#[test]
fn concurrent_insertions_do_not_panic_and_keep_every_label() {
    let index = Arc::new(HnswIndex::new(4, MetricKind::L2, 16, 100));
    let num_threads = 8;
    let items_per_thread = 200;

    let mut handles = vec![];
    for t in 0..num_threads {
        let index = index.clone();
        handles.push(thread::spawn(move || {
            for j in 0..items_per_thread {
                let label = (t * items_per_thread + j) as u64;
                let vector = vec![label as f32, 0.0, 0.0, 0.0];
                index.insert(label, &vector).unwrap();
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(index.len(), num_threads * items_per_thread);
}

#[test]
fn concurrent_reads_during_writes_never_panic() {
    let index = Arc::new(HnswIndex::new(3, MetricKind::L2, 16, 64));
    for i in 0..200u64 {
        index.insert(i, &[i as f32, i as f32, i as f32]).unwrap();
    }

    let writer = {
        let index = index.clone();
        thread::spawn(move || {
            for i in 200..400u64 {
                index.insert(i, &[i as f32, i as f32, i as f32]).unwrap();
            }
        })
    };

    let reader = {
        let index = index.clone();
        thread::spawn(move || {
            for _ in 0..200 {
                let _ = index.search(&[50.0, 50.0, 50.0], 5, Some(64), None).unwrap();
            }
        })
    };

    writer.join().unwrap();
    reader.join().unwrap();
    assert_eq!(index.len(), 400);
}

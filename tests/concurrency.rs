//! Concurrency guarantees of the identity cache.
//!
//! The probe and load work of racing binds is allowed to run redundantly, but
//! the cache insert is the single serialization point: all callers must end up
//! holding the same resolved module instance.

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Barrier,
    },
    thread,
};

use dotbind::prelude::*;

fn image_for(request: &AssemblyName) -> LoadedImage {
    LoadedImage {
        identity: request.clone(),
        handle: ModuleHandle::from_bytes(vec![0x4D, 0x5A]),
    }
}

#[test]
fn racing_binds_of_one_name_converge() {
    const THREADS: usize = 8;

    let hook_runs = Arc::new(AtomicUsize::new(0));
    let runs = hook_runs.clone();

    let binder = BinderBuilder::new("racy")
        .load_hook(move |request| {
            runs.fetch_add(1, Ordering::SeqCst);
            // Widen the race window so several threads really do produce
            // redundant modules before one insert wins.
            thread::sleep(std::time::Duration::from_millis(5));
            Ok(Some(image_for(request)))
        })
        .build();

    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let binder = binder.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                let request = AssemblyName::new("Contended", AssemblyVersion::new(1, 0, 0, 0));
                binder.bind_by_name(&request).unwrap()
            })
        })
        .collect();

    let results: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect();

    // Redundant work is permitted; duplicate observable modules are not.
    assert!(hook_runs.load(Ordering::SeqCst) >= 1);
    assert_eq!(binder.context().cached_len(), 1);
    for result in &results[1..] {
        assert!(Arc::ptr_eq(result, &results[0]));
        assert_eq!(result.identity(), results[0].identity());
    }
}

#[test]
fn distinct_names_bind_independently() {
    const THREADS: usize = 6;

    let binder = BinderBuilder::new("many")
        .load_hook(|request| Ok(Some(image_for(request))))
        .build();

    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|index| {
            let binder = binder.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                let request = AssemblyName::new(
                    format!("Lib{index}"),
                    AssemblyVersion::new(1, 0, 0, 0),
                );
                binder.bind_by_name(&request).unwrap()
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(binder.context().cached_len(), THREADS);
}

#[test]
fn sibling_contexts_never_share_modules() {
    let make_binder = |name: &str| {
        BinderBuilder::new(name)
            .load_hook(|request| Ok(Some(image_for(request))))
            .build()
    };

    let left = make_binder("left");
    let right = make_binder("right");

    let request = AssemblyName::new("Shared.Name", AssemblyVersion::new(1, 0, 0, 0));

    let handles: Vec<_> = [left.clone(), right.clone()]
        .into_iter()
        .map(|binder| {
            let request = request.clone();
            thread::spawn(move || binder.bind_by_name(&request).unwrap())
        })
        .collect();

    let results: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect();

    // Same simple name, isolated contexts: two independent instances.
    assert!(!Arc::ptr_eq(&results[0], &results[1]));
    assert_eq!(left.context().cached_len(), 1);
    assert_eq!(right.context().cached_len(), 1);
}

#[test]
fn concurrent_repeat_binds_stay_cached() {
    const THREADS: usize = 8;
    const ROUNDS: usize = 50;

    let binder = BinderBuilder::new("steady")
        .load_hook(|request| Ok(Some(image_for(request))))
        .build();

    let request = AssemblyName::new("Steady", AssemblyVersion::new(1, 0, 0, 0));
    let first = binder.bind_by_name(&request).unwrap();

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let binder = binder.clone();
            let request = request.clone();
            let first = first.clone();
            thread::spawn(move || {
                for _ in 0..ROUNDS {
                    let hit = binder.bind_by_name(&request).unwrap();
                    assert!(Arc::ptr_eq(&hit, &first));
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(binder.context().cached_len(), 1);
}

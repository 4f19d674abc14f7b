extern crate rand;
extern crate slmalloc;

use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use slmalloc::Slmalloc;
use std::cmp;

#[test]
fn smoke() {
    let mut a = Slmalloc::new();
    unsafe {
        assert!(a.init());

        let ptr = a.malloc(1, 1);
        assert!(!ptr.is_null());
        *ptr = 9;
        assert_eq!(*ptr, 9);
        a.free(ptr);

        let ptr = a.malloc(1, 1);
        assert!(!ptr.is_null());
        *ptr = 10;
        assert_eq!(*ptr, 10);
        a.free(ptr);

        assert!(a.validate());
        assert_eq!(a.alloced_mem_size(), 0);
    }
}

fn run_stress(seed: u64) {
    let mut a = Slmalloc::new();
    unsafe {
        assert!(a.init());
    }

    let mut rng = StdRng::seed_from_u64(seed);
    // (ptr, size, fill byte); every live block is stamped with its own byte
    // so overlap or corruption shows up when the block is checked on free.
    let mut ptrs: Vec<(*mut u8, usize, u8)> = Vec::new();
    let mut stamp = 0u8;
    let max = 10_000;
    unsafe {
        for k in 0..max {
            let free = !ptrs.is_empty()
                && ((ptrs.len() < 10_000 && rng.gen_bool(1f64 / 3f64)) || rng.gen());
            if free {
                let idx = rng.gen_range(0, ptrs.len());
                let (ptr, size, fill) = ptrs.swap_remove(idx);
                for i in 0..size {
                    assert_eq!(*ptr.add(i), fill);
                }
                a.free(ptr);
                continue;
            }

            if !ptrs.is_empty() && rng.gen_bool(1f64 / 100f64) {
                let idx = rng.gen_range(0, ptrs.len());
                let (ptr, size, fill) = ptrs.swap_remove(idx);
                let new_size = if rng.gen() {
                    rng.gen_range(size, size * 2)
                } else if size > 10 {
                    rng.gen_range(size / 2, size)
                } else {
                    ptrs.push((ptr, size, fill));
                    continue;
                };
                let ptr = a.realloc(ptr, new_size);
                assert!(!ptr.is_null());
                for i in 0..cmp::min(size, new_size) {
                    assert_eq!(*ptr.add(i), fill);
                }
                stamp = stamp.wrapping_add(1);
                for i in 0..new_size {
                    *ptr.add(i) = stamp;
                }
                ptrs.push((ptr, new_size, stamp));
                continue;
            }

            let size = if rng.gen() {
                rng.gen_range(1, 128)
            } else {
                rng.gen_range(1, 16 * 1024)
            };
            let zero = rng.gen_bool(1f64 / 50f64);
            let ptr = if zero {
                a.calloc(size, 8)
            } else {
                a.malloc(size, 8)
            };
            assert!(!ptr.is_null());
            assert_eq!(ptr as usize % 8, 0);
            stamp = stamp.wrapping_add(1);
            for i in 0..size {
                if zero {
                    assert_eq!(*ptr.add(i), 0);
                }
                *ptr.add(i) = stamp;
            }
            ptrs.push((ptr, size, stamp));

            if k % 512 == 0 {
                assert!(a.validate());
            }
        }

        assert!(a.validate());

        for (ptr, size, fill) in ptrs.drain(..) {
            for i in 0..size {
                assert_eq!(*ptr.add(i), fill);
            }
            a.free(ptr);
        }
        assert!(a.validate());
        assert_eq!(a.alloced_mem_size(), 0);
    }
}

#[test]
fn many_stress() {
    for i in 0..50 {
        run_stress(i);
    }
}

#[test]
fn stress() {
    let mut rng = rand::thread_rng();
    let seed: u64 = rng.gen();
    let seed = seed % 10000;
    run_stress(seed);
}

#![cfg(feature = "global")]

extern crate slmalloc;

use std::collections::HashMap;
use std::thread;

#[global_allocator]
static A: slmalloc::GlobalSlmalloc = slmalloc::GlobalSlmalloc;

#[test]
fn foo() {
    println!("hello");
}

#[test]
fn map() {
    let mut m = HashMap::new();
    m.insert(1, 2);
    m.insert(5, 3);
    drop(m);
}

#[test]
fn strings() {
    format!("foo, bar, {}", "baz");
}

#[test]
fn threads() {
    assert!(thread::spawn(|| panic!()).join().is_err());
}

#[test]
fn churn() {
    let mut v: Vec<u64> = Vec::new();
    for i in 0..100_000 {
        v.push(i);
    }
    assert_eq!(v.iter().sum::<u64>(), 100_000 * 99_999 / 2);

    let mut strings = Vec::new();
    for i in 0..1000 {
        strings.push(format!("string number {}", i));
    }
    strings.retain(|s| s.len() % 2 == 0);
    drop(strings);
}

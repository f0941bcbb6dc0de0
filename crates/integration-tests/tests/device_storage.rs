//! Integration tests for the device cart on a real filesystem.

#![allow(clippy::unwrap_used)]

use std::fs;
use std::path::Path;

use furnish_cart::{FileStore, KeyValueStore, LocalStore};
use furnish_core::{ProductId, ProductSnapshot};
use tempfile::TempDir;

fn open(dir: &Path) -> LocalStore<FileStore> {
    LocalStore::with_default_key(FileStore::open(dir).unwrap())
}

fn sofa() -> ProductSnapshot {
    ProductSnapshot::new(ProductId::parse("sofa").unwrap(), "Asgaard sofa", 2_500_000)
}

#[test]
fn test_cart_survives_reopen() {
    let dir = TempDir::new().unwrap();

    let store = open(dir.path());
    store.add(sofa(), 2).unwrap();
    drop(store);

    let reopened = open(dir.path());
    let cart = reopened.load();
    assert_eq!(cart.count(), 2);
    assert_eq!(cart.total(), 5_000_000);
}

#[test]
fn test_store_creates_missing_directory() {
    let dir = TempDir::new().unwrap();
    let nested = dir.path().join("furnish").join("device");

    let store = open(&nested);
    store.add(sofa(), 1).unwrap();

    assert!(nested.join("cart.json").exists());
}

#[test]
fn test_corrupt_file_reads_as_empty_cart() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("cart.json"), "{\"items\": [oops").unwrap();

    let store = open(dir.path());
    assert!(store.load().is_empty());

    // The next write replaces the corrupt payload
    store.add(sofa(), 1).unwrap();
    assert_eq!(open(dir.path()).load().count(), 1);
}

#[test]
fn test_non_utf8_file_reads_as_empty_cart() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("cart.json"), [0xff, 0xfe, 0x00, 0x9f]).unwrap();

    assert!(open(dir.path()).load().is_empty());
}

#[test]
fn test_legacy_array_payload_is_read() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("cart.json"),
        r#"[
            {"id": "sofa", "title": "Asgaard sofa", "price": 2500000, "quantity": 1},
            {"id": 7, "title": "Lamp", "price": 500000.4, "quantity": 3},
            {"id": "broken", "title": "Zero", "price": 10, "quantity": 0}
        ]"#,
    )
    .unwrap();

    let cart = open(dir.path()).load();

    assert_eq!(cart.len(), 2);
    assert_eq!(cart.count(), 4);
    let lamp = cart.get(&ProductId::parse("7").unwrap()).unwrap();
    assert_eq!(lamp.product.unit_price, 500_000);
}

#[test]
fn test_writes_leave_no_temporary_files() {
    let dir = TempDir::new().unwrap();
    let store = open(dir.path());

    store.add(sofa(), 1).unwrap();
    store.update_quantity(&ProductId::parse("sofa").unwrap(), 4).unwrap();
    store.clear().unwrap();

    let names: Vec<String> = fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["cart.json".to_string()]);
}

#[test]
fn test_invalid_key_is_rejected() {
    let dir = TempDir::new().unwrap();
    let store = FileStore::open(dir.path()).unwrap();

    assert!(store.set("../escape", "{}").is_err());
    assert!(store.get("").is_err());
}

#[test]
fn test_separate_keys_are_independent() {
    let dir = TempDir::new().unwrap();
    let storage = FileStore::open(dir.path()).unwrap();
    let first = LocalStore::new(storage.clone(), "cart-a");
    let second = LocalStore::new(storage, "cart-b");

    first.add(sofa(), 2).unwrap();

    assert_eq!(first.load().count(), 2);
    assert!(second.load().is_empty());
}

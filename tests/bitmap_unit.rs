use netindex::bitmap::Bitmap;
use netindex::MAX_VALID_PORT;

#[test]
fn set_check_unset_cycle() {
    let mut bitmap = Bitmap::new(MAX_VALID_PORT);
    assert!(!bitmap.check(80));

    bitmap.set(80);
    assert!(bitmap.check(80));
    assert!(!bitmap.check(79));
    assert!(!bitmap.check(81));

    bitmap.unset(80);
    assert!(!bitmap.check(80));
}

#[test]
fn set_is_idempotent() {
    let mut bitmap = Bitmap::new(MAX_VALID_PORT);
    bitmap.set(443);
    bitmap.set(443);
    assert!(bitmap.check(443));

    bitmap.unset(443);
    assert!(!bitmap.check(443));
}

#[test]
fn boundary_bits_are_addressable() {
    let mut bitmap = Bitmap::new(MAX_VALID_PORT);
    bitmap.set(0);
    bitmap.set(63);
    bitmap.set(64);
    bitmap.set(MAX_VALID_PORT - 1);

    assert!(bitmap.check(0));
    assert!(bitmap.check(63));
    assert!(bitmap.check(64));
    assert!(bitmap.check(MAX_VALID_PORT - 1));
    assert!(!bitmap.check(1));
    assert!(!bitmap.check(65));
}

#[test]
fn clear_all_zeroes_every_bit() {
    let mut bitmap = Bitmap::new(MAX_VALID_PORT);
    for idx in [0, 22, 8080, 65535] {
        bitmap.set(idx);
    }

    bitmap.clear_all();

    for idx in [0, 22, 8080, 65535] {
        assert!(!bitmap.check(idx));
    }
    assert_eq!(bitmap, Bitmap::new(MAX_VALID_PORT));
}

#[test]
fn clone_is_a_deep_copy() {
    let mut original = Bitmap::new(MAX_VALID_PORT);
    original.set(22);

    let mut copy = original.clone();
    assert!(copy.check(22));

    copy.set(80);
    assert!(!original.check(80));
    assert!(copy.check(80));
}

#[test]
fn indexes_in_range_returns_unset_ascending() {
    let mut bitmap = Bitmap::new(MAX_VALID_PORT);
    bitmap.set(20000);
    bitmap.set(20002);

    let free = bitmap.indexes_in_range(false, 20000, 20004);
    assert_eq!(free, vec![20001, 20003, 20004]);
}

#[test]
fn indexes_in_range_returns_set_bits_too() {
    let mut bitmap = Bitmap::new(MAX_VALID_PORT);
    bitmap.set(100);
    bitmap.set(105);
    bitmap.set(200);

    let set = bitmap.indexes_in_range(true, 100, 150);
    assert_eq!(set, vec![100, 105]);
}

#[test]
fn indexes_in_range_clamps_to_size() {
    let bitmap = Bitmap::new(128);
    let free = bitmap.indexes_in_range(false, 120, 4096);
    assert_eq!(free, vec![120, 121, 122, 123, 124, 125, 126, 127]);

    assert!(bitmap.indexes_in_range(false, 128, 200).is_empty());
}

#[test]
fn size_reports_bit_capacity() {
    assert_eq!(Bitmap::new(MAX_VALID_PORT).size(), MAX_VALID_PORT);
    assert_eq!(Bitmap::new(128).size(), 128);
}

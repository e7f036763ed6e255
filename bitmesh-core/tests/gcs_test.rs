use bitmesh_core::gcs::{GcsError, GcsFilter};

fn members(count: usize) -> Vec<Vec<u8>> {
    (0..count)
        .map(|i| format!("peer-{i:04}").into_bytes())
        .collect()
}

#[test]
fn test_completeness() {
    let ids = members(100);
    let filter = GcsFilter::build(&ids, 16).unwrap();
    for id in &ids {
        assert!(filter.might_contain(id), "member missing from filter");
    }
}

#[test]
fn test_false_positive_rate_is_bounded() {
    let ids = members(100);
    let filter = GcsFilter::build(&ids, 16).unwrap();
    assert_eq!(filter.false_positive_rate(), 1.0 / 65536.0);

    let mut false_positives = 0;
    for i in 0..1000 {
        let outsider = format!("outsider-{i:04}").into_bytes();
        if filter.might_contain(&outsider) {
            false_positives += 1;
        }
    }
    // Expected ~0.015 over 1000 probes at P=16; anything past a handful
    // means the coder is broken.
    assert!(false_positives < 20, "{false_positives} false positives");
}

#[test]
fn test_low_parameter_still_complete() {
    let ids = members(50);
    let filter = GcsFilter::build(&ids, 2).unwrap();
    for id in &ids {
        assert!(filter.might_contain(id));
    }
}

#[test]
fn test_single_element() {
    let filter = GcsFilter::build([b"only".as_slice()], 8).unwrap();
    assert!(filter.might_contain(b"only"));
    assert_eq!(filter.len(), 1);
}

#[test]
fn test_duplicate_inputs() {
    let filter = GcsFilter::build([b"dup".as_slice(), b"dup".as_slice()], 8).unwrap();
    assert!(filter.might_contain(b"dup"));
    assert_eq!(filter.len(), 2);
}

#[test]
fn test_empty_filter_matches_nothing() {
    let filter = GcsFilter::build(Vec::<Vec<u8>>::new(), 8).unwrap();
    assert!(filter.is_empty());
    assert!(!filter.might_contain(b"anything"));
    assert!(filter.data().is_empty());
}

#[test]
fn test_parameter_bounds() {
    assert_eq!(
        GcsFilter::build(members(3), 0),
        Err(GcsError::InvalidParameter)
    );
    assert_eq!(
        GcsFilter::build(members(3), 33),
        Err(GcsError::InvalidParameter)
    );
    assert!(GcsFilter::build(members(3), 32).is_ok());
}

#[test]
fn test_deterministic_encoding() {
    let a = GcsFilter::build(members(40), 12).unwrap();
    let b = GcsFilter::build(members(40), 12).unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_from_parts_roundtrip() {
    let ids = members(30);
    let built = GcsFilter::build(&ids, 10).unwrap();
    let wire =
        GcsFilter::from_parts(built.p(), built.len(), built.data().to_vec()).unwrap();
    assert_eq!(built, wire);
    for id in &ids {
        assert!(wire.might_contain(id));
    }
}

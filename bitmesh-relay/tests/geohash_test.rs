use bitmesh_relay::geohash::{decode, encode, scopes_intersect};

#[test]
fn test_known_vector() {
    // The classic reference point for geohash implementations.
    assert_eq!(encode(57.64911, 10.40744, 11), "u4pruydqqvj");
    assert_eq!(encode(57.64911, 10.40744, 5), "u4pru");
}

#[test]
fn test_equator_and_poles() {
    assert_eq!(encode(0.0, 0.0, 1), "s");
    assert!(encode(90.0, 180.0, 6).len() == 6);
    assert!(encode(-90.0, -180.0, 6).len() == 6);
}

#[test]
fn test_decode_recovers_center() {
    let (lat, lon) = decode("u4pruydqqvj").unwrap();
    assert!((lat - 57.64911).abs() < 0.001);
    assert!((lon - 10.40744).abs() < 0.001);
}

#[test]
fn test_encode_decode_roundtrip() {
    for &(lat, lon) in &[
        (37.7749, -122.4194),
        (-33.8688, 151.2093),
        (51.5074, -0.1278),
        (0.1, 0.1),
    ] {
        let hash = encode(lat, lon, 9);
        let (decoded_lat, decoded_lon) = decode(&hash).unwrap();
        assert!((decoded_lat - lat).abs() < 0.01, "{hash} lat drifted");
        assert!((decoded_lon - lon).abs() < 0.01, "{hash} lon drifted");
    }
}

#[test]
fn test_decode_rejects_invalid_alphabet() {
    // 'a', 'i', 'l', 'o' are not geohash base-32 characters.
    assert!(decode("u4a").is_none());
    assert!(decode("il0").is_none());
    assert!(decode("u4p").is_some());
}

#[test]
fn test_nearby_points_share_prefix() {
    let a = encode(57.64911, 10.40744, 9);
    let b = encode(57.64920, 10.40750, 9);
    assert_eq!(&a[..6], &b[..6]);
}

#[test]
fn test_scope_intersection() {
    // Unscoped publishes reach everything.
    assert!(scopes_intersect("u4pru", &[]));

    // Prefix containment in either direction.
    assert!(scopes_intersect("u4pruydqqvj", &["u4pru"]));
    assert!(scopes_intersect("u4", &["u4pruydqqvj"]));
    assert!(scopes_intersect("u4pru", &["u4pru"]));

    // Disjoint regions do not intersect.
    assert!(!scopes_intersect("u4pru", &["9q8yy"]));
    assert!(!scopes_intersect("u4pru", &["u5", "9q"]));

    // One matching scope among several is enough.
    assert!(scopes_intersect("u4pru", &["9q8yy", "u4"]));
}

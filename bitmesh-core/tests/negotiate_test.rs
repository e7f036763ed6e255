use bitmesh_core::negotiate::{negotiate, FeatureSet};
use bitmesh_core::MeshError;
use bitmesh_wire::Hello;

#[test]
fn test_version_meet() {
    let ours = Hello::new(2, 1, FeatureSet::MESH_RELAY | FeatureSet::COMPRESSION);
    let theirs = Hello::new(1, 1, FeatureSet::MESH_RELAY | FeatureSet::FILE_TRANSFER);

    let negotiated = negotiate(&ours, &theirs).unwrap();
    assert_eq!(negotiated.version, 1);
    assert_eq!(negotiated.features, FeatureSet(FeatureSet::MESH_RELAY));
}

#[test]
fn test_incompatible_minimums() {
    let ours = Hello::new(2, 1, 0);
    let theirs = Hello::new(3, 3, 0);
    assert!(matches!(
        negotiate(&ours, &theirs),
        Err(MeshError::IncompatibleVersions { ours: 2, theirs: 3 })
    ));

    // Symmetric: the peer rejects us for the same reason.
    assert!(negotiate(&theirs, &ours).is_err());
}

#[test]
fn test_equal_versions() {
    let hello = Hello::new(2, 2, FeatureSet::NOISE);
    let negotiated = negotiate(&hello, &hello).unwrap();
    assert_eq!(negotiated.version, 2);
    assert!(negotiated.features.contains(FeatureSet::NOISE));
}

#[test]
fn test_feature_intersection_is_commutative() {
    let a = Hello::new(2, 1, 0b1010_1010);
    let b = Hello::new(2, 1, 0b1100_1100);
    let ab = negotiate(&a, &b).unwrap();
    let ba = negotiate(&b, &a).unwrap();
    assert_eq!(ab.features, ba.features);
    assert_eq!(ab.features.0, 0b1000_1000);
}

#[test]
fn test_feature_set_contains() {
    let features = FeatureSet(FeatureSet::MESH_RELAY | FeatureSet::STORE_FORWARD);
    assert!(features.contains(FeatureSet::MESH_RELAY));
    assert!(features.contains(FeatureSet::MESH_RELAY | FeatureSet::STORE_FORWARD));
    assert!(!features.contains(FeatureSet::NOISE));
    assert!(!features.contains(FeatureSet::MESH_RELAY | FeatureSet::NOISE));
}

#[test]
fn test_feature_set_debug_names() {
    let rendered = format!("{:?}", FeatureSet(FeatureSet::MESH_RELAY));
    assert!(rendered.contains("meshRelay"));
}

use super::*;

#[test]
fn first_sync_when_both_sides_empty() {
    // §8 scenario 4.
    let plan = plan_snapshot_names(&[], &[]).unwrap();
    assert!(plan.is_first_sync);
    assert_eq!(plan.prev_snapshot_name, None);
    assert_eq!(plan.snapshot_name, "vm-migration-1");
    assert!(!plan.is_resume);
}

#[test]
fn target_has_snapshots_but_source_has_none_is_inconsistent() {
    // §8 boundary behavior.
    let err = plan_snapshot_names(&[], &[1]).unwrap_err();
    assert_eq!(err, NamingError::InconsistentSnapshots);
}

#[test]
fn normal_incremental_when_target_has_source_highest() {
    let plan = plan_snapshot_names(&[1, 2], &[1, 2]).unwrap();
    assert!(!plan.is_first_sync);
    assert!(!plan.is_resume);
    assert_eq!(plan.prev_snapshot_name.as_deref(), Some("vm-migration-2"));
    assert_eq!(plan.snapshot_name, "vm-migration-3");
}

#[test]
fn resumes_predecessor_pair_when_prev_missing_on_target() {
    // §8 scenario 5: source [1,2], target [1], resume token present.
    let plan = plan_snapshot_names(&[1, 2], &[1]).unwrap();
    assert!(!plan.is_first_sync);
    assert!(plan.is_resume);
    assert_eq!(plan.prev_snapshot_name.as_deref(), Some("vm-migration-1"));
    assert_eq!(plan.snapshot_name, "vm-migration-2");
}

#[test]
fn inconsistent_when_predecessor_also_missing_on_target() {
    let err = plan_snapshot_names(&[1, 2], &[]).unwrap_err();
    assert_eq!(err, NamingError::InconsistentSnapshots);
}

#[test]
fn collision_when_next_snapshot_already_on_target() {
    let err = plan_snapshot_names(&[1], &[1, 2]).unwrap_err();
    assert_eq!(err, NamingError::SnapshotCollision("vm-migration-2".to_string()));
}

#[test]
fn first_sync_fresh_source_with_no_prior_snapshots_is_exact_suffix_one() {
    let plan = plan_snapshot_names(&[], &[]).unwrap();
    assert_eq!(plan.snapshot_name, snapshot_name(1));
}

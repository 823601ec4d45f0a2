//! Cross-module tests for the classify → persist-detail → merge flow.

use serde_json::json;
use till_engine::{
    classify, diff_records, merge_fields, ConflictDetail, ConflictType, Disposition, EntityKind,
    Impact, RecordData, SyncWindows,
};

const MINUTE: i64 = 60_000;

fn product(updated_at: i64, price: f64, description: &str) -> RecordData {
    RecordData::new("p1", 1_000, updated_at)
        .with_field("name", json!("Beans"))
        .with_field("selling_price", json!(price))
        .with_field("description", json!(description))
        .with_field("is_active", json!(true))
}

#[test]
fn price_divergence_two_minutes_apart_is_a_high_conflict() {
    let local = product(10_000, 10.0, "a");
    let remote = product(10_000 + 2 * MINUTE, 12.0, "a");

    let Disposition::Conflict(conflict) =
        classify(EntityKind::Product, &local, &remote, SyncWindows::default())
    else {
        panic!("expected a conflict");
    };

    assert_eq!(conflict.conflict_type, ConflictType::NearSimultaneousConflict);
    assert_eq!(conflict.severity, Impact::High);
    assert_eq!(conflict.differences.len(), 1);
    assert_eq!(conflict.differences[0].field, "selling_price");
}

#[test]
fn merge_of_price_conflict_takes_the_higher_price() {
    let local = product(10_000, 10.0, "a");
    let remote = product(10_000 + 2 * MINUTE, 12.0, "a");

    let Disposition::Conflict(conflict) =
        classify(EntityKind::Product, &local, &remote, SyncWindows::default())
    else {
        panic!("expected a conflict");
    };

    let merged = merge_fields(&conflict.local, &conflict.remote, &conflict.differences, 500_000);
    assert_eq!(merged.field("selling_price"), &json!(12.0));
    assert_eq!(merged.updated_at, 500_000);
}

#[test]
fn description_only_divergence_is_low_severity() {
    let local = product(10_000, 10.0, "old text");
    let remote = product(10_000 + 2 * MINUTE, 10.0, "new text");

    let Disposition::Conflict(conflict) =
        classify(EntityKind::Product, &local, &remote, SyncWindows::default())
    else {
        panic!("expected a conflict");
    };
    assert_eq!(conflict.severity, Impact::Low);
}

#[test]
fn remote_ten_minutes_newer_wins_without_conflict() {
    let local = product(10_000, 10.0, "a");
    let remote = product(10_000 + 10 * MINUTE, 12.0, "b");

    assert_eq!(
        classify(EntityKind::Product, &local, &remote, SyncWindows::default()),
        Disposition::RemoteNewer
    );
}

#[test]
fn persisted_detail_survives_the_trip_through_the_inbox() {
    let local = product(10_000, 10.0, "a");
    let remote = product(10_000 + 2 * MINUTE, 12.0, "a");

    let Disposition::Conflict(conflict) =
        classify(EntityKind::Product, &local, &remote, SyncWindows::default())
    else {
        panic!("expected a conflict");
    };

    let detail = ConflictDetail::from_conflict(&conflict);
    let parsed = ConflictDetail::from_json(&detail.to_json()).unwrap();

    assert_eq!(parsed.conflict_type, conflict.conflict_type);
    assert_eq!(parsed.severity, conflict.severity);
    assert_eq!(parsed.differences, conflict.differences);
}

#[test]
fn sale_bill_number_divergence_is_critical() {
    let local = RecordData::new("s1", 0, 10_000)
        .with_field("bill_number", json!("B-001"))
        .with_field("total_amount", json!(99.0));
    let remote = RecordData::new("s1", 0, 10_000)
        .with_field("bill_number", json!("B-002"))
        .with_field("total_amount", json!(99.0));

    let Disposition::Conflict(conflict) =
        classify(EntityKind::Sale, &local, &remote, SyncWindows::default())
    else {
        panic!("expected a conflict");
    };
    assert_eq!(conflict.conflict_type, ConflictType::TimestampConflict);
    assert_eq!(conflict.severity, Impact::Critical);
}

mod property_tests {
    use super::*;
    use proptest::prelude::*;

    fn pair(
        local_price: f64,
        remote_price: f64,
        local_ts: i64,
        remote_ts: i64,
    ) -> (RecordData, RecordData) {
        (
            product(local_ts, local_price, "x"),
            product(remote_ts, remote_price, "x"),
        )
    }

    proptest! {
        #[test]
        fn classification_is_deterministic(
            local_price in 0.0f64..1000.0,
            remote_price in 0.0f64..1000.0,
            local_ts in 0i64..1_000_000,
            remote_ts in 0i64..1_000_000,
        ) {
            let (local, remote) = pair(local_price, remote_price, local_ts, remote_ts);
            let first = classify(EntityKind::Product, &local, &remote, SyncWindows::default());
            let second = classify(EntityKind::Product, &local, &remote, SyncWindows::default());
            prop_assert_eq!(first, second);
        }

        #[test]
        fn merged_price_is_the_max_of_both_sides(
            local_price in 0.0f64..1000.0,
            remote_price in 0.0f64..1000.0,
        ) {
            let (local, remote) = pair(local_price, remote_price, 0, 0);
            let diffs = diff_records(EntityKind::Product, &local, &remote);
            let merged = merge_fields(&local, &remote, &diffs, 1_000);

            let price = merged.field("selling_price").as_f64().unwrap();
            prop_assert_eq!(price, local_price.max(remote_price));
        }

        #[test]
        fn diff_is_symmetric_in_size(
            local_price in 0.0f64..1000.0,
            remote_price in 0.0f64..1000.0,
        ) {
            let (local, remote) = pair(local_price, remote_price, 0, 0);
            let forward = diff_records(EntityKind::Product, &local, &remote);
            let backward = diff_records(EntityKind::Product, &remote, &local);
            prop_assert_eq!(forward.len(), backward.len());
        }

        #[test]
        fn identical_payloads_never_conflict(
            price in 0.0f64..1000.0,
            local_ts in 0i64..1_000_000,
            remote_ts in 0i64..1_000_000,
        ) {
            let (local, remote) = pair(price, price, local_ts, remote_ts);
            let disposition =
                classify(EntityKind::Product, &local, &remote, SyncWindows::default());
            prop_assert!(!matches!(disposition, Disposition::Conflict(_)));
        }
    }
}

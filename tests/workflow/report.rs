use super::*;

/// Tests the counts recorded in the run report.
///
/// Expected: per-kind built, persisted and backfilled counts for the station import
#[tokio::test]
async fn report_counts_each_kind() -> Result<(), TestError> {
    let test = TestBuilder::new().with_station_tables().build().await?;

    let outcome = station_workflow(station_records()).execute(&test.db).await?;
    let report = &outcome.report;

    assert!(report.transactional);
    assert!(report.finished_at >= report.started_at);
    assert_eq!(report.built_for(COUNTRY), Some(2));
    assert_eq!(report.built_for(RECEIVER), Some(2));
    assert_eq!(report.built_for(MOUNTPOINT), Some(3));

    let receivers = report.persisted_for(RECEIVER).expect("receivers persisted");
    assert_eq!(receivers.persisted, 2);
    assert_eq!(receivers.backfilled, 2);

    let mountpoints = report.persisted_for(MOUNTPOINT).expect("mountpoints persisted");
    assert_eq!(mountpoints.persisted, 3);
    assert_eq!(mountpoints.backfilled, 3);

    assert_eq!(report.total_persisted(), 7);
    assert_eq!(report.total_backfilled(), 5);

    Ok(())
}

/// Tests the serialized form of the run report.
///
/// Expected: kinds serialize as their names
#[tokio::test]
async fn report_serializes_kind_names() -> Result<(), TestError> {
    let test = TestBuilder::new().with_station_tables().build().await?;

    let outcome = station_workflow(station_records()).execute(&test.db).await?;
    let json = serde_json::to_value(&outcome.report).expect("report serializes");

    assert_eq!(
        json["persist_order"],
        serde_json::json!(["country", "receiver", "mountpoint"])
    );
    assert_eq!(json["transactional"], serde_json::json!(true));
    assert_eq!(
        json["persisted"][1],
        serde_json::json!({ "kind": "receiver", "backfilled": 2, "persisted": 2 })
    );

    Ok(())
}

/// Tests that phases render for error messages.
///
/// Expected: persisting phases name their kind, transaction phases name the transaction
#[test]
fn phases_render_with_kind() {
    assert_eq!(Phase::PreFetching.to_string(), "pre-fetching");
    assert_eq!(Phase::Persisting(RECEIVER.id()).to_string(), "persisting receiver");
    assert_eq!(Phase::Opening.to_string(), "opening the transaction");
    assert_eq!(Phase::Committing.to_string(), "committing the transaction");
}

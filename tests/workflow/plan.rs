use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use super::*;

/// Tests that a cyclic workflow fails before any callable runs.
///
/// Expected: Err(CyclicDependency), no fetch and no rows written
#[tokio::test]
async fn cyclic_workflow_fails_without_side_effects() -> Result<(), TestError> {
    let test = TestBuilder::new().with_station_tables().build().await?;
    let fetch_calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&fetch_calls);

    let workflow = station_workflow(station_records())
        .relate(
            COUNTRY,
            |_country, _id| {},
            MOUNTPOINT,
            |record| Some(record.mountpoint.clone()),
            "country_mountpoint",
        )
        .lookup(
            "countries",
            |records: &[StationRecord]| records.iter().map(|r| r.country.clone()).collect(),
            move |txn, names| {
                counter.fetch_add(1, Ordering::SeqCst);
                Box::pin(async move { CountryRepository::new(txn).find_by_names(names).await })
            },
            |country: &country::Model| country.name.clone(),
        );

    assert!(matches!(
        workflow.persist_order(),
        Err(Error::CyclicDependency { .. })
    ));

    let result = workflow.execute_without_transaction(&test.db).await;

    match result {
        Err(Error::CyclicDependency { unresolved }) => {
            assert_eq!(unresolved, vec![COUNTRY.id(), RECEIVER.id(), MOUNTPOINT.id()]);
        }
        Err(other) => panic!("expected CyclicDependency, got {:?}", other),
        Ok(_) => panic!("expected the run to fail"),
    }
    assert_eq!(fetch_calls.load(Ordering::SeqCst), 0);
    assert!(test.station().countries().await?.is_empty());

    Ok(())
}

/// Tests a relation naming a child kind that is never built.
///
/// Expected: Err(MissingSourceKeyExtractor) and no rows written
#[tokio::test]
async fn relation_child_without_build_fails() -> Result<(), TestError> {
    let test = TestBuilder::new().with_station_tables().build().await?;

    let workflow = persist_mountpoints(persist_receivers(persist_countries(build_parents(
        station_records(),
    ))))
    .relate(
        MOUNTPOINT,
        |mountpoint, id| mountpoint.receiver_id = ActiveValue::Set(Some(id)),
        RECEIVER,
        |record| Some(record.receiver.clone()),
        "mountpoint_receiver",
    );

    let result = workflow.execute(&test.db).await;

    assert!(matches!(
        result,
        Err(Error::MissingSourceKeyExtractor { kind, ref relation })
            if kind == MOUNTPOINT.id() && relation == "mountpoint_receiver"
    ));
    assert!(test.station().countries().await?.is_empty());

    Ok(())
}

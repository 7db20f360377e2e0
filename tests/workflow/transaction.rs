use std::collections::HashSet;

use sea_orm::TransactionTrait;

use super::*;

/// Station import whose receiver saver always fails
fn failing_receivers() -> Workflow<StationRecord> {
    persist_mountpoints(
        persist_countries(build_stations(station_records())).persist(
            RECEIVER,
            |_txn, _models| {
                Box::pin(async {
                    Err::<Vec<receiver::ActiveModel>, _>(DbErr::Custom(
                        "receiver table unavailable".to_string(),
                    ))
                })
            },
            |model: &receiver::ActiveModel| active_id(&model.id),
        ),
    )
}

fn assert_receiver_failure(result: Result<WorkflowOutcome<StationRecord>, Error>) {
    match result {
        Err(Error::ExecutionFailed {
            phase: Phase::Persisting(kind),
            step,
            source,
        }) => {
            assert_eq!(kind, RECEIVER.id());
            assert_eq!(step, "receiver");
            assert!(source.to_string().contains("receiver table unavailable"));
        }
        Err(other) => panic!("expected ExecutionFailed, got {:?}", other),
        Ok(_) => panic!("expected the receiver saver to fail"),
    }
}

/// Tests that a failure inside a transactional run rolls back earlier kinds.
///
/// Expected: Err(ExecutionFailed) for the receiver kind and no countries committed
#[tokio::test]
async fn failed_transactional_run_commits_nothing() -> Result<(), TestError> {
    let test = TestBuilder::new().with_station_tables().build().await?;

    let result = failing_receivers().execute(&test.db).await;

    assert_receiver_failure(result);
    assert!(test.station().countries().await?.is_empty());
    assert!(test.station().receivers().await?.is_empty());
    assert!(test.station().mountpoints().await?.is_empty());

    Ok(())
}

/// Tests that a failure in a non-transactional run keeps earlier kinds committed.
///
/// Expected: Err(ExecutionFailed) for the receiver kind with both countries committed
#[tokio::test]
async fn failed_run_without_transaction_keeps_earlier_kinds() -> Result<(), TestError> {
    let test = TestBuilder::new().with_station_tables().build().await?;

    let result = failing_receivers().execute_without_transaction(&test.db).await;

    assert_receiver_failure(result);
    let names: Vec<String> = test
        .station()
        .countries()
        .await?
        .into_iter()
        .map(|c| c.name)
        .collect();
    assert_eq!(names, vec!["China", "USA"]);
    assert!(test.station().receivers().await?.is_empty());
    assert!(test.station().mountpoints().await?.is_empty());

    Ok(())
}

/// Tests that a unique constraint violation mid-run rolls back the whole run.
///
/// Expected: Err(ExecutionFailed) for the country kind and only the fixture row left
#[tokio::test]
async fn store_error_rolls_back_transactional_run() -> Result<(), TestError> {
    let test = TestBuilder::new()
        .with_station_tables()
        .with_country("USA")
        .build()
        .await?;

    let result = station_workflow(station_records()).execute(&test.db).await;

    assert!(matches!(
        result,
        Err(Error::ExecutionFailed { phase: Phase::Persisting(kind), .. }) if kind == COUNTRY.id()
    ));
    let countries = test.station().countries().await?;
    assert_eq!(countries.len(), 1);
    assert_eq!(countries[0].name, "USA");

    Ok(())
}

/// Tests that a saver returning fewer entities than it was given is rejected.
///
/// Expected: Err(PersistedCountMismatch) and nothing committed
#[tokio::test]
async fn saver_dropping_entities_is_rejected() -> Result<(), TestError> {
    let test = TestBuilder::new().with_station_tables().build().await?;

    let workflow = build_stations(station_records()).persist(
        COUNTRY,
        |txn, models| {
            Box::pin(async move {
                let mut saved = CountryRepository::new(txn).insert_many(models).await?;
                saved.pop();
                Ok::<_, DbErr>(saved)
            })
        },
        |model| active_id(&model.id),
    );

    let result = workflow.execute(&test.db).await;

    assert!(matches!(
        result,
        Err(Error::PersistedCountMismatch { kind, expected: 2, actual: 1 }) if kind == COUNTRY.id()
    ));
    assert!(test.station().countries().await?.is_empty());

    Ok(())
}

/// Tests a transactional run nested inside a caller-owned transaction.
///
/// Expected: the run's writes are visible through the outer transaction and vanish once
/// the caller rolls it back
#[tokio::test]
async fn outer_rollback_undoes_nested_run() -> Result<(), TestError> {
    let test = TestBuilder::new().with_station_tables().build().await?;
    let outer = test.db.begin().await?;

    let outcome = station_workflow(station_records()).execute(&outer).await?;

    assert_eq!(outcome.report.total_persisted(), 7);
    let names = HashSet::from(["China".to_string(), "USA".to_string()]);
    let visible = CountryRepository::new(&outer).find_by_names(names).await?;
    assert_eq!(visible.len(), 2);

    outer.rollback().await?;

    assert!(test.station().countries().await?.is_empty());
    assert!(test.station().receivers().await?.is_empty());
    assert!(test.station().mountpoints().await?.is_empty());

    Ok(())
}

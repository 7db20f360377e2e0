use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use super::*;

/// Countries named by the records, skipping blank names
fn country_names(records: &[StationRecord]) -> HashSet<String> {
    records
        .iter()
        .filter(|record| !record.country.is_empty())
        .map(|record| record.country.clone())
        .collect()
}

/// Station import that reuses countries already in the store.
///
/// Existing countries are pre-fetched into the `countries` lookup. The country builder
/// skips them and the receiver builder takes their id straight from the lookup, leaving
/// the relation to fill in ids for newly created countries.
fn find_or_create_workflow(
    records: Vec<StationRecord>,
    fetch_calls: Arc<AtomicUsize>,
) -> Workflow<StationRecord> {
    let workflow = Workflow::new(records)
        .lookup(
            "countries",
            country_names,
            move |txn, names| {
                fetch_calls.fetch_add(1, Ordering::SeqCst);
                Box::pin(async move { CountryRepository::new(txn).find_by_names(names).await })
            },
            |country: &country::Model| country.name.clone(),
        )
        .build(
            COUNTRY,
            |record| (!record.country.is_empty()).then(|| record.country.clone()),
            |record, ctx| {
                if ctx
                    .lookup::<String, country::Model>("countries")?
                    .contains_key(&record.country)
                {
                    return Ok(None);
                }
                Ok(Some(country::ActiveModel {
                    name: ActiveValue::Set(record.country.clone()),
                    ..Default::default()
                }))
            },
        )
        .build(
            RECEIVER,
            |record| Some(record.receiver.clone()),
            |record, ctx| {
                let existing = ctx
                    .lookup::<String, country::Model>("countries")?
                    .get(&record.country)
                    .map(|country| country.id);
                Ok(Some(receiver::ActiveModel {
                    code: ActiveValue::Set(record.receiver.clone()),
                    country_id: ActiveValue::Set(existing),
                    ..Default::default()
                }))
            },
        )
        .relate(
            RECEIVER,
            |receiver, id| receiver.country_id = ActiveValue::Set(Some(id)),
            COUNTRY,
            |record| Some(record.country.clone()),
            "receiver_country",
        );

    persist_receivers(persist_countries(workflow))
}

/// Tests find-or-create against a store that already holds one country.
///
/// Expected: the existing country is reused, only the missing one is created, and the
/// fetcher runs exactly once for the whole batch
#[tokio::test]
async fn reuses_prefetched_entities() -> Result<(), TestError> {
    let test = TestBuilder::new()
        .with_station_tables()
        .with_country("China")
        .build()
        .await?;
    let fetch_calls = Arc::new(AtomicUsize::new(0));

    let outcome = find_or_create_workflow(station_records(), Arc::clone(&fetch_calls))
        .execute(&test.db)
        .await?;

    assert_eq!(fetch_calls.load(Ordering::SeqCst), 1);

    let countries = test.station().countries().await?;
    let names: Vec<&str> = countries.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["China", "USA"]);

    let receivers = test.station().receivers().await?;
    assert_eq!(receivers[0].country_id, Some(countries[0].id));
    assert_eq!(receivers[1].country_id, Some(countries[1].id));

    assert_eq!(outcome.report.built_for(COUNTRY), Some(1));
    assert_eq!(outcome.report.lookups.len(), 1);
    assert_eq!(outcome.report.lookups[0].requested_keys, 2);
    assert_eq!(outcome.report.lookups[0].entries, 1);
    assert!(outcome.context.has_lookup("countries"));

    Ok(())
}

/// Tests that a lookup with no keys to request never calls its fetcher.
///
/// Expected: no fetch, no lookup table, and receivers saved without a country
#[tokio::test]
async fn skips_fetch_when_no_keys_requested() -> Result<(), TestError> {
    let test = TestBuilder::new().with_station_tables().build().await?;
    let fetch_calls = Arc::new(AtomicUsize::new(0));
    let records = vec![
        StationRecord::new("MP001", "R001", ""),
        StationRecord::new("MP002", "R002", ""),
    ];

    let outcome = find_or_create_workflow(records, Arc::clone(&fetch_calls))
        .execute(&test.db)
        .await?;

    assert_eq!(fetch_calls.load(Ordering::SeqCst), 0);
    assert!(!outcome.context.has_lookup("countries"));
    assert!(outcome.report.lookups.is_empty());
    assert!(test.station().countries().await?.is_empty());

    let receivers = test.station().receivers().await?;
    assert_eq!(receivers.len(), 2);
    assert!(receivers.iter().all(|r| r.country_id.is_none()));

    Ok(())
}

/// Tests that every pre-existing country can satisfy the whole batch.
///
/// Expected: no country saved by the run, receivers linked through the lookup only
#[tokio::test]
async fn all_entities_prefetched() -> Result<(), TestError> {
    let test = TestBuilder::new()
        .with_station_tables()
        .with_country("China")
        .with_country("USA")
        .build()
        .await?;

    let outcome = find_or_create_workflow(station_records(), Arc::new(AtomicUsize::new(0)))
        .execute(&test.db)
        .await?;

    assert_eq!(outcome.report.persisted_for(COUNTRY).map(|p| p.persisted), Some(0));
    assert_eq!(outcome.report.persisted_for(RECEIVER).map(|p| p.backfilled), Some(0));
    assert_eq!(test.station().countries().await?.len(), 2);

    let receivers = test.station().receivers().await?;
    assert!(receivers.iter().all(|r| r.country_id.is_some()));

    Ok(())
}

/// Tests a builder reading a populated lookup with the wrong entity type.
///
/// Expected: Err(ExecutionFailed) while building, caused by LookupConflict, and nothing
/// persisted
#[tokio::test]
async fn mistyped_lookup_read_fails_the_run() -> Result<(), TestError> {
    let test = TestBuilder::new()
        .with_station_tables()
        .with_country("China")
        .build()
        .await?;

    let workflow = Workflow::new(station_records())
        .lookup(
            "countries",
            country_names,
            |txn, names| {
                Box::pin(async move { CountryRepository::new(txn).find_by_names(names).await })
            },
            |country: &country::Model| country.name.clone(),
        )
        .build(
            COUNTRY,
            |record| Some(record.country.clone()),
            |record, ctx| {
                if ctx
                    .lookup::<String, receiver::Model>("countries")?
                    .contains_key(&record.country)
                {
                    return Ok(None);
                }
                Ok(Some(country::ActiveModel {
                    name: ActiveValue::Set(record.country.clone()),
                    ..Default::default()
                }))
            },
        );

    let result = persist_countries(workflow).execute(&test.db).await;

    match result {
        Err(Error::ExecutionFailed {
            phase: Phase::Building,
            step,
            source,
        }) => {
            assert_eq!(step, "country");
            assert!(matches!(
                source.downcast_ref::<Error>(),
                Some(Error::LookupConflict { name }) if name == "countries"
            ));
        }
        Err(other) => panic!("expected ExecutionFailed, got {:?}", other),
        Ok(_) => panic!("expected the mistyped lookup read to fail"),
    }
    assert_eq!(test.station().countries().await?.len(), 1);

    Ok(())
}

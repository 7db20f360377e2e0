//! Station import workflow shared by the integration tests.
//!
//! Countries, receivers and mountpoints are built from flat station records, receivers
//! are related to their country and mountpoints to their receiver.

use cascade::Workflow;
use cascade_test_utils::prelude::*;
use entity::{country, mountpoint, receiver};
use sea_orm::ActiveValue::Set;

/// Build steps for countries and receivers, with receivers related to their country.
pub fn build_parents(records: Vec<StationRecord>) -> Workflow<StationRecord> {
    Workflow::new(records)
        .build(
            COUNTRY,
            |record| (!record.country.is_empty()).then(|| record.country.clone()),
            |record, _| {
                Ok(Some(country::ActiveModel {
                    name: Set(record.country.clone()),
                    ..Default::default()
                }))
            },
        )
        .build(
            RECEIVER,
            |record| Some(record.receiver.clone()),
            |record, _| {
                Ok(Some(receiver::ActiveModel {
                    code: Set(record.receiver.clone()),
                    country_id: Set(None),
                    ..Default::default()
                }))
            },
        )
        .relate(
            RECEIVER,
            |receiver, id| receiver.country_id = Set(Some(id)),
            COUNTRY,
            |record| (!record.country.is_empty()).then(|| record.country.clone()),
            "receiver_country",
        )
}

/// Build steps and relations for all three kinds, without persistence bindings.
pub fn build_stations(records: Vec<StationRecord>) -> Workflow<StationRecord> {
    build_parents(records)
        .build(
            MOUNTPOINT,
            |record| Some(record.mountpoint.clone()),
            |record, _| {
                Ok(Some(mountpoint::ActiveModel {
                    code: Set(record.mountpoint.clone()),
                    receiver_id: Set(None),
                    ..Default::default()
                }))
            },
        )
        .relate(
            MOUNTPOINT,
            |mountpoint, id| mountpoint.receiver_id = Set(Some(id)),
            RECEIVER,
            |record| Some(record.receiver.clone()),
            "mountpoint_receiver",
        )
}

pub fn persist_countries(workflow: Workflow<StationRecord>) -> Workflow<StationRecord> {
    workflow.persist(
        COUNTRY,
        |txn, models| Box::pin(async move { CountryRepository::new(txn).insert_many(models).await }),
        |model| active_id(&model.id),
    )
}

pub fn persist_receivers(workflow: Workflow<StationRecord>) -> Workflow<StationRecord> {
    workflow.persist(
        RECEIVER,
        |txn, models| {
            Box::pin(async move { ReceiverRepository::new(txn).insert_many(models).await })
        },
        |model| active_id(&model.id),
    )
}

pub fn persist_mountpoints(workflow: Workflow<StationRecord>) -> Workflow<StationRecord> {
    workflow.persist(
        MOUNTPOINT,
        |txn, models| {
            Box::pin(async move { MountpointRepository::new(txn).insert_many(models).await })
        },
        |model| active_id(&model.id),
    )
}

/// The full station import: every kind built, related and persisted.
pub fn station_workflow(records: Vec<StationRecord>) -> Workflow<StationRecord> {
    persist_mountpoints(persist_receivers(persist_countries(build_stations(records))))
}

//! Station fixtures.
//!
//! A station record is one flat import row naming a mountpoint, the receiver it is
//! served by and the country the receiver sits in. Importing records produces one
//! country per distinct country name, one receiver per distinct receiver code and one
//! mountpoint per record, linked by generated ids.

use cascade::EntityKind;
use entity::{country, mountpoint, receiver};
use sea_orm::{ActiveModelTrait, ActiveValue, ColumnTrait, EntityTrait, QueryFilter, QueryOrder};

use crate::{context::TestContext, error::TestError};

pub const COUNTRY: EntityKind<country::ActiveModel, i32> = EntityKind::new("country");
pub const RECEIVER: EntityKind<receiver::ActiveModel, i32> = EntityKind::new("receiver");
pub const MOUNTPOINT: EntityKind<mountpoint::ActiveModel, i32> = EntityKind::new("mountpoint");

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationRecord {
    pub mountpoint: String,
    pub receiver: String,
    pub country: String,
}

impl StationRecord {
    pub fn new(mountpoint: &str, receiver: &str, country: &str) -> Self {
        Self {
            mountpoint: mountpoint.to_string(),
            receiver: receiver.to_string(),
            country: country.to_string(),
        }
    }
}

/// Three records over two receivers and two countries; MP001 and MP003 share R001.
pub fn station_records() -> Vec<StationRecord> {
    vec![
        StationRecord::new("MP001", "R001", "China"),
        StationRecord::new("MP002", "R002", "USA"),
        StationRecord::new("MP003", "R001", "China"),
    ]
}

/// Row helpers for the station tables, borrowed from a [`TestContext`].
pub struct StationFixtures<'a> {
    setup: &'a TestContext,
}

impl<'a> StationFixtures<'a> {
    pub(crate) fn new(setup: &'a TestContext) -> Self {
        Self { setup }
    }

    /// Insert a country unless one with the same name exists.
    pub async fn insert_country(&self, name: &str) -> Result<country::Model, TestError> {
        if let Some(existing) = entity::prelude::Country::find()
            .filter(country::Column::Name.eq(name))
            .one(&self.setup.db)
            .await?
        {
            return Ok(existing);
        }

        Ok(country::ActiveModel {
            name: ActiveValue::Set(name.to_string()),
            ..Default::default()
        }
        .insert(&self.setup.db)
        .await?)
    }

    /// All countries ordered by id
    pub async fn countries(&self) -> Result<Vec<country::Model>, TestError> {
        Ok(entity::prelude::Country::find()
            .order_by_asc(country::Column::Id)
            .all(&self.setup.db)
            .await?)
    }

    /// All receivers ordered by id
    pub async fn receivers(&self) -> Result<Vec<receiver::Model>, TestError> {
        Ok(entity::prelude::Receiver::find()
            .order_by_asc(receiver::Column::Id)
            .all(&self.setup.db)
            .await?)
    }

    /// All mountpoints ordered by id
    pub async fn mountpoints(&self) -> Result<Vec<mountpoint::Model>, TestError> {
        Ok(entity::prelude::Mountpoint::find()
            .order_by_asc(mountpoint::Column::Id)
            .all(&self.setup.db)
            .await?)
    }
}

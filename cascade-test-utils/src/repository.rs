//! Repositories for the station tables.
//!
//! Each repository is generic over the connection, so it works against a
//! `DatabaseConnection` as well as the `DatabaseTransaction` a workflow step receives.
//! `insert_many` inserts row by row and hands back active models carrying the generated
//! ids, in input order.

use std::collections::HashSet;

use entity::{country, mountpoint, receiver};
use sea_orm::{
    ActiveModelTrait, ActiveValue, ColumnTrait, ConnectionTrait, DbErr, EntityTrait,
    IntoActiveModel, QueryFilter,
};

/// Generated id of an active model's primary key, if it has been assigned.
pub fn active_id(id: &ActiveValue<i32>) -> Option<i32> {
    match id {
        ActiveValue::Set(v) | ActiveValue::Unchanged(v) => Some(*v),
        ActiveValue::NotSet => None,
    }
}

pub struct CountryRepository<'a, C: ConnectionTrait> {
    db: &'a C,
}

impl<'a, C: ConnectionTrait> CountryRepository<'a, C> {
    pub fn new(db: &'a C) -> Self {
        Self { db }
    }

    pub async fn insert_many(
        &self,
        models: Vec<country::ActiveModel>,
    ) -> Result<Vec<country::ActiveModel>, DbErr> {
        let mut inserted = Vec::with_capacity(models.len());
        for model in models {
            inserted.push(model.insert(self.db).await?.into_active_model());
        }

        Ok(inserted)
    }

    pub async fn find_by_names(&self, names: HashSet<String>) -> Result<Vec<country::Model>, DbErr> {
        entity::prelude::Country::find()
            .filter(country::Column::Name.is_in(names))
            .all(self.db)
            .await
    }
}

pub struct ReceiverRepository<'a, C: ConnectionTrait> {
    db: &'a C,
}

impl<'a, C: ConnectionTrait> ReceiverRepository<'a, C> {
    pub fn new(db: &'a C) -> Self {
        Self { db }
    }

    pub async fn insert_many(
        &self,
        models: Vec<receiver::ActiveModel>,
    ) -> Result<Vec<receiver::ActiveModel>, DbErr> {
        let mut inserted = Vec::with_capacity(models.len());
        for model in models {
            inserted.push(model.insert(self.db).await?.into_active_model());
        }

        Ok(inserted)
    }

    pub async fn find_by_codes(&self, codes: HashSet<String>) -> Result<Vec<receiver::Model>, DbErr> {
        entity::prelude::Receiver::find()
            .filter(receiver::Column::Code.is_in(codes))
            .all(self.db)
            .await
    }
}

pub struct MountpointRepository<'a, C: ConnectionTrait> {
    db: &'a C,
}

impl<'a, C: ConnectionTrait> MountpointRepository<'a, C> {
    pub fn new(db: &'a C) -> Self {
        Self { db }
    }

    pub async fn insert_many(
        &self,
        models: Vec<mountpoint::ActiveModel>,
    ) -> Result<Vec<mountpoint::ActiveModel>, DbErr> {
        let mut inserted = Vec::with_capacity(models.len());
        for model in models {
            inserted.push(model.insert(self.db).await?.into_active_model());
        }

        Ok(inserted)
    }
}

//! Declarative test builder.
//!
//! This module provides the `TestBuilder` API for configuring test environments before execution.
//! Tables and fixture rows are queued by the builder methods and created during the final
//! `build()` call.

use sea_orm::{sea_query::TableCreateStatement, EntityTrait, Schema};

use crate::{error::TestError, TestContext};

/// Builder for declarative test initialization.
pub struct TestBuilder {
    // Tables to create
    tables: Vec<TableCreateStatement>,
    include_station_tables: bool,

    // Database fixtures to insert
    countries: Vec<String>,
}

impl TestBuilder {
    /// Create a new TestBuilder with no tables or fixtures configured.
    pub fn new() -> Self {
        Self {
            tables: Vec::new(),
            include_station_tables: false,
            countries: Vec::new(),
        }
    }

    /// Add the country, receiver and mountpoint tables, in foreign key order.
    pub fn with_station_tables(mut self) -> Self {
        self.include_station_tables = true;
        self
    }

    /// Add a single table for the given entity.
    pub fn with_table<E>(mut self, entity: E) -> Self
    where
        E: EntityTrait,
    {
        let schema = Schema::new(sea_orm::DbBackend::Sqlite);
        self.tables.push(schema.create_table_from_entity(entity));
        self
    }

    /// Insert a country row before the test runs.
    ///
    /// Requires the country table, either via `with_station_tables()` or `with_table()`.
    pub fn with_country(mut self, name: &str) -> Self {
        self.countries.push(name.to_string());
        self
    }

    /// Build the test context, creating tables and inserting queued fixtures.
    pub async fn build(self) -> Result<TestContext, TestError> {
        let setup = TestContext::new().await?;

        // 1. Create tables
        let mut all_tables = Vec::new();

        if self.include_station_tables {
            let schema = Schema::new(sea_orm::DbBackend::Sqlite);
            all_tables.extend(vec![
                schema.create_table_from_entity(entity::prelude::Country),
                schema.create_table_from_entity(entity::prelude::Receiver),
                schema.create_table_from_entity(entity::prelude::Mountpoint),
            ]);
        }

        all_tables.extend(self.tables);
        setup.with_tables(all_tables).await?;

        // 2. Insert database fixtures
        for name in self.countries {
            setup.station().insert_country(&name).await?;
        }

        Ok(setup)
    }
}

impl Default for TestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

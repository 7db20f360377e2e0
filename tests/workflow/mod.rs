mod lookup;
mod plan;
mod report;
mod transaction;

use cascade::{Error, Phase, Workflow, WorkflowConfig, WorkflowOutcome};
use cascade_test_utils::prelude::*;
use entity::{country, mountpoint, receiver};
use sea_orm::{ActiveValue, DbErr};

use crate::util::{
    build_parents, build_stations, persist_countries, persist_mountpoints, persist_receivers,
    station_workflow,
};

pub mod builder;
pub mod context;
pub mod error;
pub mod fixtures;
pub mod repository;

pub use builder::TestBuilder;
pub use context::TestContext;
pub use error::TestError;

pub mod prelude {
    pub use crate::{
        fixtures::station::{station_records, StationRecord, COUNTRY, MOUNTPOINT, RECEIVER},
        repository::{active_id, CountryRepository, MountpointRepository, ReceiverRepository},
        TestBuilder, TestContext, TestError,
    };
}

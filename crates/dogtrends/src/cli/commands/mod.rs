pub mod analysis;
pub mod dogs;
pub mod inspect;
pub mod regions;
pub mod report;
pub mod schema;
pub mod verify;
pub mod weekdays;

pub mod envelope;
pub mod snapshot;
pub mod weekday;

pub use envelope::{
    ENVELOPE_SCHEMA_VERSION, Envelope, EnvelopeCommandFailure, ErrorCode, WarningCode,
};
pub use snapshot::{CompletedTest, Dog, Snapshot, User, is_flagged};
pub use weekday::Weekday;

pub mod bus;
pub mod error;

pub use bus::{
    channel, DispatchSummary, EventSender, ExtractionEvent, ExtractionEvents, ExtractionListener,
};
pub use error::{ConnectError, HdbxError, QueryError, Result, SourceFetchError};

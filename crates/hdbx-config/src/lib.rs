pub mod connection;
pub mod error;
pub mod settings;

pub use connection::{ConnectionSettings, DEFAULT_PORT};
pub use error::{ParseError, Result};
pub use settings::HdbxSettings;

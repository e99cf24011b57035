pub mod error;
pub mod policy;
pub mod sieve;

pub use error::UnknownSourceError;
pub use policy::{FillPolicy, SieveConfig};
pub use sieve::{DataSieve, FillReport};

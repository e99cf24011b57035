pub mod args;
pub mod listener;
pub mod printer;
pub mod run;

pub use args::{Args, Invocation, Request};
pub use listener::ConsoleListener;
pub use printer::ValuePrinter;
pub use run::{fetch_and_sieve, print_errors, print_sieve};

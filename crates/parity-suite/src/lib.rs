mod case;
mod error;
mod loader;
mod outcome;
mod report;
mod value;

pub use case::{Expected, SetupStep, TestAction, TestCase, TestSuite};
pub use error::SuiteError;
pub use loader::{load_suite, parse_suite};
pub use outcome::{Mode, Outcome, ResultsFile, Summary, UnknownMode};
pub use report::{read_results, write_results};
pub use value::Value;

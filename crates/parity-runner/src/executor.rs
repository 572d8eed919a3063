use std::time::Instant;

use parity_suite::{Outcome, TestCase};
use tracing::warn;

use crate::action::{Action, index_model};
use crate::error::ExecError;
use crate::transport::{Reply, Transport};

/// Language tag written into every outcome.
pub const LANGUAGE: &str = "rust";

/// Runs cases one at a time over a single transport.
pub struct Executor<T> {
    transport: T,
}

impl<T: Transport> Executor<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Run setup then the action, and record what happened. Never fails: a
    /// failing case becomes an outcome with `error` set.
    ///
    /// A failure whose message contains the case's expected error counts as
    /// a pass. Expected counts and documents are not compared.
    pub fn execute(&mut self, case: &TestCase) -> Outcome {
        let start = Instant::now();
        let mut outcome = Outcome::new(&case.name, LANGUAGE, self.transport.mode());

        match self.run_case(case) {
            Ok(reply) => {
                reply.fill(&mut outcome);
                outcome.success = true;
            }
            Err(err) => {
                let message = err.to_string();
                outcome.success = case
                    .expected
                    .error_substring()
                    .is_some_and(|expected| message.contains(expected));
                outcome.error = Some(message);
            }
        }

        outcome.duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        outcome
    }

    fn run_case(&mut self, case: &TestCase) -> Result<Reply, ExecError> {
        self.setup(case).map_err(|e| ExecError::Setup(Box::new(e)))?;
        let action = Action::parse(&case.action)?;
        Ok(self.transport.execute(&case.collection, &action)?)
    }

    fn setup(&mut self, case: &TestCase) -> Result<(), ExecError> {
        for step in &case.setup {
            let action = match step.operation.as_str() {
                "insert" => Action::InsertOne {
                    doc: step
                        .data
                        .to_document()
                        .ok_or_else(|| ExecError::InvalidAction("insert data must be an object".into()))?,
                },
                "createIndex" => Action::CreateIndex {
                    model: index_model(&step.data)?,
                },
                other => {
                    warn!(test = %case.name, operation = other, "ignoring unrecognized setup operation");
                    continue;
                }
            };
            self.transport.execute(&case.collection, &action)?;
        }
        Ok(())
    }
}

//! The LLM oracle contract this core consumes (spec.md §6): an opaque
//! `invoke(messages) -> text` callable. Everything about the model's
//! protocol, retry policy, and provider selection lives outside this
//! core's scope; this crate exists only to give committee code a narrow
//! trait to depend on plus the two transports the reference platform ships.

mod anthropic_backend;
mod claude_cli;
mod types;

pub use anthropic_backend::AnthropicBackend;
pub use claude_cli::ClaudeCliBackend;
pub use types::{LlmError, LlmOracle, Message, Role};

#[cfg(any(test, feature = "test-utils"))]
pub mod fake {
    use std::sync::Mutex;

    use crate::types::{LlmError, LlmOracle, Message};

    /// Deterministic test double: returns scripted responses in order.
    /// Used by `lanea-committee` and `lanea-meeting` tests so they never
    /// shell out to a real binary or network.
    pub struct FakeOracle {
        responses: Mutex<Vec<Result<String, String>>>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeOracle {
        #[must_use]
        pub fn new(responses: Vec<&str>) -> Self {
            Self {
                responses: Mutex::new(responses.into_iter().rev().map(|s| Ok(s.to_string())).collect()),
                calls: Mutex::new(Vec::new()),
            }
        }

        #[must_use]
        pub fn failing(error: &str) -> Self {
            Self {
                responses: Mutex::new(vec![Err(error.to_string())]),
                calls: Mutex::new(Vec::new()),
            }
        }

        #[must_use]
        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    impl LlmOracle for FakeOracle {
        fn invoke(&self, messages: &[Message]) -> Result<String, LlmError> {
            let rendered = messages.iter().map(|m| m.content.clone()).collect::<Vec<_>>().join("\n");
            self.calls.lock().unwrap().push(rendered);
            let mut responses = self.responses.lock().unwrap();
            match responses.pop() {
                Some(Ok(text)) => Ok(text),
                Some(Err(e)) => Err(LlmError::Transport(e)),
                None => Err(LlmError::Transport("FakeOracle exhausted".to_string())),
            }
        }
    }
}

//! Scripted completion provider for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use gptrelay_providers::{CompletionError, CompletionProvider};

/// Records every joined input it receives and answers from a script.
///
/// Unscripted calls answer `"reply to: <last prompt>"`.
#[derive(Default)]
pub struct ScriptedProvider {
    inputs: Mutex<Vec<String>>,
    script: Mutex<VecDeque<Result<String, String>>>,
    delays: Mutex<VecDeque<Duration>>,
    prompt_delays: Mutex<HashMap<String, Duration>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a failure for the next call.
    pub fn fail_next(&self, message: &str) {
        self.script
            .lock()
            .unwrap()
            .push_back(Err(message.to_string()));
    }

    /// Queue a successful reply for the next call.
    pub fn reply_next(&self, text: &str) {
        self.script.lock().unwrap().push_back(Ok(text.to_string()));
    }

    /// Delay each of the next calls, in order.
    pub fn delay_calls(&self, delays: &[Duration]) {
        self.delays.lock().unwrap().extend(delays.iter().copied());
    }

    /// Delay every call whose newest prompt is `prompt`.
    pub fn delay_prompt(&self, prompt: &str, delay: Duration) {
        self.prompt_delays
            .lock()
            .unwrap()
            .insert(prompt.to_string(), delay);
    }

    /// Joined inputs of every call so far, in call order.
    pub fn inputs(&self) -> Vec<String> {
        self.inputs.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    async fn complete(&self, prompts: &[String]) -> Result<String, CompletionError> {
        self.inputs.lock().unwrap().push(prompts.join("\n"));

        let delay = self.delays.lock().unwrap().pop_front().or_else(|| {
            let last = prompts.last()?;
            self.prompt_delays.lock().unwrap().get(last).copied()
        });
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self.script.lock().unwrap().pop_front();
        match scripted {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(CompletionError::Parse(message)),
            None => Ok(format!(
                "reply to: {}",
                prompts.last().map(String::as_str).unwrap_or("")
            )),
        }
    }

    fn model(&self) -> &str {
        "scripted"
    }

    fn display_name(&self) -> &str {
        "Scripted"
    }
}

//! In-memory `ControlApi` and `Notifier` doubles shared by the unit tests.

use crate::dashboard::{Notice, Notifier};
use crate::gateway::{Command, ControlApi, GatewayError};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type FetchScript = Box<dyn Fn(usize) -> Result<Vec<Value>, GatewayError> + Send + Sync>;
type CommandScript = Box<dyn Fn(&Command) -> Result<String, GatewayError> + Send + Sync>;

/// Answers each call from a closure keyed on the call index.
pub struct ScriptedApi {
    fetch: FetchScript,
    command: CommandScript,
    delay: Duration,
    fetch_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    pub commands: Mutex<Vec<Command>>,
}

impl ScriptedApi {
    pub fn always<F>(fetch: F) -> Self
    where
        F: Fn(usize) -> Result<Vec<Value>, GatewayError> + Send + Sync + 'static,
    {
        Self {
            fetch: Box::new(fetch),
            command: Box::new(|_| Ok("{}".to_string())),
            delay: Duration::ZERO,
            fetch_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            commands: Mutex::new(Vec::new()),
        }
    }

    pub fn with_commands<F>(mut self, command: F) -> Self
    where
        F: Fn(&Command) -> Result<String, GatewayError> + Send + Sync + 'static,
    {
        self.command = Box::new(command);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ControlApi for ScriptedApi {
    async fn fetch_latest(&self) -> Result<Vec<Value>, GatewayError> {
        let call = self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        (self.fetch)(call)
    }

    async fn send_command(&self, command: &Command) -> Result<String, GatewayError> {
        self.commands.lock().unwrap().push(*command);
        (self.command)(command)
    }
}

/// Collects notices instead of opening dialogs.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    pub notices: Arc<Mutex<Vec<Notice>>>,
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: &Notice) {
        self.notices.lock().unwrap().push(notice.clone());
    }
}

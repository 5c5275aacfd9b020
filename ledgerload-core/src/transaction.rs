use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tracing::warn;

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as u64
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxState {
    Created,
    Success,
    Failed,
}

/// Outcome of a single submitted request.
///
/// Status, committed flag and final timestamp move together through [`TxStatus::set_success`]
/// or [`TxStatus::set_failed`], and only once. Everything else, notably the custom data map,
/// stays writable afterwards.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TxStatus {
    id: String,
    status: TxState,
    time_create: u64,
    time_final: u64,
    committed: bool,
    verified: bool,
    flags: u64,
    result: Option<Value>,
    error_messages: Vec<String>,
    custom_data: HashMap<String, Value>,
}

impl TxStatus {
    pub fn new(id: impl Into<String>) -> Self {
        Self::created_at(id, now_ms())
    }

    pub fn created_at(id: impl Into<String>, time_create: u64) -> Self {
        Self {
            id: id.into(),
            status: TxState::Created,
            time_create,
            time_final: 0,
            committed: false,
            verified: false,
            flags: 0,
            result: None,
            error_messages: vec![],
            custom_data: HashMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = id.into();
    }

    pub fn status(&self) -> TxState {
        self.status
    }

    pub fn time_create(&self) -> u64 {
        self.time_create
    }

    pub fn time_final(&self) -> u64 {
        self.time_final
    }

    pub fn is_committed(&self) -> bool {
        self.committed
    }

    pub fn is_terminal(&self) -> bool {
        self.status != TxState::Created
    }

    /// Milliseconds between creation and completion, once terminal.
    pub fn latency_ms(&self) -> Option<u64> {
        self.is_terminal()
            .then(|| self.time_final.saturating_sub(self.time_create))
    }

    /// Mark the transaction committed, at `time` or now.
    pub fn set_success(&mut self, time: Option<u64>) {
        self.finalize(TxState::Success, time);
    }

    /// Mark the transaction failed, at `time` or now.
    pub fn set_failed(&mut self, time: Option<u64>) {
        self.finalize(TxState::Failed, time);
    }

    fn finalize(&mut self, status: TxState, time: Option<u64>) {
        if self.is_terminal() {
            warn!(
                "Transaction {} is already {:?}; ignoring transition to {:?}",
                self.id, self.status, status
            );
            return;
        }

        self.status = status;
        self.committed = status == TxState::Success;
        self.time_final = time.unwrap_or_else(now_ms);
    }

    pub fn is_verified(&self) -> bool {
        self.verified
    }

    pub fn set_verified(&mut self, verified: bool) {
        self.verified = verified;
    }

    pub fn flags(&self) -> u64 {
        self.flags
    }

    pub fn set_flags(&mut self, flags: u64) {
        self.flags = flags;
    }

    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    pub fn set_result(&mut self, result: Value) {
        self.result = Some(result);
    }

    /// Store an error message at `index`, padding any gap with empty messages.
    pub fn set_error_message(&mut self, index: usize, message: impl Into<String>) {
        if self.error_messages.len() <= index {
            self.error_messages.resize(index + 1, String::new());
        }
        self.error_messages[index] = message.into();
    }

    pub fn error_messages(&self) -> &[String] {
        &self.error_messages
    }

    pub fn set_custom_data(&mut self, key: impl Into<String>, value: Value) {
        self.custom_data.insert(key.into(), value);
    }

    pub fn custom_data(&self, key: &str) -> Option<&Value> {
        self.custom_data.get(key)
    }
}

//! Scripted transport shared by the unit tests

use crate::guard::CallFailure;
use crate::transport::ProvisioningTransport;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Answers calls from a queue and records what it was asked
#[derive(Default)]
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<Result<Value, CallFailure>>>,
    calls: Mutex<Vec<(String, Vec<Value>)>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, reply: Result<Value, CallFailure>) -> Self {
        self.replies.lock().unwrap().push_back(reply);
        self
    }

    pub fn ok(self, value: Value) -> Self {
        self.reply(Ok(value))
    }

    pub fn calls(&self) -> Vec<(String, Vec<Value>)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn methods(&self) -> Vec<String> {
        self.calls().into_iter().map(|(method, _)| method).collect()
    }
}

#[async_trait]
impl ProvisioningTransport for ScriptedTransport {
    fn endpoint(&self) -> String {
        "10.0.0.1:17444".to_string()
    }

    async fn invoke(&self, method: &str, params: &[Value]) -> Result<Value, CallFailure> {
        self.calls
            .lock()
            .unwrap()
            .push((method.to_string(), params.to_vec()));
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(CallFailure::Rejected(format!("unscripted call to {}", method))))
    }
}

#![allow(dead_code)]

//! Operation fakes and task shorthands for pipeline tests.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use pipedag::exec::{Operation, OperationFuture, async_operation, operation_fn};
use pipedag::pipeline::Task;
use pipedag::types::Value;
use serde_json::json;

/// Task with the given prerequisites and no retries, so failures are final
/// on the first attempt.
pub fn task(name: &str, op: Arc<dyn Operation>, after: &[&str]) -> Task {
    let mut builder = Task::builder(name, op).retries(0);
    for dep in after {
        builder = builder.after(*dep);
    }
    builder.build()
}

/// Always returns `value`.
pub fn succeed(value: Value) -> Arc<dyn Operation> {
    operation_fn(move |_| Ok(value.clone()))
}

/// Always fails with `message`.
pub fn fail(message: &str) -> Arc<dyn Operation> {
    let message = message.to_string();
    operation_fn(move |_| Err(anyhow!("{message}")))
}

/// Returns its input unchanged (`null` for root tasks).
pub fn echo_input() -> Arc<dyn Operation> {
    operation_fn(|input| Ok(input.unwrap_or(Value::Null)))
}

/// Sleeps for `delay` without blocking a runtime thread, then returns `value`.
pub fn sleepy(delay: Duration, value: Value) -> Arc<dyn Operation> {
    async_operation(move |_| {
        let value = value.clone();
        async move {
            tokio::time::sleep(delay).await;
            Ok::<_, anyhow::Error>(value)
        }
    })
}

/// Fails the first `failures` invocations, then succeeds with the number of
/// the successful call.
#[derive(Debug)]
pub struct FlakyOperation {
    failures: u32,
    calls: AtomicU32,
}

impl FlakyOperation {
    pub fn new(failures: u32) -> Arc<Self> {
        Arc::new(Self {
            failures,
            calls: AtomicU32::new(0),
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Operation for FlakyOperation {
    fn invoke(&self, _input: Option<Value>) -> OperationFuture<'_> {
        Box::pin(async move {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                Err(anyhow!("flaky failure #{call}"))
            } else {
                Ok(json!({ "succeeded_on_call": call }))
            }
        })
    }

    fn describe(&self) -> String {
        format!("flaky({})", self.failures)
    }
}

/// Tracks how many operations it handed out are running at once.
#[derive(Debug, Clone, Default)]
pub struct ConcurrencyProbe {
    current: Arc<AtomicUsize>,
    max: Arc<AtomicUsize>,
}

impl ConcurrencyProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Operation that counts itself as running for `hold`.
    pub fn operation(&self, hold: Duration) -> Arc<dyn Operation> {
        let probe = self.clone();
        async_operation(move |_| {
            let probe = probe.clone();
            async move {
                let now = probe.current.fetch_add(1, Ordering::SeqCst) + 1;
                probe.max.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(hold).await;
                probe.current.fetch_sub(1, Ordering::SeqCst);
                Ok::<_, anyhow::Error>(Value::Null)
            }
        })
    }

    pub fn max_observed(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }
}

/// Records the order in which its operations were invoked.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<String>>>,
}

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Operation that appends `name` to the log and returns it as a string.
    pub fn operation(&self, name: &str) -> Arc<dyn Operation> {
        let calls = self.calls.clone();
        let name = name.to_string();
        operation_fn(move |_| {
            calls
                .lock()
                .map_err(|_| anyhow!("call log poisoned"))?
                .push(name.clone());
            Ok(json!(name))
        })
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("call log poisoned").clone()
    }
}

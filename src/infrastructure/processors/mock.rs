//! Scripted payout processor for tests and dry runs.

use crate::domain::money::SellerId;
use crate::domain::payout::Payout;
use crate::domain::ports::{PayoutProcessor, ProcessorError, ProcessorOutcome};
use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// One scripted answer of the mock.
#[derive(Debug, Clone)]
pub enum MockResponse {
    Success(String),
    Failure(String),
    Error(ProcessorError),
}

#[derive(Debug)]
struct MockState {
    name: String,
    script: Mutex<VecDeque<MockResponse>>,
    fallback: MockResponse,
    submitted: Mutex<Vec<Payout>>,
    not_onboarded: Mutex<HashSet<SellerId>>,
    delay: Option<Duration>,
}

/// Processor that replays scripted responses and records every submission.
///
/// Clones share state, so a test can keep one handle while the registry owns
/// another.
#[derive(Debug, Clone)]
pub struct MockProcessor {
    state: Arc<MockState>,
}

impl MockProcessor {
    /// A mock named `name` that succeeds unless scripted otherwise.
    pub fn new(name: &str) -> Self {
        Self::with_fallback(name, MockResponse::Success(format!("{name}-payout")))
    }

    fn with_fallback(name: &str, fallback: MockResponse) -> Self {
        Self {
            state: Arc::new(MockState {
                name: name.to_string(),
                script: Mutex::new(VecDeque::new()),
                fallback,
                submitted: Mutex::new(Vec::new()),
                not_onboarded: Mutex::new(HashSet::new()),
                delay: None,
            }),
        }
    }

    /// A mock that fails every submission with `reason`.
    pub fn failing(name: &str, reason: &str) -> Self {
        Self::with_fallback(name, MockResponse::Failure(reason.to_string()))
    }

    /// A mock that errors on every submission.
    pub fn erroring(name: &str, error: ProcessorError) -> Self {
        Self::with_fallback(name, MockResponse::Error(error))
    }

    /// Sleeps before answering; must be called before the mock is cloned.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        if let Some(state) = Arc::get_mut(&mut self.state) {
            state.delay = Some(delay);
        }
        self
    }

    /// Queues a response used for the next submission ahead of the fallback.
    pub fn push_response(&self, response: MockResponse) {
        lock(&self.state.script).push_back(response);
    }

    pub fn mark_not_onboarded(&self, seller: SellerId) {
        lock(&self.state.not_onboarded).insert(seller);
    }

    pub fn calls(&self) -> usize {
        lock(&self.state.submitted).len()
    }

    pub fn submitted(&self) -> Vec<Payout> {
        lock(&self.state.submitted).clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl PayoutProcessor for MockProcessor {
    fn name(&self) -> &str {
        &self.state.name
    }

    async fn submit(&self, payout: &Payout) -> Result<ProcessorOutcome, ProcessorError> {
        lock(&self.state.submitted).push(payout.clone());
        let response = lock(&self.state.script)
            .pop_front()
            .unwrap_or_else(|| self.state.fallback.clone());

        if let Some(delay) = self.state.delay {
            tokio::time::sleep(delay).await;
        }

        match response {
            MockResponse::Success(external_id) => Ok(ProcessorOutcome::Success { external_id }),
            MockResponse::Failure(reason) => Ok(ProcessorOutcome::Failure { reason }),
            MockResponse::Error(err) => Err(err),
        }
    }

    async fn is_seller_onboarded(&self, seller: SellerId) -> Result<bool, ProcessorError> {
        Ok(!lock(&self.state.not_onboarded).contains(&seller))
    }
}

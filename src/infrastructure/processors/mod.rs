//! Payout processor drivers.

use crate::application::registry::ProcessorRegistry;
use crate::config::LedgerConfig;
use crate::domain::payout::Payout;
use crate::domain::ports::{PayoutProcessor, ProcessorError, ProcessorOutcome};
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

pub mod http;
pub mod mock;

pub use http::HttpPayoutProcessor;
pub use mock::MockProcessor;

/// Driver used when no processor is configured. Every payout fails and is refunded.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledProcessor;

#[async_trait]
impl PayoutProcessor for DisabledProcessor {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn submit(&self, _payout: &Payout) -> Result<ProcessorOutcome, ProcessorError> {
        Ok(ProcessorOutcome::Failure {
            reason: "payout processing is disabled".to_string(),
        })
    }
}

/// Driver for payouts an operator settles outside the platform (bank transfer,
/// cheque). Submission always succeeds with a generated reference.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManualProcessor;

impl ManualProcessor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PayoutProcessor for ManualProcessor {
    fn name(&self) -> &str {
        "manual"
    }

    async fn submit(&self, _payout: &Payout) -> Result<ProcessorOutcome, ProcessorError> {
        Ok(ProcessorOutcome::Success {
            external_id: format!("manual-{}", Uuid::new_v4()),
        })
    }
}

/// Builds the registry for the configured drivers. `disabled` is the fallback;
/// `manual` is always available; `http` is added when an endpoint is configured.
pub fn registry_from_config(config: &LedgerConfig) -> ProcessorRegistry {
    let mut registry = ProcessorRegistry::new(Arc::new(DisabledProcessor))
        .register(Arc::new(ManualProcessor::new()));
    if let Some(endpoint) = &config.http_endpoint {
        registry = registry.register(Arc::new(HttpPayoutProcessor::new(
            endpoint.clone(),
            config.processor_timeout,
        )));
    }
    registry
}

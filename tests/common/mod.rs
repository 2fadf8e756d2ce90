#![allow(dead_code)]

use payout_ledger::application::commissions::CommissionCrediting;
use payout_ledger::application::ledger::BalanceLedger;
use payout_ledger::application::payouts::PayoutLifecycle;
use payout_ledger::application::registry::ProcessorRegistry;
use payout_ledger::config::LedgerConfig;
use payout_ledger::domain::commission::{Order, OrderItem, OrderStatus};
use payout_ledger::domain::money::{Money, SellerId};
use payout_ledger::domain::ports::{PayoutProcessor, SharedCommissionStore};
use payout_ledger::infrastructure::events::RecordingEventSink;
use payout_ledger::infrastructure::in_memory::{
    InMemoryBalanceStore, InMemoryCommissionStore, InMemoryPayoutStore,
};
use payout_ledger::infrastructure::processors::DisabledProcessor;
use payout_ledger::infrastructure::processors::mock::MockProcessor;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;

/// Everything a payout test touches, wired over in-memory stores.
pub struct Harness {
    pub ledger: Arc<BalanceLedger>,
    pub payouts: PayoutLifecycle,
    pub crediting: CommissionCrediting,
    pub commissions: SharedCommissionStore,
    /// Same storage `payouts` writes to, for arranging states directly.
    pub payout_store: InMemoryPayoutStore,
    pub events: RecordingEventSink,
    pub mock: MockProcessor,
}

pub fn test_config() -> LedgerConfig {
    LedgerConfig {
        minimum_payout: Money::from_minor(1_000),
        maximum_payout: Money::from_minor(1_000_000),
        default_method: "mock".to_string(),
        onboarding_required: Vec::new(),
        processor_timeout: Duration::from_secs(5),
        http_endpoint: None,
    }
}

impl Harness {
    pub fn new() -> Self {
        Self::with(MockProcessor::new("mock"), test_config())
    }

    pub fn with_mock(mock: MockProcessor) -> Self {
        Self::with(mock, test_config())
    }

    pub fn with(mock: MockProcessor, config: LedgerConfig) -> Self {
        Self::with_processor(mock.clone(), Arc::new(mock), config)
    }

    /// Registers `processor` next to the mock; `mock` is kept for inspection.
    pub fn with_processor(
        mock: MockProcessor,
        processor: Arc<dyn PayoutProcessor>,
        config: LedgerConfig,
    ) -> Self {
        let ledger = Arc::new(BalanceLedger::new(Box::new(InMemoryBalanceStore::new())));
        let commissions: SharedCommissionStore = Arc::new(InMemoryCommissionStore::new());
        let payout_store = InMemoryPayoutStore::new();
        let events = RecordingEventSink::new();
        let registry = ProcessorRegistry::new(Arc::new(DisabledProcessor)).register(processor);

        let payouts = PayoutLifecycle::new(
            Arc::clone(&ledger),
            Box::new(payout_store.clone()),
            Arc::clone(&commissions),
            registry,
            Box::new(events.clone()),
            config,
        );
        let crediting = CommissionCrediting::new(
            Arc::clone(&ledger),
            Arc::clone(&commissions),
            Box::new(events.clone()),
        );

        Self {
            ledger,
            payouts,
            crediting,
            commissions,
            payout_store,
            events,
            mock,
        }
    }

    /// Gives the seller a starting balance through a manual credit.
    pub async fn fund(&self, seller: u32, minor: i64) {
        self.ledger
            .credit(SellerId(seller), Money::from_minor(minor), "manual_adjustment", None)
            .await
            .unwrap();
    }

    pub async fn balance(&self, seller: u32) -> Money {
        self.ledger.balance(SellerId(seller)).await.unwrap()
    }
}

pub fn cents(minor: i64) -> Money {
    Money::from_minor(minor)
}

/// A succeeded order whose items all pay commission to `seller`.
pub fn order(reference: &str, seller: u32, items: &[(i64, Decimal)]) -> Order {
    Order {
        reference: reference.to_string(),
        status: OrderStatus::Succeeded,
        items: items
            .iter()
            .enumerate()
            .map(|(n, (minor, rate))| OrderItem {
                id: format!("{reference}-{}", n + 1),
                product: format!("product {}", n + 1),
                amount: Money::from_minor(*minor),
                commission_recipient: Some(SellerId(seller)),
                commission_rate: Some(*rate),
            })
            .collect(),
    }
}

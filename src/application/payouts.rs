use super::ledger::BalanceLedger;
use super::registry::ProcessorRegistry;
use crate::config::LedgerConfig;
use crate::domain::commission::CommissionStatus;
use crate::domain::events::LedgerEvent;
use crate::domain::ledger::{PAYOUT_EXCEPTION_REFUND, PAYOUT_FAILED_REFUND};
use crate::domain::money::{ActorId, Money, SellerId};
use crate::domain::payout::{NewPayout, Payout, PayoutId, PayoutStatus};
use crate::domain::ports::{
    EventSinkBox, PayoutStoreBox, ProcessorError, ProcessorOutcome, SharedCommissionStore,
};
use crate::error::{LedgerError, Result};
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Drives payouts through `Pending -> Processing -> Completed | Failed`, with
/// `Cancelled` reachable from `Pending` and `retry` leading from `Failed` back to
/// `Pending`.
///
/// The processor is always called between two ledger transactions, never inside one,
/// so a slow processor cannot hold a seller's balance lock.
///
/// Processing runs on its own task: a caller that stops waiting does not stop the
/// payout from reaching `Completed` or `Failed`.
#[derive(Clone)]
pub struct PayoutLifecycle {
    inner: Arc<Lifecycle>,
}

struct Lifecycle {
    ledger: Arc<BalanceLedger>,
    payouts: PayoutStoreBox,
    commissions: SharedCommissionStore,
    processors: ProcessorRegistry,
    events: EventSinkBox,
    config: LedgerConfig,
}

impl PayoutLifecycle {
    pub fn new(
        ledger: Arc<BalanceLedger>,
        payouts: PayoutStoreBox,
        commissions: SharedCommissionStore,
        processors: ProcessorRegistry,
        events: EventSinkBox,
        config: LedgerConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Lifecycle {
                ledger,
                payouts,
                commissions,
                processors,
                events,
                config,
            }),
        }
    }

    /// Records a payout request in `Pending`.
    ///
    /// The balance check here only spares the seller a request that cannot succeed;
    /// `process` re-checks under the seller's lock.
    pub async fn create(
        &self,
        seller: SellerId,
        amount: Money,
        method: Option<&str>,
        notes: Option<String>,
    ) -> Result<Payout> {
        self.inner.create(seller, amount, method, notes).await
    }

    /// Debits the seller, submits the payout and settles it.
    ///
    /// Returns `Ok(true)` when the processor confirmed the payout and `Ok(false)`
    /// when it ended `Failed`; in the latter case the seller's balance is what it
    /// was before the call. Only misuse (`InvalidState`) and storage faults are
    /// returned as errors.
    pub async fn process(&self, id: PayoutId, actor: Option<ActorId>) -> Result<bool> {
        let inner = Arc::clone(&self.inner);
        detached(async move { inner.process(id, actor).await }).await
    }

    /// Cancels a payout that has not started processing. The ledger is not touched
    /// because nothing was debited yet.
    pub async fn cancel(&self, id: PayoutId, reason: Option<&str>) -> Result<bool> {
        self.inner.cancel(id, reason).await
    }

    /// Moves a failed payout back to `Pending` and processes it again.
    pub async fn retry(&self, id: PayoutId, actor: Option<ActorId>) -> Result<bool> {
        let inner = Arc::clone(&self.inner);
        detached(async move { inner.retry(id, actor).await }).await
    }

    /// Fails every payout left in `Processing` by a run that stopped before
    /// settling it, refunding whatever its deduction still holds back.
    ///
    /// Must run before this instance serves any `process` or `retry` call; a payout
    /// being processed concurrently would look interrupted. Returns the number of
    /// payouts recovered.
    pub async fn recover_interrupted(&self) -> Result<usize> {
        self.inner.recover_interrupted().await
    }

    pub async fn get(&self, id: PayoutId) -> Result<Payout> {
        self.inner.get(id).await
    }

    pub async fn list_for_seller(&self, seller: SellerId) -> Result<Vec<Payout>> {
        self.inner.payouts.for_seller(seller).await
    }

    pub async fn all(&self) -> Result<Vec<Payout>> {
        self.inner.payouts.all().await
    }
}

/// Runs `work` on its own task so that dropping the returned future does not
/// abandon it halfway.
async fn detached<F>(work: F) -> Result<bool>
where
    F: Future<Output = Result<bool>> + Send + 'static,
{
    match tokio::spawn(work).await {
        Ok(result) => result,
        Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
        Err(err) => Err(LedgerError::Storage(Box::new(err))),
    }
}

impl Lifecycle {
    async fn create(
        &self,
        seller: SellerId,
        amount: Money,
        method: Option<&str>,
        notes: Option<String>,
    ) -> Result<Payout> {
        let (min, max) = (self.config.minimum_payout, self.config.maximum_payout);
        if amount < min || amount > max {
            return Err(LedgerError::ValidationError(format!(
                "Payout amount {amount} must be between {min} and {max}"
            )));
        }

        let method = method
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(&self.config.default_method);
        let processor = self.processors.get(method).ok_or_else(|| {
            LedgerError::ValidationError(format!("Unknown payout method: {method}"))
        })?;

        let available = self.ledger.balance(seller).await?;
        if available < amount {
            return Err(LedgerError::InsufficientBalance {
                seller,
                requested: amount,
                available,
            });
        }

        if self.config.requires_onboarding(processor.name()) {
            if !processor.is_seller_onboarded(seller).await? {
                return Err(LedgerError::ValidationError(format!(
                    "Seller {seller} has not completed payout onboarding for {}",
                    processor.name()
                )));
            }
        }

        let payout = self
            .payouts
            .insert(NewPayout {
                seller,
                amount,
                method: method.to_string(),
                notes,
            })
            .await?;

        info!(
            payout = %payout.id,
            seller = %seller,
            amount = %amount,
            method = %payout.method,
            "payout requested"
        );
        self.events
            .publish(LedgerEvent::PayoutCreated(payout.clone()))
            .await;
        Ok(payout)
    }

    async fn process(&self, id: PayoutId, actor: Option<ActorId>) -> Result<bool> {
        let mut payout = self.get(id).await?;
        if !payout.status.can_transition_to(PayoutStatus::Processing) {
            return Err(invalid_state(&payout, "processed"));
        }

        payout.status = PayoutStatus::Processing;
        payout.attempts += 1;
        if !self
            .payouts
            .compare_and_swap(PayoutStatus::Pending, &payout)
            .await?
        {
            return Err(self.current_state_error(id, "processed").await);
        }

        match self.ledger.debit_for_payout(&payout, actor).await {
            Ok(_) => {}
            Err(err @ LedgerError::InsufficientBalance { .. }) => {
                // Nothing was debited, so there is nothing to refund.
                self.mark_failed(payout, err.to_string()).await?;
                return Ok(false);
            }
            Err(err) => {
                payout.status = PayoutStatus::Pending;
                payout.attempts -= 1;
                self.payouts
                    .compare_and_swap(PayoutStatus::Processing, &payout)
                    .await?;
                return Err(err);
            }
        }

        let processor = self.processors.resolve(&payout.method);
        debug!(
            payout = %payout.id,
            processor = processor.name(),
            key = %payout.idempotency_key(),
            "submitting payout"
        );
        let timeout = self.config.processor_timeout;
        let outcome = match tokio::time::timeout(timeout, processor.submit(&payout)).await {
            Ok(result) => result,
            Err(_) => Err(ProcessorError::Timeout(timeout)),
        };

        match outcome {
            Ok(ProcessorOutcome::Success { external_id }) => {
                self.complete(payout, external_id, actor).await?;
                Ok(true)
            }
            Ok(ProcessorOutcome::Failure { reason }) => {
                self.compensate(payout, reason, PAYOUT_FAILED_REFUND, actor)
                    .await?;
                Ok(false)
            }
            Err(err) => {
                self.compensate(payout, err.to_string(), PAYOUT_EXCEPTION_REFUND, actor)
                    .await?;
                Ok(false)
            }
        }
    }

    async fn cancel(&self, id: PayoutId, reason: Option<&str>) -> Result<bool> {
        let mut payout = self.get(id).await?;
        if !payout.status.can_transition_to(PayoutStatus::Cancelled) {
            return Err(invalid_state(&payout, "cancelled"));
        }

        match reason.map(str::trim).filter(|r| !r.is_empty()) {
            Some(reason) => payout.append_note(&format!("Cancelled: {reason}")),
            None => payout.append_note("Cancelled"),
        }
        payout.status = PayoutStatus::Cancelled;
        if !self
            .payouts
            .compare_and_swap(PayoutStatus::Pending, &payout)
            .await?
        {
            return Err(self.current_state_error(id, "cancelled").await);
        }

        info!(payout = %payout.id, seller = %payout.seller, "payout cancelled");
        self.events
            .publish(LedgerEvent::PayoutCancelled(payout))
            .await;
        Ok(true)
    }

    async fn retry(&self, id: PayoutId, actor: Option<ActorId>) -> Result<bool> {
        let mut payout = self.get(id).await?;
        if !payout.status.can_transition_to(PayoutStatus::Pending) {
            return Err(invalid_state(&payout, "retried"));
        }

        payout.status = PayoutStatus::Pending;
        payout.failure_reason = None;
        payout.processed_at = None;
        payout.processed_by = None;
        if !self
            .payouts
            .compare_and_swap(PayoutStatus::Failed, &payout)
            .await?
        {
            return Err(self.current_state_error(id, "retried").await);
        }

        info!(payout = %payout.id, attempt = payout.attempts + 1, "retrying payout");
        self.process(id, actor).await
    }

    async fn recover_interrupted(&self) -> Result<usize> {
        let stuck: Vec<Payout> = self
            .payouts
            .all()
            .await?
            .into_iter()
            .filter(|p| p.status == PayoutStatus::Processing)
            .collect();

        for payout in &stuck {
            let outstanding = self.ledger.outstanding_for_payout(payout).await?;
            let reason = "processing was interrupted before its outcome was recorded".to_string();
            if outstanding.is_positive() {
                warn!(
                    payout = %payout.id,
                    seller = %payout.seller,
                    amount = %outstanding,
                    "refunding interrupted payout"
                );
                self.refund(payout.clone(), outstanding, reason, PAYOUT_EXCEPTION_REFUND, None)
                    .await?;
            } else {
                self.mark_failed(payout.clone(), reason).await?;
            }
        }
        Ok(stuck.len())
    }

    async fn get(&self, id: PayoutId) -> Result<Payout> {
        self.payouts
            .get(id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("payout {id}")))
    }

    async fn complete(
        &self,
        mut payout: Payout,
        external_id: String,
        actor: Option<ActorId>,
    ) -> Result<()> {
        payout.status = PayoutStatus::Completed;
        payout.external_id = Some(external_id);
        payout.failure_reason = None;
        payout.processed_at = Some(Utc::now());
        payout.processed_by = actor;
        if let Err(err) = self.settle(&payout).await {
            // The processor already moved the money; refunding here would pay twice.
            error!(
                payout = %payout.id,
                error = %err,
                "payout disbursed but its completion could not be recorded"
            );
            return Err(err);
        }

        info!(
            payout = %payout.id,
            seller = %payout.seller,
            amount = %payout.amount,
            external_id = payout.external_id.as_deref().unwrap_or_default(),
            "payout completed"
        );
        self.link_commissions(&payout).await;
        self.events
            .publish(LedgerEvent::PayoutProcessed(payout))
            .await;
        Ok(())
    }

    /// Refunds the debit taken by `process`, then marks the payout failed.
    async fn compensate(
        &self,
        payout: Payout,
        reason: String,
        refund_reason: &str,
        actor: Option<ActorId>,
    ) -> Result<()> {
        let amount = payout.amount;
        self.refund(payout, amount, reason, refund_reason, actor)
            .await
    }

    async fn refund(
        &self,
        payout: Payout,
        amount: Money,
        reason: String,
        refund_reason: &str,
        actor: Option<ActorId>,
    ) -> Result<()> {
        let failure_reason = match self
            .ledger
            .refund_payout(&payout, amount, refund_reason, actor)
            .await
        {
            Ok(_) => reason,
            Err(err) => {
                error!(
                    payout = %payout.id,
                    seller = %payout.seller,
                    amount = %amount,
                    error = %err,
                    "compensating credit failed; seller balance needs manual correction"
                );
                format!("{reason} (refund failed: {err})")
            }
        };
        self.mark_failed(payout, failure_reason).await
    }

    async fn mark_failed(&self, mut payout: Payout, reason: String) -> Result<()> {
        payout.status = PayoutStatus::Failed;
        payout.failure_reason = Some(reason);
        self.settle(&payout).await?;

        warn!(
            payout = %payout.id,
            seller = %payout.seller,
            reason = payout.failure_reason.as_deref().unwrap_or_default(),
            "payout failed"
        );
        self.events.publish(LedgerEvent::PayoutFailed(payout)).await;
        Ok(())
    }

    /// Writes the final state of a payout that is still `Processing`.
    async fn settle(&self, payout: &Payout) -> Result<()> {
        if self
            .payouts
            .compare_and_swap(PayoutStatus::Processing, payout)
            .await?
        {
            Ok(())
        } else {
            Err(LedgerError::Storage(
                format!("payout {} left Processing while being settled", payout.id).into(),
            ))
        }
    }

    /// Attaches the seller's undisbursed commissions, oldest first, to a completed
    /// payout for as long as they fit in its amount.
    async fn link_commissions(&self, payout: &Payout) {
        let commissions = match self.commissions.for_seller(payout.seller).await {
            Ok(commissions) => commissions,
            Err(err) => {
                warn!(payout = %payout.id, error = %err, "could not load commissions to link");
                return;
            }
        };

        let mut remaining = payout.amount;
        let mut covered = Vec::new();
        for commission in commissions
            .into_iter()
            .filter(|c| c.status == CommissionStatus::Credited)
        {
            if commission.amount > remaining {
                break;
            }
            remaining -= commission.amount;
            covered.push(commission.order_item_id);
        }
        if covered.is_empty() {
            return;
        }

        if let Err(err) = self.commissions.mark_disbursed(&covered, payout.id).await {
            warn!(payout = %payout.id, error = %err, "could not link commissions to payout");
        } else {
            debug!(payout = %payout.id, count = covered.len(), "commissions linked to payout");
        }
    }

    async fn current_state_error(&self, id: PayoutId, operation: &'static str) -> LedgerError {
        match self.get(id).await {
            Ok(payout) => invalid_state(&payout, operation),
            Err(err) => err,
        }
    }
}

fn invalid_state(payout: &Payout, operation: &'static str) -> LedgerError {
    LedgerError::InvalidState {
        payout: payout.id,
        status: payout.status,
        operation,
    }
}

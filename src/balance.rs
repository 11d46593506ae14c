use crate::{
    errors::RemoteError,
    game::Completion,
    identity::Delegation,
    ledger::LedgerService,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{
    debug,
    warn,
};

/// Last balance read from the ledger. `None` until the first query lands.
pub struct BalanceCache<L> {
    ledger: Arc<L>,
    completions: mpsc::UnboundedSender<Completion>,
    value: Option<u64>,
    requested: u64,
}

impl<L: LedgerService> BalanceCache<L> {
    pub fn new(ledger: Arc<L>, completions: mpsc::UnboundedSender<Completion>) -> Self {
        Self {
            ledger,
            completions,
            value: None,
            requested: 0,
        }
    }

    pub fn get(&self) -> Option<u64> {
        self.value
    }

    /// Number of refreshes issued so far.
    pub fn refreshes_requested(&self) -> u64 {
        self.requested
    }

    /// Issues a query call in the background. The answer arrives later as
    /// `Completion::BalanceLoaded` and is applied with [`Self::store`].
    pub fn refresh(&mut self, caller: &Delegation) {
        self.requested += 1;
        debug!(refresh = self.requested, "requesting balance");
        let ledger = Arc::clone(&self.ledger);
        let caller = caller.clone();
        let tx = self.completions.clone();
        tokio::spawn(async move {
            let outcome = ledger.get_balance(&caller).await;
            let _ = tx.send(Completion::BalanceLoaded { outcome });
        });
    }

    pub fn store(&mut self, outcome: Result<u64, RemoteError>) {
        match outcome {
            Ok(balance) => {
                debug!(balance, "balance refreshed");
                self.value = Some(balance);
            }
            Err(err) => warn!(error = %err, "balance refresh failed; keeping cached value"),
        }
    }

    /// Forgets the cached value, e.g. after logout.
    pub fn reset(&mut self) {
        self.value = None;
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::test_helpers::{
        FakeLedger,
        arb_delegation,
    };

    fn cache_with(
        ledger: FakeLedger,
    ) -> (
        BalanceCache<FakeLedger>,
        mpsc::UnboundedReceiver<Completion>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        (BalanceCache::new(Arc::new(ledger), tx), rx)
    }

    #[tokio::test]
    async fn get__before_refresh__is_unloaded() {
        let (cache, _rx) = cache_with(FakeLedger::with_balance(100));

        assert_eq!(None, cache.get());
    }

    #[tokio::test]
    async fn refresh__replaces_cached_value_wholesale() {
        // given
        let ledger = FakeLedger::with_balance(100);
        let (mut cache, mut rx) = cache_with(ledger.clone());
        cache.store(Ok(7));

        // when
        cache.refresh(&arb_delegation("2vxsx-fae"));
        let Some(Completion::BalanceLoaded { outcome }) = rx.recv().await else {
            panic!("expected a balance completion");
        };
        cache.store(outcome);

        // then
        assert_eq!(Some(100), cache.get());
        assert_eq!(1, cache.refreshes_requested());
        assert_eq!(1, ledger.balance_calls());
    }

    #[tokio::test]
    async fn store__failure__keeps_previous_value() {
        // given
        let (mut cache, _rx) = cache_with(FakeLedger::with_balance(100));
        cache.store(Ok(42));

        // when
        cache.store(Err(RemoteError::Transport("timeout".to_string())));

        // then
        assert_eq!(Some(42), cache.get());
    }
}

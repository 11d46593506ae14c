use crate::{
    balance::BalanceCache,
    errors::RemoteError,
    game::Completion,
    identity::Delegation,
    ledger::LedgerService,
};
use std::{
    fmt,
    sync::Arc,
    time::Duration,
};
use thiserror::Error;
use tokio::{
    sync::mpsc,
    time,
};
use tracing::{
    debug,
    info,
    warn,
};

/// How long the coin animation runs after every submit.
pub const FLIP_DURATION: Duration = Duration::from_millis(3000);
pub const DEFAULT_BET: u64 = 10;
const WIN_MARKER: &str = "Heads";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WagerState {
    #[default]
    Idle,
    Flipping,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WagerId(u64);

impl fmt::Display for WagerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Win,
    Loss,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlipResult {
    pub message: String,
    pub outcome: Outcome,
}

impl FlipResult {
    /// Any response mentioning "Heads" is a win; everything else is a loss.
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let outcome = if message.contains(WIN_MARKER) {
            Outcome::Win
        } else {
            Outcome::Loss
        };
        Self { message, outcome }
    }
}

/// Why the FLIP control is disabled.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum BetRejected {
    #[error("balance not loaded yet")]
    NotLoaded,
    #[error("no tokens left to bet")]
    EmptyBalance,
    #[error("bet must be at least 1")]
    BelowMinimum,
    #[error("bet of {bet} exceeds balance of {balance}")]
    ExceedsBalance { bet: u64, balance: u64 },
    #[error("a flip is still waiting for the ledger")]
    CallOutstanding,
}

/// Client-side check run before a submit. Advisory only: the ledger remains
/// the final arbiter for anything that slips past it.
pub struct WagerGate;

impl WagerGate {
    pub fn check(
        bet: u64,
        balance: Option<u64>,
        call_outstanding: bool,
    ) -> Result<(), BetRejected> {
        let balance = balance.ok_or(BetRejected::NotLoaded)?;
        if call_outstanding {
            return Err(BetRejected::CallOutstanding);
        }
        if balance == 0 {
            return Err(BetRejected::EmptyBalance);
        }
        if bet < 1 {
            return Err(BetRejected::BelowMinimum);
        }
        if bet > balance {
            return Err(BetRejected::ExceedsBalance { bet, balance });
        }
        Ok(())
    }
}

/// How a settled wager call was reconciled.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Settlement {
    Resolved(FlipResult),
    Failed(RemoteError),
}

/// Drives the flip animation and the update call for each wager.
///
/// The timer and the call are started together but never joined: the state
/// returns to `Idle` when the timer fires, whatever the call is doing.
pub struct WagerController<L> {
    ledger: Arc<L>,
    completions: mpsc::UnboundedSender<Completion>,
    state: WagerState,
    result: Option<FlipResult>,
    next_id: u64,
    outstanding: usize,
}

impl<L: LedgerService> WagerController<L> {
    pub fn new(ledger: Arc<L>, completions: mpsc::UnboundedSender<Completion>) -> Self {
        Self {
            ledger,
            completions,
            state: WagerState::Idle,
            result: None,
            next_id: 0,
            outstanding: 0,
        }
    }

    pub fn state(&self) -> WagerState {
        self.state
    }

    pub fn result(&self) -> Option<&FlipResult> {
        self.result.as_ref()
    }

    /// True while at least one update call has not settled.
    pub fn call_outstanding(&self) -> bool {
        self.outstanding > 0
    }

    /// Starts a wager. Does not validate `bet_amount`; see [`WagerGate`].
    pub fn submit(&mut self, caller: &Delegation, bet_amount: u64) -> WagerId {
        self.next_id += 1;
        let id = WagerId(self.next_id);
        if self.state == WagerState::Flipping {
            warn!(wager = %id, "submitting while a previous flip is still animating");
        }
        self.state = WagerState::Flipping;
        self.outstanding += 1;
        info!(wager = %id, bet = bet_amount, "flipping coin");

        let tx = self.completions.clone();
        tokio::spawn(async move {
            time::sleep(FLIP_DURATION).await;
            let _ = tx.send(Completion::TimerElapsed { wager: id });
        });

        let ledger = Arc::clone(&self.ledger);
        let caller = caller.clone();
        let tx = self.completions.clone();
        tokio::spawn(async move {
            let outcome = ledger.flip_coin(&caller, bet_amount).await;
            let _ = tx.send(Completion::WagerSettled { wager: id, outcome });
        });

        id
    }

    pub fn on_timer_elapsed(&mut self, wager: WagerId) {
        debug!(%wager, "flip animation finished");
        self.state = WagerState::Idle;
    }

    /// Applies the answer of an update call. A success replaces the result
    /// and asks the balance cache for exactly one refresh; a failure leaves
    /// both alone.
    pub fn on_settled(
        &mut self,
        wager: WagerId,
        outcome: Result<String, RemoteError>,
        balance: &mut BalanceCache<L>,
        caller: Option<&Delegation>,
    ) -> Settlement {
        self.outstanding = self.outstanding.saturating_sub(1);
        match outcome {
            Ok(message) => {
                let result = FlipResult::classify(message);
                info!(%wager, outcome = ?result.outcome, message = %result.message, "flip settled");
                self.result = Some(result.clone());
                match caller {
                    Some(caller) => balance.refresh(caller),
                    None => warn!(%wager, "session ended before settlement; skipping balance refresh"),
                }
                Settlement::Resolved(result)
            }
            Err(err) => {
                debug!(%wager, "flip call failed");
                Settlement::Failed(err)
            }
        }
    }

    /// Drops the last result, e.g. after logout.
    pub fn reset(&mut self) {
        self.result = None;
    }
}

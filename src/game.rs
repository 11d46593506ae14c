use crate::{
    balance::BalanceCache,
    errors::{
        ErrorSurface,
        GameError,
        RemoteError,
    },
    identity::IdentityProvider,
    ledger::LedgerService,
    session::SessionManager,
    wager::{
        BetRejected,
        FlipResult,
        Settlement,
        WagerController,
        WagerGate,
        WagerId,
        WagerState,
    },
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;


/// Result of one background operation, delivered back to the event loop.
#[derive(Debug)]
pub enum Completion {
    TimerElapsed {
        wager: WagerId,
    },
    WagerSettled {
        wager: WagerId,
        outcome: Result<String, RemoteError>,
    },
    BalanceLoaded {
        outcome: Result<u64, RemoteError>,
    },
}

/// Everything the screen needs, captured at one point in time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GameView {
    pub is_authenticated: bool,
    pub principal: Option<String>,
    pub balance: Option<u64>,
    pub bet: u64,
    pub flipping: bool,
    pub call_outstanding: bool,
    pub flip_allowed: Result<(), BetRejected>,
    pub result: Option<FlipResult>,
    pub error: Option<String>,
}

impl GameView {
    pub fn balance_text(&self) -> String {
        match self.balance {
            Some(balance) => balance.to_string(),
            None => String::from("Loading..."),
        }
    }
}

/// Session, balance, wager and error state for one client, plus the channel
/// their background operations report into.
pub struct GameContext<P, L> {
    session: SessionManager<P>,
    balance: BalanceCache<L>,
    wager: WagerController<L>,
    errors: ErrorSurface,
    bet: u64,
    completions: mpsc::UnboundedReceiver<Completion>,
}

impl<P: IdentityProvider, L: LedgerService> GameContext<P, L> {
    pub async fn init(
        provider: P,
        identity_provider_url: impl Into<String>,
        ledger: L,
        initial_bet: u64,
    ) -> Self {
        let ledger = Arc::new(ledger);
        let (tx, completions) = mpsc::unbounded_channel();
        let session = SessionManager::init(provider, identity_provider_url).await;
        let mut game = Self {
            session,
            balance: BalanceCache::new(Arc::clone(&ledger), tx.clone()),
            wager: WagerController::new(ledger, tx),
            errors: ErrorSurface::default(),
            bet: initial_bet,
            completions,
        };
        if let Some(caller) = game.session.identity() {
            game.balance.refresh(caller);
        }
        game
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_authenticated()
    }

    pub fn is_flipping(&self) -> bool {
        self.wager.state() == WagerState::Flipping
    }

    pub fn wager_state(&self) -> WagerState {
        self.wager.state()
    }

    pub fn balance(&self) -> &BalanceCache<L> {
        &self.balance
    }

    pub fn errors(&self) -> &ErrorSurface {
        &self.errors
    }

    /// Most recent flip result, whether or not it is currently displayed.
    pub fn last_result(&self) -> Option<&FlipResult> {
        self.wager.result()
    }

    pub fn bet(&self) -> u64 {
        self.bet
    }

    pub fn set_bet(&mut self, bet: u64) {
        self.bet = bet;
    }

    pub async fn login(&mut self) -> Result<(), GameError> {
        match self.session.login().await {
            Ok(caller) => {
                self.balance.refresh(caller);
                self.errors.clear();
                Ok(())
            }
            Err(err) => {
                let err = GameError::AuthFailure(err);
                self.errors.present(err.clone());
                Err(err)
            }
        }
    }

    pub async fn logout(&mut self) {
        if !self.session.is_authenticated() {
            return;
        }
        self.session.logout().await;
        self.balance.reset();
        self.wager.reset();
        self.errors.clear();
    }

    pub fn refresh_balance(&mut self) -> Result<(), GameError> {
        let caller = self.session.identity().ok_or(GameError::NotAuthenticated)?;
        self.balance.refresh(caller);
        Ok(())
    }

    /// Whether the FLIP control should be enabled for the current bet.
    pub fn gate(&self) -> Result<(), BetRejected> {
        WagerGate::check(self.bet, self.balance.get(), self.wager.call_outstanding())
    }

    /// Submits the current bet if the client-side gate allows it. A rejected
    /// bet issues no remote call.
    pub fn flip(&mut self) -> Result<WagerId, FlipRefused> {
        self.gate().map_err(FlipRefused::Gate)?;
        self.flip_unchecked().map_err(FlipRefused::Game)
    }

    /// Submits the current bet without consulting the gate; the ledger
    /// decides whether the bet is acceptable.
    pub fn flip_unchecked(&mut self) -> Result<WagerId, GameError> {
        let caller = self.session.identity().ok_or(GameError::NotAuthenticated)?;
        Ok(self.wager.submit(caller, self.bet))
    }

    /// Waits for the next background operation to finish.
    pub async fn next_completion(&mut self) -> Option<Completion> {
        self.completions.recv().await
    }

    pub fn apply(&mut self, completion: Completion) {
        match completion {
            Completion::TimerElapsed { wager } => self.wager.on_timer_elapsed(wager),
            Completion::WagerSettled { wager, outcome } => {
                let settlement = self.wager.on_settled(
                    wager,
                    outcome,
                    &mut self.balance,
                    self.session.identity(),
                );
                match settlement {
                    Settlement::Resolved(_) => self.errors.clear(),
                    Settlement::Failed(err) => {
                        self.errors.present(GameError::CallFailure(err))
                    }
                }
            }
            Completion::BalanceLoaded { outcome } => {
                if self.session.is_authenticated() {
                    self.balance.store(outcome);
                } else {
                    info!("dropping balance that arrived after logout");
                }
            }
        }
    }

    pub fn view(&self) -> GameView {
        let flipping = self.is_flipping();
        let error = self.errors.current().map(ToString::to_string);
        // An error on the surface is always newer than the stored result.
        let result = if flipping || error.is_some() {
            None
        } else {
            self.wager.result().cloned()
        };
        GameView {
            is_authenticated: self.session.is_authenticated(),
            principal: self.session.identity().map(|d| d.principal.clone()),
            balance: self.balance.get(),
            bet: self.bet,
            flipping,
            call_outstanding: self.wager.call_outstanding(),
            flip_allowed: self.gate(),
            result,
            error,
        }
    }
}

/// Why [`GameContext::flip`] did not start a wager.
#[derive(Clone, Debug, thiserror::Error, PartialEq, Eq)]
pub enum FlipRefused {
    #[error(transparent)]
    Gate(BetRejected),
    #[error(transparent)]
    Game(GameError),
}

pub mod balance;
pub mod config;
pub mod errors;
pub mod game;
pub mod identity;
pub mod ledger;
pub mod logging;
pub mod session;
pub mod wager;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use errors::{
    ErrorSurface,
    GameError,
};
pub use game::{
    Completion,
    GameContext,
    GameView,
};
pub use identity::{
    Delegation,
    IdentityProvider,
};
pub use ledger::LedgerService;
pub use wager::{
    FlipResult,
    Outcome,
    WagerState,
};

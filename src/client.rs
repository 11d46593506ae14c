use crate::ui;
use coin_flip::{
    Completion,
    GameContext,
    IdentityProvider,
    LedgerService,
    config::AppConfig,
    game::FlipRefused,
    identity::{
        DelegationStore,
        HttpIdentityProvider,
    },
    ledger::HttpLedger,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
};
use crossterm::event::{
    Event,
    EventStream,
};
use futures::StreamExt;
use std::{
    io,
    time::Duration,
};
use tokio::time;
use tracing::info;

const COIN_FRAME: Duration = Duration::from_millis(120);

enum Step {
    Quit,
    Completion(Completion),
    AnimationTick,
    Input(Option<io::Result<Event>>),
}

pub async fn run_app(config: AppConfig) -> Result<()> {
    let store = DelegationStore::new(&config.config_dir);
    let provider = HttpIdentityProvider::create(store, config.identity_provider_url.clone())
        .wrap_err("Failed to set up identity provider client")?;
    let ledger =
        HttpLedger::new(config.ledger_url.clone()).wrap_err("Failed to set up ledger client")?;
    info!(
        ledger = %config.ledger_url,
        identity_provider = %config.identity_provider_url,
        "starting coin-flip client"
    );
    let mut game = GameContext::init(
        provider,
        config.identity_provider_url.clone(),
        ledger,
        config.initial_bet,
    )
    .await;
    let mut ui_state = ui::UiState::default();

    ui::terminal_enter(&mut ui_state)?;
    let res = run_loop(&mut game, &mut ui_state).await;
    ui::terminal_exit()?;
    res
}

async fn run_loop<P, L>(
    game: &mut GameContext<P, L>,
    ui_state: &mut ui::UiState,
) -> Result<()>
where
    P: IdentityProvider,
    L: LedgerService,
{
    let mut events = EventStream::new();
    let mut ticker = time::interval(COIN_FRAME);
    ui::draw(ui_state, &game.view())?;
    loop {
        let animating = game.is_flipping();
        let step = tokio::select! {
            _ = tokio::signal::ctrl_c() => Step::Quit,
            Some(completion) = game.next_completion() => Step::Completion(completion),
            _ = ticker.tick(), if animating => Step::AnimationTick,
            ev = events.next() => Step::Input(ev),
        };
        match step {
            Step::Quit => break,
            Step::Completion(completion) => game.apply(completion),
            Step::AnimationTick => ui_state.advance_coin(),
            Step::Input(None) => break,
            Step::Input(Some(ev)) => {
                let ev = ev.wrap_err("Failed to read terminal input")?;
                let view = game.view();
                let Some(user_event) = ui::interpret_event(ui_state, &ev, &view) else {
                    continue;
                };
                match user_event {
                    ui::UserEvent::Quit => break,
                    ui::UserEvent::ToggleSession => toggle_session(game, ui_state).await?,
                    ui::UserEvent::Flip => flip(game, ui_state),
                    ui::UserEvent::SetBet(bet) => game.set_bet(bet),
                    ui::UserEvent::RefreshBalance => {
                        if let Err(e) = game.refresh_balance() {
                            ui_state.set_status(e.to_string());
                        } else {
                            ui_state.set_status("Refreshing balance...");
                        }
                    }
                    ui::UserEvent::Redraw => {}
                }
            }
        }
        ui::draw(ui_state, &game.view())?;
    }
    Ok(())
}

async fn toggle_session<P, L>(
    game: &mut GameContext<P, L>,
    ui_state: &mut ui::UiState,
) -> Result<()>
where
    P: IdentityProvider,
    L: LedgerService,
{
    if game.is_authenticated() {
        show_processing_status(game, ui_state, "Logging out...")?;
        game.logout().await;
        ui_state.set_status("Logged out");
        return Ok(());
    }
    show_processing_status(game, ui_state, "Logging in...")?;
    match game.login().await {
        Ok(()) => ui_state.set_status("Logged in"),
        Err(_) => ui_state.set_status("Login failed"),
    }
    Ok(())
}

fn flip<P, L>(game: &mut GameContext<P, L>, ui_state: &mut ui::UiState)
where
    P: IdentityProvider,
    L: LedgerService,
{
    match game.flip() {
        Ok(wager) => ui_state.set_status(format!(
            "Flipping {} tokens (wager {wager})",
            game.bet()
        )),
        Err(FlipRefused::Gate(reason)) => {
            ui_state.set_status(format!("Cannot flip: {reason}"))
        }
        Err(FlipRefused::Game(e)) => ui_state.set_status(e.to_string()),
    }
}

// Login and logout block the loop, so paint the status first.
fn show_processing_status<P, L>(
    game: &GameContext<P, L>,
    ui_state: &mut ui::UiState,
    status: &str,
) -> Result<()>
where
    P: IdentityProvider,
    L: LedgerService,
{
    ui_state.set_status(status);
    ui::draw(ui_state, &game.view())
}

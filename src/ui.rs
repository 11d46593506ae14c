use coin_flip::{
    GameView,
    Outcome,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
};
use crossterm::event::{
    Event,
    KeyCode,
    KeyEvent,
    KeyEventKind,
};
use crossterm::terminal::{
    disable_raw_mode,
    enable_raw_mode,
};
use ratatui::prelude::*;
use ratatui::widgets::*;
use std::io::stdout;

const HEADS_FACE: &str = "( H )";
const TAILS_FACE: &str = "( T )";

const HOW_TO_PLAY: [&str; 5] = [
    "Enter the amount you want to bet",
    "Press f or Enter to flip the coin",
    "Heads means you win, Tails means you lose",
    "If you win, you'll double your bet",
    "If you lose, you'll lose your bet amount",
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UserEvent {
    Quit,
    ToggleSession,
    Flip,
    SetBet(u64),
    RefreshBalance,
    Redraw,
}

#[derive(Debug)]
pub struct UiState {
    mode: Mode,
    coin_frame: usize,
    status: String,
    terminal: Option<Terminal<CrosstermBackend<std::io::Stdout>>>,
}

impl Default for UiState {
    fn default() -> Self {
        UiState {
            mode: Mode::Normal,
            coin_frame: 0,
            status: String::from("Ready"),
            terminal: None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum Mode {
    #[default]
    Normal,
    QuitModal,
}

impl UiState {
    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
    }

    /// Moves the coin animation one face forward.
    pub fn advance_coin(&mut self) {
        self.coin_frame = self.coin_frame.wrapping_add(1);
    }
}

pub fn terminal_enter(state: &mut UiState) -> Result<()> {
    enable_raw_mode().wrap_err("Failed to enable raw mode")?;
    crossterm::execute!(stdout(), crossterm::terminal::EnterAlternateScreen)
        .wrap_err("Failed to enter alternate screen")?;
    let backend = CrosstermBackend::new(stdout());
    let terminal = Terminal::new(backend).wrap_err("Failed to create terminal")?;
    state.terminal = Some(terminal);
    Ok(())
}

pub fn terminal_exit() -> Result<()> {
    disable_raw_mode().wrap_err("Failed to disable raw mode")?;
    crossterm::execute!(stdout(), crossterm::terminal::LeaveAlternateScreen)
        .wrap_err("Failed to leave alternate screen")?;
    Ok(())
}

pub fn draw(state: &mut UiState, view: &GameView) -> Result<()> {
    if let Some(mut term) = state.terminal.take() {
        let drawn = term.draw(|f| ui(f, state, view)).map(|_| ());
        state.terminal = Some(term);
        drawn.wrap_err("Failed to draw frame")?;
    }
    Ok(())
}

/// Maps one terminal event to what the user asked for, given the screen they
/// are looking at. `None` means the event is ignored.
pub fn interpret_event(
    state: &mut UiState,
    event: &Event,
    view: &GameView,
) -> Option<UserEvent> {
    match event {
        Event::Key(key) if key.kind == KeyEventKind::Press => {
            interpret_key(state, key, view)
        }
        Event::Resize(_, _) => Some(UserEvent::Redraw),
        _ => None,
    }
}

fn interpret_key(state: &mut UiState, key: &KeyEvent, view: &GameView) -> Option<UserEvent> {
    if state.mode == Mode::QuitModal {
        return match key.code {
            KeyCode::Char('y') | KeyCode::Char('Y') => Some(UserEvent::Quit),
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                state.mode = Mode::Normal;
                Some(UserEvent::Redraw)
            }
            _ => None,
        };
    }

    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => {
            if view.call_outstanding {
                state.mode = Mode::QuitModal;
                Some(UserEvent::Redraw)
            } else {
                Some(UserEvent::Quit)
            }
        }
        KeyCode::Char('l') => Some(UserEvent::ToggleSession),
        _ if !view.is_authenticated => None,
        KeyCode::Char('f') | KeyCode::Enter => Some(UserEvent::Flip),
        KeyCode::Char('r') => Some(UserEvent::RefreshBalance),
        KeyCode::Char(c) if c.is_ascii_digit() => {
            let digit = u64::from(c as u8 - b'0');
            Some(UserEvent::SetBet(
                view.bet.saturating_mul(10).saturating_add(digit),
            ))
        }
        KeyCode::Backspace => Some(UserEvent::SetBet(view.bet / 10)),
        KeyCode::Up => Some(UserEvent::SetBet(view.bet.saturating_add(1))),
        KeyCode::Down => Some(UserEvent::SetBet(view.bet.saturating_sub(1))),
        _ => None,
    }
}

fn ui(f: &mut Frame, state: &UiState, view: &GameView) {
    f.render_widget(Clear, f.area());
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // header
            Constraint::Min(12),   // game
            Constraint::Length(6), // status + help
        ])
        .split(f.area());

    draw_header(f, chunks[0], view);
    if view.is_authenticated {
        draw_game(f, state, chunks[1], view);
    } else {
        draw_welcome(f, chunks[1], view);
    }
    draw_bottom(f, state, chunks[2], view);
    if state.mode == Mode::QuitModal {
        draw_quit_modal(f);
    }
}

fn draw_header(f: &mut Frame, area: Rect, view: &GameView) {
    let session = match &view.principal {
        Some(principal) => format!("Logged in as {principal} | l Logout"),
        None => String::from("l Login"),
    };
    let header = Paragraph::new(Line::from(vec![
        Span::styled("Coin Flip Game", Style::default().add_modifier(Modifier::BOLD)),
        Span::raw("  "),
        Span::styled(session, Style::default().fg(Color::Yellow)),
    ]))
    .block(Block::default().borders(Borders::ALL));
    f.render_widget(header, area);
}

fn draw_welcome(f: &mut Frame, area: Rect, view: &GameView) {
    let mut lines = vec![
        Line::from(""),
        Line::from("Welcome to Coin Flip Game!").bold().centered(),
        Line::from(""),
        Line::from("Please log in with your identity provider to play.").centered(),
        Line::from("Press l to log in.").centered(),
    ];
    if let Some(error) = &view.error {
        lines.push(Line::from(""));
        lines.push(Line::from(error.clone()).fg(Color::Red).centered());
    }
    let welcome = Paragraph::new(lines)
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).title("Welcome"));
    f.render_widget(welcome, area);
}

fn draw_game(f: &mut Frame, state: &UiState, area: Rect, view: &GameView) {
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(area);
    let left = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(8)])
        .split(columns[0]);

    let balance = Paragraph::new(format!("{} tokens", view.balance_text()))
        .style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
        .block(Block::default().borders(Borders::ALL).title("Your Balance"));
    f.render_widget(balance, left[0]);

    let mut lines = vec![
        Line::from(coin_face(state, view)).bold().centered(),
        Line::from(""),
        Line::from(format!("Bet: {} tokens", view.bet)),
        flip_button(view),
    ];
    if let Err(reason) = view.flip_allowed {
        lines.push(Line::from(format!("({reason})")).dark_gray());
    }
    lines.push(Line::from(""));
    if let Some(result) = &view.result {
        let color = match result.outcome {
            Outcome::Win => Color::Green,
            Outcome::Loss => Color::Red,
        };
        lines.push(Line::from(result.message.clone()).fg(color).bold());
    }
    if let Some(error) = &view.error {
        lines.push(Line::from(error.clone()).fg(Color::Red));
    }
    let coin = Paragraph::new(lines)
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).title("Coin"));
    f.render_widget(coin, left[1]);

    let how_to_play: Vec<Line> = HOW_TO_PLAY
        .iter()
        .map(|step| Line::from(format!("- {step}")))
        .collect();
    let help = Paragraph::new(how_to_play)
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).title("How to Play"));
    f.render_widget(help, columns[1]);
}

fn coin_face(state: &UiState, view: &GameView) -> &'static str {
    if view.flipping {
        return if state.coin_frame % 2 == 0 { HEADS_FACE } else { TAILS_FACE };
    }
    match view.result.as_ref().map(|r| r.outcome) {
        Some(Outcome::Loss) => TAILS_FACE,
        _ => HEADS_FACE,
    }
}

fn flip_button(view: &GameView) -> Line<'static> {
    let label = if view.call_outstanding { "[ Flipping... ]" } else { "[ FLIP! ]" };
    let style = if view.flip_allowed.is_ok() {
        Style::default().fg(Color::Black).bg(Color::Yellow)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    Line::from(Span::styled(label, style))
}

fn draw_bottom(f: &mut Frame, state: &UiState, area: Rect, view: &GameView) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Length(3)])
        .split(area);

    let status = Paragraph::new(state.status.clone())
        .block(Block::default().borders(Borders::ALL).title("Status"));
    f.render_widget(status, chunks[0]);

    let keys = if view.is_authenticated {
        "f/Enter flip | 0-9 bet | Backspace clear digit | Up/Down adjust | r refresh | l logout | q/Esc quit"
    } else {
        "l login | q/Esc quit"
    };
    let help =
        Paragraph::new(keys).block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(help, chunks[1]);
}

fn draw_quit_modal(f: &mut Frame) {
    let area = centered_rect(40, 20, f.area());
    let block = Block::default().borders(Borders::ALL).title("Confirm Quit");
    let p = Paragraph::new("A flip is still waiting for the ledger.\nQuit anyway? (Y/N)");
    f.render_widget(Clear, area);
    f.render_widget(block.clone(), area);
    f.render_widget(p, block.inner(area));
}

fn centered_rect(w_percent: u16, h_percent: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - h_percent) / 2),
            Constraint::Percentage(h_percent),
            Constraint::Percentage((100 - h_percent) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - w_percent) / 2),
            Constraint::Percentage(w_percent),
            Constraint::Percentage((100 - w_percent) / 2),
        ])
        .split(popup_layout[1])[1]
}

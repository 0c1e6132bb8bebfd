use crate::app::{update, AppMsg, Effect};
use crate::controller::{ControllerRegistry, FormController, InputEdit};
use crate::markup::{Markup, NodeId};
use crate::model::{self, AppConfig};
use crate::services::transport::{self, SubmitMsg};
use anyhow::{anyhow, Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::{Backend, CrosstermBackend};
use ratatui::prelude::*;
use ratatui::widgets::Paragraph;
use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::{Duration, Instant};

#[derive(Default)]
pub(crate) struct AppState {
    pub(crate) config: AppConfig,
    pub(crate) registry: ControllerRegistry,
    /// Document focus; `None` means focus rests outside the form root.
    pub(crate) focus: Option<NodeId>,
    /// Blur checks queued for after the current event turn.
    pub(crate) pending_focus_checks: usize,
    pub(crate) tick: u64,
    pub(crate) status_text: Option<String>,
    pub(crate) tx: Option<Sender<SubmitMsg>>,
    pub(crate) rx: Option<Receiver<SubmitMsg>>,
    // Debug log (rendered in the bottom pane when INFIELD_DEBUG=1)
    pub(crate) debug_log: VecDeque<String>,
}

impl AppState {
    pub fn dbg(&mut self, msg: impl Into<String>) {
        const MAX_LOG_LINES: usize = 200;
        if self.debug_log.len() >= MAX_LOG_LINES {
            self.debug_log.pop_front();
        }
        self.debug_log.push_back(msg.into());
    }

    /// Splice a rendered fragment in as the current form, replacing the
    /// previous controller instance. Focus resets to the page.
    pub(crate) fn reload(&mut self, fragment: &str) -> Result<()> {
        let doc = Markup::parse(fragment)?;
        model::validate_form_doc(&doc).map_err(|e| anyhow!(e))?;
        let ctrl = FormController::new(doc)?;
        self.registry.attach(ctrl);
        self.focus = None;
        Ok(())
    }
}

pub(crate) fn dispatch(state: &mut AppState, msg: AppMsg) {
    let effects = update(state, msg);
    run_effects(state, effects);
}

pub(crate) fn run_effects(state: &mut AppState, effects: Vec<Effect>) {
    for eff in effects {
        match eff {
            Effect::FocusNode(node) => {
                let more = update(state, AppMsg::FocusRequested(Some(node)));
                run_effects(state, more);
            }
            Effect::DeferFocusCheck => {
                state.pending_focus_checks += 1;
            }
            Effect::Submit { content, ctx } => {
                let cmdline = state.config.submit_cmd.clone();
                state.dbg(format!("submit :: {cmdline}"));
                state.status_text = Some("Saving...".to_string());
                if let Some(tx) = &state.tx {
                    transport::spawn_submit(cmdline, content, ctx, tx.clone());
                } else {
                    state.dbg("no transport channel, submit dropped");
                }
            }
            Effect::Reload { fragment } => {
                if let Err(e) = state.reload(&fragment) {
                    let msg = format!("reload failed: {e:#}");
                    state.dbg(msg.clone());
                    state.status_text = Some(msg);
                }
            }
            Effect::ResumeEditing {
                input_id,
                original_markup,
            } => {
                let node = input_id.as_deref().and_then(|id| {
                    state
                        .registry
                        .form_controller()
                        .and_then(|c| c.input_by_id(id))
                });
                if let Some(n) = node {
                    let more = update(state, AppMsg::FocusRequested(Some(n)));
                    run_effects(state, more);
                }
                if let Some(ctrl) = state.registry.form_controller_mut() {
                    ctrl.resume_after_rejection(node.is_some(), original_markup);
                }
            }
        }
    }
}

/// Drain deferred blur checks once the event turn that queued them is done.
/// A check may queue another (focus snap-back), so loop until quiet.
pub(crate) fn settle_focus_checks(state: &mut AppState) {
    while state.pending_focus_checks > 0 {
        state.pending_focus_checks -= 1;
        let effects = update(state, AppMsg::FocusSettled);
        run_effects(state, effects);
    }
}

fn next_focus(state: &AppState, forward: bool) -> Option<NodeId> {
    let ring = state
        .registry
        .form_controller()
        .map(|c| c.focus_ring())
        .unwrap_or_default();
    if ring.is_empty() {
        return None;
    }
    let Some(current) = state.focus else {
        return if forward {
            ring.first().copied()
        } else {
            ring.last().copied()
        };
    };
    let Some(pos) = ring.iter().position(|&n| n == current) else {
        return ring.first().copied();
    };
    if forward {
        // Past the last control focus leaves the form
        ring.get(pos + 1).copied()
    } else if pos == 0 {
        None
    } else {
        ring.get(pos - 1).copied()
    }
}

fn edit_focused_input(state: &mut AppState, edit: InputEdit) {
    let Some(node) = state.focus else {
        return;
    };
    let mut edited = false;
    if let Some(ctrl) = state.registry.form_controller_mut() {
        if ctrl.is_field_input(node) {
            ctrl.edit_input(node, edit);
            edited = true;
        }
    }
    if edited {
        dispatch(state, AppMsg::InputEdited);
    }
}

/// Returns true when the app should quit.
fn handle_key(state: &mut AppState, key: KeyEvent) -> bool {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return true;
    }
    let in_form = state
        .focus
        .map(|n| {
            state
                .registry
                .form_controller()
                .map(|c| c.owns(n))
                .unwrap_or(false)
        })
        .unwrap_or(false);
    if in_form {
        // While focus is inside the form, keys belong to it exclusively
        match key.code {
            KeyCode::Tab | KeyCode::Down => {
                let next = next_focus(state, true);
                dispatch(state, AppMsg::FocusRequested(next));
            }
            KeyCode::BackTab | KeyCode::Up => {
                let prev = next_focus(state, false);
                dispatch(state, AppMsg::FocusRequested(prev));
            }
            KeyCode::Enter => {
                let on_cancel = state
                    .registry
                    .form_controller()
                    .map(|c| state.focus == Some(c.cancel_button()))
                    .unwrap_or(false);
                if on_cancel {
                    dispatch(state, AppMsg::CancelRequested);
                } else {
                    // Enter on an input or on Save submits the form
                    dispatch(state, AppMsg::SubmitRequested);
                }
            }
            KeyCode::Esc => dispatch(state, AppMsg::KeyPressed(KeyCode::Esc)),
            KeyCode::Char(c) => edit_focused_input(state, InputEdit::Insert(c)),
            KeyCode::Backspace => edit_focused_input(state, InputEdit::Backspace),
            _ => {}
        }
        false
    } else {
        match key.code {
            KeyCode::Char('q') => true,
            KeyCode::Tab | KeyCode::Down | KeyCode::Enter => {
                let first = next_focus(state, true);
                dispatch(state, AppMsg::FocusRequested(first));
                false
            }
            _ => false,
        }
    }
}

fn pump_transport(state: &mut AppState) {
    let mut drained: Vec<SubmitMsg> = Vec::new();
    if let Some(rx) = &state.rx {
        while let Ok(msg) = rx.try_recv() {
            drained.push(msg);
        }
    }
    for msg in drained {
        dispatch(
            state,
            AppMsg::SubmitFinished {
                ctx: msg.ctx,
                outcome: msg.outcome,
            },
        );
        settle_focus_checks(state);
    }
}

fn help_text(state: &AppState) -> &'static str {
    if state.focus.is_some() {
        "Tab/Shift-Tab fields • Enter save • Esc cancel"
    } else {
        "Tab edit • q quit"
    }
}

fn debug_enabled() -> bool {
    env_flag("INFIELD_DEBUG")
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("yes"))
        .unwrap_or(false)
}

fn ui(f: &mut Frame, state: &mut AppState) {
    let debug = debug_enabled();
    let mut constraints = vec![Constraint::Min(5), Constraint::Length(1)];
    if debug {
        constraints.insert(1, Constraint::Length(7));
    }
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(constraints)
        .split(f.area());

    let cursor_on = state.tick % 2 == 0;
    if let Some(ctrl) = state.registry.form_controller() {
        crate::widgets::form_view::draw_form(f, chunks[0], ctrl, state.focus, cursor_on);
    } else {
        let p = Paragraph::new("no form loaded")
            .block(crate::widgets::chrome::panel_block("Infield", false));
        f.render_widget(p, chunks[0]);
    }

    if debug {
        let lines: Vec<Line> = state
            .debug_log
            .iter()
            .rev()
            .take(5)
            .map(|s| Line::from(s.clone()))
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        let p = Paragraph::new(lines).block(crate::widgets::chrome::panel_block("Debug", false));
        f.render_widget(p, chunks[1]);
    }

    let footer = if debug { chunks[2] } else { chunks[1] };
    let help = help_text(state);
    crate::widgets::status_bar::draw_footer(f, footer, state, help);
}

fn run_loop<B: Backend>(terminal: &mut Terminal<B>, state: &mut AppState) -> Result<()> {
    let tick_rate = Duration::from_millis(200);
    let mut last_tick = Instant::now();
    loop {
        terminal.draw(|f| ui(f, state))?;
        pump_transport(state);
        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or_default();
        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if handle_key(state, key) {
                    return Ok(());
                }
                settle_focus_checks(state);
            }
        }
        if last_tick.elapsed() >= tick_rate {
            state.tick = state.tick.wrapping_add(1);
            last_tick = Instant::now();
        }
    }
}

fn run_headless(mut state: AppState) -> Result<()> {
    let ticks: u64 = std::env::var("INFIELD_TICKS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(10);
    let backend = ratatui::backend::TestBackend::new(80, 24);
    let mut terminal = Terminal::new(backend)?;
    for _ in 0..ticks {
        terminal.draw(|f| ui(f, &mut state))?;
        pump_transport(&mut state);
        settle_focus_checks(&mut state);
        state.tick = state.tick.wrapping_add(1);
        std::thread::sleep(Duration::from_millis(50));
    }
    if env_flag("INFIELD_SMOKE_SUMMARY") {
        let ctrl = state.registry.form_controller();
        let summary = serde_json::json!({
            "ok": ctrl.is_some(),
            "fields": ctrl.map(|c| c.fields().len()).unwrap_or(0),
            "editing": ctrl.map(|c| c.doc().in_state(c.root(), "editing")).unwrap_or(false),
            "error": state.status_text,
        });
        println!("{summary}");
    }
    Ok(())
}

pub fn run() -> Result<()> {
    let config = model::load_config()?;
    let fragment = model::load_form_fragment(&config)?;
    let mut state = AppState {
        config,
        ..Default::default()
    };
    let (tx, rx) = mpsc::channel::<SubmitMsg>();
    state.tx = Some(tx);
    state.rx = Some(rx);
    state.reload(&fragment).context("loading initial form")?;
    state.dbg(format!("loaded form: {}", state.config.form));

    if env_flag("INFIELD_HEADLESS") {
        return run_headless(state);
    }

    enable_raw_mode()?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    let res = run_loop(&mut terminal, &mut state);
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    res
}

use crate::markup::NodeId;
use crate::services::transport::{FormContent, SubmitContext, SubmitOutcome};
use crate::ui::AppState;
use crossterm::event::KeyCode;

#[cfg(test)]
mod tests;

/// Discrete UI and transport events fed into [`update`].
#[derive(Debug)]
pub enum AppMsg {
    /// Document focus is moving; `None` means somewhere outside the form.
    FocusRequested(Option<NodeId>),
    /// The focused input's text just changed.
    InputEdited,
    /// A key pressed while focus is inside the form. The form owns these;
    /// they never fall through to page-level shortcuts.
    KeyPressed(KeyCode),
    SubmitRequested,
    CancelRequested,
    /// A deferred blur check is due; focus has settled by now.
    FocusSettled,
    SubmitFinished {
        ctx: SubmitContext,
        outcome: SubmitOutcome,
    },
}

/// Side effects requested by a state transition, executed by the UI shell.
#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
    /// Programmatically move document focus onto a node (focus snap-back).
    FocusNode(NodeId),
    /// Re-check focus after the current event turn completes.
    DeferFocusCheck,
    /// Hand the form content to the transport.
    Submit {
        content: FormContent,
        ctx: SubmitContext,
    },
    /// Replace the rendered form with this fragment.
    Reload { fragment: String },
    /// After a validation-rejection reload: refocus the input captured
    /// before the request and seed the replacement controller's state.
    ResumeEditing {
        input_id: Option<String>,
        original_markup: String,
    },
}

pub fn update(state: &mut AppState, msg: AppMsg) -> Vec<Effect> {
    use AppMsg::*;
    let mut effects: Vec<Effect> = Vec::new();
    match msg {
        FocusRequested(target) => {
            // Blur fires for the outgoing focus before the new target is
            // authoritative; the controller defers its real check.
            if let Some(prev) = state.focus {
                if let Some(ctrl) = state.registry.form_controller_mut() {
                    if ctrl.owns(prev) {
                        effects.extend(ctrl.on_blur());
                    }
                }
            }
            state.focus = target;
            if let Some(node) = target {
                if let Some(ctrl) = state.registry.form_controller_mut() {
                    effects.extend(ctrl.on_focus(node));
                }
            }
        }
        InputEdited => {
            if let Some(ctrl) = state.registry.form_controller_mut() {
                ctrl.on_input();
            }
        }
        KeyPressed(key) => {
            if let Some(ctrl) = state.registry.form_controller_mut() {
                effects.extend(ctrl.on_keydown(key));
            }
        }
        SubmitRequested => {
            if let Some(ctrl) = state.registry.form_controller_mut() {
                effects.extend(ctrl.submit());
            }
        }
        CancelRequested => {
            if let Some(ctrl) = state.registry.form_controller_mut() {
                effects.extend(ctrl.cancel());
            }
        }
        FocusSettled => {
            let focus = state.focus;
            if let Some(ctrl) = state.registry.form_controller_mut() {
                effects.extend(ctrl.focus_settled(focus));
            }
        }
        SubmitFinished { ctx, outcome } => {
            state.status_text = None;
            match outcome {
                SubmitOutcome::Accepted { form } => {
                    state.dbg("submit accepted, reloading form");
                    effects.push(Effect::Reload { fragment: form });
                }
                SubmitOutcome::Rejected { form } => {
                    state.dbg("submit rejected, resuming edit on replacement form");
                    effects.push(Effect::Reload { fragment: form });
                    effects.push(Effect::ResumeEditing {
                        input_id: ctx.active_input_id,
                        original_markup: ctx.original_markup,
                    });
                }
                SubmitOutcome::Failed { reason } => {
                    state.dbg(format!("submit failed: {reason}"));
                    if let Some(ctrl) = state.registry.form_controller_mut() {
                        ctrl.submit_failed(reason);
                    }
                }
            }
        }
    }
    effects
}

use super::*;
use crate::services::transport::SubmitOutcome;
use crate::ui::{dispatch, run_effects, settle_focus_checks, AppState};

const PROFILE: &str = r#"
role: form
attrs: { title: Profile }
children:
  - role: field
    attrs: { label: Display name }
    children:
      - { role: input, attrs: { id: display_name, name: display_name }, text: Ada }
  - role: field
    attrs: { label: Email }
    children:
      - { role: input, attrs: { id: email, name: email }, text: ada@example.org }
  - role: backdrop
  - role: actions
    children:
      - { role: save, text: Save }
      - { role: cancel, text: Cancel }
  - role: submit-error
    children:
      - { role: submit-error-message }
"#;

// Server re-render after a rejected submit: same inputs, plus a
// field-level validation message.
const REJECTION: &str = r#"
role: form
attrs: { title: Profile }
children:
  - role: field
    attrs: { label: Display name }
    children:
      - { role: input, attrs: { id: display_name, name: display_name }, text: Ada }
  - role: field
    attrs: { label: Email }
    children:
      - { role: input, attrs: { id: email, name: email }, text: not-an-email }
      - { role: error, text: Email is invalid }
  - role: backdrop
  - role: actions
    children:
      - { role: save, text: Save }
      - { role: cancel, text: Cancel }
  - role: submit-error
    children:
      - { role: submit-error-message }
"#;

const SAVED: &str = r#"
role: form
attrs: { title: Profile (saved) }
children:
  - role: field
    attrs: { label: Display name }
    children:
      - { role: input, attrs: { id: display_name, name: display_name }, text: Grace }
  - role: backdrop
  - role: actions
    children:
      - { role: save, text: Save }
      - { role: cancel, text: Cancel }
  - role: submit-error
    children:
      - { role: submit-error-message }
"#;

fn state_with_form() -> AppState {
    let mut st = AppState::default();
    st.reload(PROFILE).unwrap();
    st
}

fn input(st: &AppState, id: &str) -> crate::markup::NodeId {
    st.registry
        .form_controller()
        .and_then(|c| c.input_by_id(id))
        .unwrap()
}

fn submit_ctx(st: &mut AppState) -> crate::services::transport::SubmitContext {
    let effects = update(st, AppMsg::SubmitRequested);
    match effects.as_slice() {
        [Effect::Submit { ctx, .. }] => ctx.clone(),
        other => panic!("expected a submit effect, got {other:?}"),
    }
}

#[test]
fn focus_and_input_drive_the_editing_state() {
    let mut st = state_with_form();
    let email = input(&st, "email");
    let effects = update(&mut st, AppMsg::FocusRequested(Some(email)));
    assert!(effects.is_empty());
    let ctrl = st.registry.form_controller().unwrap();
    assert_eq!(ctrl.state().editing_fields, vec![1]);
    assert!(!ctrl.state().dirty);

    let _ = update(&mut st, AppMsg::InputEdited);
    assert!(st.registry.form_controller().unwrap().state().dirty);
}

#[test]
fn tabbing_out_of_a_clean_edit_returns_to_rest() {
    let mut st = state_with_form();
    let email = input(&st, "email");
    dispatch(&mut st, AppMsg::FocusRequested(Some(email)));
    let effects = update(&mut st, AppMsg::FocusRequested(None));
    assert_eq!(effects, vec![Effect::DeferFocusCheck]);
    run_effects(&mut st, effects);
    // The check only runs once the event turn is over
    assert!(!st
        .registry
        .form_controller()
        .unwrap()
        .state()
        .editing_fields
        .is_empty());
    settle_focus_checks(&mut st);
    let ctrl = st.registry.form_controller().unwrap();
    assert!(ctrl.state().editing_fields.is_empty());
    assert_eq!(ctrl.state().focused_field, None);
}

#[test]
fn dirty_edit_snaps_focus_back() {
    let mut st = state_with_form();
    let name = input(&st, "display_name");
    let email = input(&st, "email");
    dispatch(&mut st, AppMsg::FocusRequested(Some(email)));
    let _ = update(&mut st, AppMsg::InputEdited);
    // Trying to focus another field is redirected back
    let effects = update(&mut st, AppMsg::FocusRequested(Some(name)));
    run_effects(&mut st, effects);
    settle_focus_checks(&mut st);
    assert_eq!(st.focus, Some(email));
    assert_eq!(
        st.registry.form_controller().unwrap().state().editing_fields,
        vec![1]
    );
}

#[test]
fn escape_reloads_the_original_markup() {
    let mut st = state_with_form();
    let email = input(&st, "email");
    dispatch(&mut st, AppMsg::FocusRequested(Some(email)));
    let _ = update(&mut st, AppMsg::InputEdited);
    let effects = update(&mut st, AppMsg::KeyPressed(crossterm::event::KeyCode::Esc));
    assert!(matches!(effects.as_slice(), [Effect::Reload { .. }]));
    run_effects(&mut st, effects);
    let ctrl = st.registry.form_controller().unwrap();
    assert_eq!(ctrl.doc().attr(ctrl.root(), "title"), Some("Profile"));
    assert!(ctrl.state().editing_fields.is_empty());
    assert_eq!(st.focus, None);
}

#[test]
fn accepted_submit_replaces_the_form() {
    let mut st = state_with_form();
    let email = input(&st, "email");
    dispatch(&mut st, AppMsg::FocusRequested(Some(email)));
    let ctx = submit_ctx(&mut st);
    assert!(st.registry.form_controller().unwrap().state().saving);

    let effects = update(
        &mut st,
        AppMsg::SubmitFinished {
            ctx,
            outcome: SubmitOutcome::Accepted {
                form: SAVED.to_string(),
            },
        },
    );
    run_effects(&mut st, effects);
    let ctrl = st.registry.form_controller().unwrap();
    assert_eq!(ctrl.doc().attr(ctrl.root(), "title"), Some("Profile (saved)"));
    assert!(ctrl.state().editing_fields.is_empty());
    assert!(!ctrl.state().saving);
    assert_eq!(st.focus, None);
}

#[test]
fn rejected_submit_resumes_editing_on_the_replacement() {
    let mut st = state_with_form();
    let email = input(&st, "email");
    dispatch(&mut st, AppMsg::FocusRequested(Some(email)));
    let _ = update(&mut st, AppMsg::InputEdited);
    let ctx = submit_ctx(&mut st);
    assert_eq!(ctx.active_input_id.as_deref(), Some("email"));
    let presubmit = ctx.original_markup.clone();

    let effects = update(
        &mut st,
        AppMsg::SubmitFinished {
            ctx,
            outcome: SubmitOutcome::Rejected {
                form: REJECTION.to_string(),
            },
        },
    );
    run_effects(&mut st, effects);
    settle_focus_checks(&mut st);

    let ctrl = st.registry.form_controller().unwrap();
    // A new instance took over, showing the server's validation message
    let err = ctrl.doc().find_role(ctrl.root(), "error").unwrap();
    assert_eq!(ctrl.doc().text(err), "Email is invalid");
    // The matching input was refocused and the edit resumed dirty
    assert_eq!(st.focus, ctrl.input_by_id("email"));
    assert_eq!(ctrl.state().editing_fields, vec![1]);
    assert!(ctrl.state().dirty);
    // Cancel reverts past the whole submission attempt
    assert_eq!(ctrl.state().original_markup, presubmit);
}

#[test]
fn rejection_without_a_matching_input_stays_clean() {
    let mut st = state_with_form();
    let email = input(&st, "email");
    dispatch(&mut st, AppMsg::FocusRequested(Some(email)));
    let _ = update(&mut st, AppMsg::InputEdited);
    let ctx = submit_ctx(&mut st);
    let presubmit = ctx.original_markup.clone();

    let rejection = REJECTION.replace("id: email", "id: contact_email");
    let effects = update(
        &mut st,
        AppMsg::SubmitFinished {
            ctx,
            outcome: SubmitOutcome::Rejected { form: rejection },
        },
    );
    run_effects(&mut st, effects);
    let ctrl = st.registry.form_controller().unwrap();
    assert!(!ctrl.state().dirty);
    assert!(ctrl.state().editing_fields.is_empty());
    assert_eq!(ctrl.state().original_markup, presubmit);
    assert_eq!(st.focus, None);
}

#[test]
fn transport_failure_preserves_the_edit() {
    let mut st = state_with_form();
    let email = input(&st, "email");
    dispatch(&mut st, AppMsg::FocusRequested(Some(email)));
    let _ = update(&mut st, AppMsg::InputEdited);
    let ctx = submit_ctx(&mut st);
    let editing_before = st
        .registry
        .form_controller()
        .unwrap()
        .state()
        .editing_fields
        .clone();

    let effects = update(
        &mut st,
        AppMsg::SubmitFinished {
            ctx,
            outcome: SubmitOutcome::Failed {
                reason: "connection refused".to_string(),
            },
        },
    );
    assert!(effects.is_empty());
    let ctrl = st.registry.form_controller().unwrap();
    assert!(!ctrl.state().saving);
    assert_eq!(ctrl.state().submit_error, "connection refused");
    assert_eq!(ctrl.state().editing_fields, editing_before);
    assert!(ctrl.state().dirty);
}

#[test]
fn malformed_replacement_keeps_the_current_form() {
    let mut st = state_with_form();
    let email = input(&st, "email");
    dispatch(&mut st, AppMsg::FocusRequested(Some(email)));
    let ctx = submit_ctx(&mut st);

    let effects = update(
        &mut st,
        AppMsg::SubmitFinished {
            ctx,
            outcome: SubmitOutcome::Accepted {
                form: "role: page".to_string(),
            },
        },
    );
    run_effects(&mut st, effects);
    let ctrl = st.registry.form_controller().unwrap();
    assert_eq!(ctrl.doc().attr(ctrl.root(), "title"), Some("Profile"));
    assert!(st
        .status_text
        .as_deref()
        .unwrap_or_default()
        .contains("reload failed"));
}

#[test]
fn second_submit_while_saving_is_ignored() {
    let mut st = state_with_form();
    let email = input(&st, "email");
    dispatch(&mut st, AppMsg::FocusRequested(Some(email)));
    let _ = submit_ctx(&mut st);
    let effects = update(&mut st, AppMsg::SubmitRequested);
    assert!(effects.is_empty());
}

use crate::controller::FormController;
use crate::markup::{Markup, NodeId};
use crate::widgets::chrome::panel_block;
use ratatui::prelude::*;
use ratatui::widgets::{Paragraph, Wrap};

/// Render the form's markup tree. Everything presentational was already
/// decided by the view projection; this only reads state flags.
pub fn draw_form(
    f: &mut Frame,
    area: Rect,
    ctrl: &FormController,
    focus: Option<NodeId>,
    cursor_on: bool,
) {
    let doc = ctrl.doc();
    let root = ctrl.root();
    let editing_any = doc.in_state(root, "editing");
    let mut lines: Vec<Line<'static>> = Vec::new();
    push_node_lines(&mut lines, doc, root, focus, cursor_on, editing_any);
    let mut title = doc.attr(root, "title").unwrap_or("Form").to_string();
    if editing_any {
        title.push_str(" — editing");
    }
    let block = panel_block(&title, focus.is_some());
    let p = Paragraph::new(lines).block(block).wrap(Wrap { trim: false });
    f.render_widget(p, area);
}

fn push_node_lines(
    lines: &mut Vec<Line<'static>>,
    doc: &Markup,
    parent: NodeId,
    focus: Option<NodeId>,
    cursor_on: bool,
    editing_any: bool,
) {
    for &child in doc.children(parent) {
        match doc.role(child) {
            Some("field") => {
                if doc.in_state(child, "hidden") {
                    continue;
                }
                lines.push(field_line(doc, child, cursor_on, editing_any));
                if let Some(err) = doc.find_role(child, "error") {
                    if !doc.text(err).is_empty() {
                        lines.push(Line::from(Span::styled(
                            format!("  ! {}", doc.text(err)),
                            crate::theme::text_error(),
                        )));
                    }
                }
            }
            Some("actions") => {
                if doc.in_state(child, "hidden") {
                    continue;
                }
                lines.push(Line::from(""));
                lines.push(actions_line(doc, child, focus));
            }
            Some("submit-error") => {
                if doc.in_state(child, "visible") {
                    let msg = doc
                        .find_role(child, "submit-error-message")
                        .map(|n| doc.text(n))
                        .unwrap_or("");
                    lines.push(Line::from(Span::styled(
                        format!("  ! {msg}"),
                        crate::theme::text_error(),
                    )));
                }
            }
            Some("backdrop") => {}
            _ => {
                if !doc.text(child).is_empty() {
                    lines.push(Line::from(doc.text(child).to_string()));
                }
                push_node_lines(lines, doc, child, focus, cursor_on, editing_any);
            }
        }
    }
}

fn field_line(doc: &Markup, container: NodeId, cursor_on: bool, editing_any: bool) -> Line<'static> {
    let label = doc.attr(container, "label").unwrap_or("").to_string();
    let input = doc.find_role(container, "input");
    let mut value = input.map(|i| doc.text(i).to_string()).unwrap_or_default();
    if input.and_then(|i| doc.attr(i, "type")) == Some("password") {
        value = "•".repeat(value.chars().count());
    }
    let focused = doc.in_state(container, "focused");
    let editing = doc.in_state(container, "editing");
    let sel = if focused { '›' } else { ' ' };
    if focused && cursor_on {
        value.push('▏');
    }
    let value_style = if focused {
        crate::theme::text_editing_bold()
    } else if editing {
        crate::theme::text_active_bold()
    } else if editing_any {
        // Backdrop dims everything outside the active edit
        crate::theme::text_muted()
    } else {
        Style::default()
    };
    let label_style = if editing_any && !editing {
        crate::theme::text_muted()
    } else {
        Style::default()
    };
    Line::from(vec![
        Span::styled(format!("{sel} {label}: "), label_style),
        Span::styled(value, value_style),
    ])
}

fn actions_line(doc: &Markup, actions: NodeId, focus: Option<NodeId>) -> Line<'static> {
    let saving = doc.in_state(actions, "saving");
    let save = doc.find_role(actions, "save");
    let cancel = doc.find_role(actions, "cancel");
    let mut spans: Vec<Span> = vec![Span::raw("  ")];
    let save_label = if saving {
        "[ Saving… ]".to_string()
    } else {
        let t = save
            .map(|n| doc.text(n))
            .filter(|t| !t.is_empty())
            .unwrap_or("Save");
        format!("[ {t} ]")
    };
    let save_style = if saving {
        crate::theme::text_muted()
    } else if focus == save {
        crate::theme::list_cursor_style()
    } else {
        crate::theme::text_active_bold()
    };
    spans.push(Span::styled(format!("{save_label}  "), save_style));
    if let Some(cancel) = cancel {
        if !doc.in_state(cancel, "hidden") {
            let label = if doc.text(cancel).is_empty() {
                "Cancel".to_string()
            } else {
                doc.text(cancel).to_string()
            };
            let style = if focus == Some(cancel) {
                crate::theme::list_cursor_style()
            } else {
                crate::theme::text_muted()
            };
            spans.push(Span::styled(label, style));
        }
    }
    Line::from(spans)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::backend::TestBackend;
    use ratatui::Terminal;

    const PROFILE: &str = r#"
role: form
attrs: { title: Profile }
children:
  - role: field
    attrs: { label: Email }
    children:
      - { role: input, attrs: { id: email, name: email }, text: ada@example.org }
  - role: field
    attrs: { label: Secret, hide-until-active: "" }
    children:
      - { role: input, attrs: { id: secret, name: secret, type: password }, text: hunter2 }
  - role: backdrop
  - role: actions
    children:
      - { role: save, text: Save }
      - { role: cancel, text: Cancel }
  - role: submit-error
    children:
      - { role: submit-error-message }
"#;

    fn rendered(ctrl: &FormController, focus: Option<crate::markup::NodeId>) -> String {
        let backend = TestBackend::new(48, 12);
        let mut terminal = Terminal::new(backend).unwrap();
        terminal
            .draw(|f| {
                let area = f.area();
                draw_form(f, area, ctrl, focus, false);
            })
            .unwrap();
        let buf = terminal.backend().buffer().clone();
        let mut out = String::new();
        for y in 0..buf.area.height {
            for x in 0..buf.area.width {
                out.push_str(buf[(x, y)].symbol());
            }
            out.push('\n');
        }
        out
    }

    fn controller() -> FormController {
        FormController::new(Markup::parse(PROFILE).unwrap()).unwrap()
    }

    #[test]
    fn at_rest_hides_controls_and_concealed_fields() {
        let c = controller();
        let text = rendered(&c, None);
        assert!(text.contains("Profile"));
        assert!(text.contains("Email"));
        assert!(!text.contains("Secret"));
        assert!(!text.contains("[ Save ]"));
        assert!(!text.contains("editing"));
    }

    #[test]
    fn editing_shows_controls_and_masks_passwords() {
        let mut c = controller();
        let input = c.fields()[0].input;
        let _ = c.on_focus(input);
        let text = rendered(&c, Some(input));
        assert!(text.contains("— editing"));
        assert!(text.contains("[ Save ]"));
        assert!(text.contains("Cancel"));
        assert!(text.contains("Secret"));
        assert!(text.contains("•••••••"));
        assert!(!text.contains("hunter2"));
    }

    #[test]
    fn saving_and_error_states_are_visible() {
        let mut c = controller();
        let input = c.fields()[0].input;
        let _ = c.on_focus(input);
        let _ = c.submit();
        let text = rendered(&c, Some(input));
        assert!(text.contains("[ Saving… ]"));
        c.submit_failed("connection refused".into());
        let text = rendered(&c, Some(input));
        assert!(text.contains("! connection refused"));
        assert!(text.contains("[ Save ]"));
    }
}

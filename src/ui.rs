use chrono::Local;
use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
};

use crate::app::{App, InputMode, Popup};
use crate::notes::{format_note_line, KeyValueStore};
use crate::state::{ChatRole, Persona, ResponseLength};

/// Parse a line of text and convert **bold** markdown to styled spans
fn parse_markdown_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut chars = text.chars().peekable();
    let mut current_text = String::new();

    while let Some(c) = chars.next() {
        if c == '*' && chars.peek() == Some(&'*') {
            chars.next();

            if !current_text.is_empty() {
                spans.push(Span::raw(std::mem::take(&mut current_text)));
            }

            let mut bold_text = String::new();
            let mut found_close = false;
            while let Some(c) = chars.next() {
                if c == '*' && chars.peek() == Some(&'*') {
                    chars.next();
                    found_close = true;
                    break;
                }
                bold_text.push(c);
            }

            if found_close && !bold_text.is_empty() {
                spans.push(Span::styled(
                    bold_text,
                    Style::default().add_modifier(Modifier::BOLD),
                ));
            } else {
                // No closing **, treat as literal
                current_text.push_str("**");
                current_text.push_str(&bold_text);
            }
        } else {
            current_text.push(c);
        }
    }

    if !current_text.is_empty() {
        spans.push(Span::raw(current_text));
    }

    if spans.is_empty() {
        Line::default()
    } else {
        Line::from(spans)
    }
}

pub fn render<S: KeyValueStore>(app: &mut App<S>, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, chat, input, footer
    let [header_area, chat_area, input_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(3),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);
    render_chat(app, frame, chat_area);
    render_input(app, frame, input_area);
    render_footer(app, frame, footer_area);

    match app.popup {
        Some(Popup::PersonaPicker) => render_persona_picker(app, frame, area),
        Some(Popup::LengthPicker) => render_length_picker(app, frame, area),
        Some(Popup::SavedNotes) => render_saved_notes(app, frame, area),
        None => {}
    }
}

fn render_header<S: KeyValueStore>(app: &App<S>, frame: &mut Frame, area: Rect) {
    let config = app.session.config();

    let title = Line::from(vec![
        Span::styled(" Companion ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(
            format!("[{}] ", config.persona.display_name()),
            Style::default().fg(Color::Green),
        ),
        Span::styled(
            format!(
                "[{} · {} tokens] ",
                config.response_length.display_name(),
                config.response_length.max_tokens()
            ),
            Style::default().fg(Color::Yellow),
        ),
        Span::styled(
            format!("{} v{}", app.model, env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::Gray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_chat<S: KeyValueStore>(app: &mut App<S>, frame: &mut Frame, area: Rect) {
    // Store inner size for scroll calculations
    app.chat_height = area.height.saturating_sub(2);
    app.chat_width = area.width.saturating_sub(2);

    let border_color = if app.input_mode == InputMode::Normal {
        Color::Cyan
    } else {
        Color::DarkGray
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(" Chat ");

    let rows = app.message_rows();
    let composing = app.session.is_composing();

    let chat_text = if rows.is_empty() && !composing {
        Text::from(Span::styled(
            "Say hello to start the conversation...",
            Style::default().fg(Color::DarkGray),
        ))
    } else {
        let mut lines: Vec<Line> = Vec::new();
        let selected = if app.input_mode == InputMode::Normal {
            app.selected_row.or(rows.len().checked_sub(1))
        } else {
            None
        };

        for (i, row) in rows.iter().enumerate() {
            let (label, color) = match row.role {
                ChatRole::User => ("You:", Color::Cyan),
                _ => ("AI:", Color::Yellow),
            };
            let mut label_style = Style::default().fg(color).add_modifier(Modifier::BOLD);
            if selected == Some(i) {
                label_style = label_style.add_modifier(Modifier::REVERSED);
            }
            lines.push(Line::from(Span::styled(label, label_style)));

            match row.role {
                ChatRole::User => lines.push(Line::from(row.content.clone())),
                _ => lines.extend(row.content.lines().map(parse_markdown_line)),
            }
            lines.push(Line::default());
        }

        if composing {
            lines.push(Line::from(Span::styled(
                "AI:",
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
            )));
            // Animated ellipsis: cycles through ".", "..", "..."
            let dots = ".".repeat((app.animation_frame as usize) + 1);
            lines.push(Line::from(Span::styled(
                format!("Thinking{}", dots),
                Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
            )));
        }

        Text::from(lines)
    };

    let chat = Paragraph::new(chat_text)
        .block(block)
        .wrap(Wrap { trim: true })
        .scroll((app.chat_scroll, 0));

    frame.render_widget(chat, area);
}

fn render_input<S: KeyValueStore>(app: &App<S>, frame: &mut Frame, area: Rect) {
    let editing = app.input_mode == InputMode::Editing;
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(if editing { Color::Yellow } else { Color::DarkGray }))
        .title(" Message (Enter to send) ");

    // Horizontal scroll keeps the cursor inside the box
    let inner_width = area.width.saturating_sub(2) as usize;
    let scroll_offset = if inner_width == 0 {
        0
    } else if app.cursor >= inner_width {
        app.cursor - inner_width + 1
    } else {
        0
    };

    let visible_text: String = app.input
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    let input = Paragraph::new(visible_text)
        .style(Style::default().fg(Color::Cyan))
        .block(block);
    frame.render_widget(input, area);

    if editing && app.popup.is_none() {
        let cursor_x = (app.cursor - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

fn render_footer<S: KeyValueStore>(app: &App<S>, frame: &mut Frame, area: Rect) {
    let (mode_label, mode_style) = match app.input_mode {
        InputMode::Normal => (" NORMAL ", Style::default().bg(Color::Blue).fg(Color::White)),
        InputMode::Editing => (" INSERT ", Style::default().bg(Color::Yellow).fg(Color::Black)),
    };

    let mut spans = vec![Span::styled(mode_label, mode_style), Span::raw(" ")];

    if let Some(status) = app.status_line() {
        spans.push(Span::styled(status, Style::default().fg(Color::Red)));
    } else {
        let hints = match app.input_mode {
            InputMode::Normal => {
                "j/k select  s save  v saved  p persona  l length  i write  q quit"
            }
            InputMode::Editing => "Enter send  Esc commands  Ctrl-C quit",
        };
        spans.push(Span::styled(hints, Style::default().fg(Color::DarkGray)));
    }

    let footer = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Black));
    frame.render_widget(footer, area);
}

/// Centered popup area, clamped to the frame
fn popup_area(area: Rect, width: u16, height: u16) -> Rect {
    let popup_width = width.min(area.width.saturating_sub(4));
    let popup_height = height.min(area.height.saturating_sub(4));
    let popup_x = (area.width.saturating_sub(popup_width)) / 2;
    let popup_y = (area.height.saturating_sub(popup_height)) / 2;
    Rect::new(popup_x, popup_y, popup_width, popup_height)
}

fn picker_list<'a>(title: &'a str, items: Vec<ListItem<'a>>) -> List<'a> {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(title);

    List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ")
}

fn current_style(is_current: bool) -> Style {
    if is_current {
        Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
    } else {
        Style::default()
    }
}

fn render_persona_picker<S: KeyValueStore>(app: &mut App<S>, frame: &mut Frame, area: Rect) {
    let personas = Persona::all();
    let current = app.session.config().persona;
    let popup = popup_area(area, 36, personas.len() as u16 + 2);
    frame.render_widget(Clear, popup);

    let items: Vec<ListItem> = personas
        .iter()
        .map(|p| {
            ListItem::new(format!(" {} ", p.display_name())).style(current_style(*p == current))
        })
        .collect();

    frame.render_stateful_widget(picker_list(" Select Mode ", items), popup, &mut app.picker_state);
}

fn render_length_picker<S: KeyValueStore>(app: &mut App<S>, frame: &mut Frame, area: Rect) {
    let lengths = ResponseLength::all();
    let current = app.session.config().response_length;
    let popup = popup_area(area, 36, lengths.len() as u16 + 2);
    frame.render_widget(Clear, popup);

    let items: Vec<ListItem> = lengths
        .iter()
        .map(|l| {
            ListItem::new(format!(" {} ", l.display_name())).style(current_style(*l == current))
        })
        .collect();

    frame.render_stateful_widget(
        picker_list(" Response Message Length ", items),
        popup,
        &mut app.picker_state,
    );
}

/// One row per note plus borders; `popup_area` clamps it to the screen
fn saved_notes_height(count: usize) -> u16 {
    u16::try_from(count).unwrap_or(u16::MAX).max(1).saturating_add(2)
}

fn render_saved_notes<S: KeyValueStore>(app: &mut App<S>, frame: &mut Frame, area: Rect) {
    let width = area.width.saturating_sub(8).max(20);
    let height = saved_notes_height(app.saved_notes.len());
    let popup = popup_area(area, width, height);
    frame.render_widget(Clear, popup);

    if app.saved_notes.is_empty() {
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan))
            .title(" Saved Messages (Esc to close) ");
        let placeholder = Paragraph::new("No saved messages")
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        frame.render_widget(placeholder, popup);
        return;
    }

    let items: Vec<ListItem> = app
        .saved_notes
        .iter()
        .map(|note| ListItem::new(format!(" {} ", format_note_line(note, &Local))))
        .collect();

    frame.render_stateful_widget(
        picker_list(" Saved Messages (Esc to close) ", items),
        popup,
        &mut app.saved_state,
    );
}

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::app::{App, InputMode, Popup};
use crate::notes::KeyValueStore;
use crate::tui::AppEvent;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub fn handle_event<S: KeyValueStore>(app: &mut App<S>, event: AppEvent) {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Resize(_, _) => {}
        AppEvent::Tick => app.tick_animation(),
        AppEvent::Completion { ticket, result } => app.handle_completion(ticket, result),
    }
}

fn handle_key<S: KeyValueStore>(app: &mut App<S>, key: KeyEvent) {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    if app.popup.is_some() {
        handle_popup(app, key);
        return;
    }

    match app.input_mode {
        InputMode::Normal => handle_normal_mode(app, key),
        InputMode::Editing => handle_editing_mode(app, key),
    }
}

fn handle_popup<S: KeyValueStore>(app: &mut App<S>, key: KeyEvent) {
    match key.code {
        KeyCode::Esc | KeyCode::Char('q') => app.close_popup(),
        KeyCode::Char('j') | KeyCode::Down => app.popup_nav_down(),
        KeyCode::Char('k') | KeyCode::Up => app.popup_nav_up(),
        KeyCode::Enter => {
            if app.popup == Some(Popup::SavedNotes) {
                app.close_popup();
            } else {
                app.confirm_picker();
            }
        }
        _ => {}
    }
}

fn handle_normal_mode<S: KeyValueStore>(app: &mut App<S>, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,

        // Message selection
        KeyCode::Char('j') | KeyCode::Down => app.select_next_row(),
        KeyCode::Char('k') | KeyCode::Up => app.select_prev_row(),
        KeyCode::Char('G') => app.selected_row = None,

        // Scrolling
        KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.chat_scroll = app.chat_scroll.saturating_add(app.chat_height / 2);
        }
        KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.chat_scroll = app.chat_scroll.saturating_sub(app.chat_height / 2);
        }

        // Actions
        KeyCode::Char('s') => app.save_selected(),
        KeyCode::Char('v') => app.open_saved_notes(),
        KeyCode::Char('p') => app.open_persona_picker(),
        KeyCode::Char('l') => app.open_length_picker(),
        KeyCode::Char('i') | KeyCode::Enter | KeyCode::Tab => {
            app.input_mode = InputMode::Editing;
        }

        _ => {}
    }
}

fn handle_editing_mode<S: KeyValueStore>(app: &mut App<S>, key: KeyEvent) {
    match key.code {
        KeyCode::Esc | KeyCode::Tab => {
            app.input_mode = InputMode::Normal;
        }
        KeyCode::Enter => app.send_input(),
        KeyCode::Backspace => {
            if app.cursor > 0 {
                app.cursor -= 1;
                let byte_pos = char_to_byte_index(&app.input, app.cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            let char_count = app.input.chars().count();
            if app.cursor < char_count {
                let byte_pos = char_to_byte_index(&app.input, app.cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            app.cursor = app.cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app.input.chars().count();
            app.cursor = (app.cursor + 1).min(char_count);
        }
        KeyCode::Home => {
            app.cursor = 0;
        }
        KeyCode::End => {
            app.cursor = app.input.chars().count();
        }
        KeyCode::Char(c) => {
            let byte_pos = char_to_byte_index(&app.input, app.cursor);
            app.input.insert(byte_pos, c);
            app.cursor += 1;
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notes::{MemoryStore, NoteStore};
    use crate::state::{ChatRole, Persona, SessionConfig};
    use tokio::sync::mpsc;

    fn press(app: &mut App<MemoryStore>, code: KeyCode) {
        handle_event(app, AppEvent::Key(KeyEvent::new(code, KeyModifiers::NONE)));
    }

    fn type_text(app: &mut App<MemoryStore>, text: &str) {
        for c in text.chars() {
            press(app, KeyCode::Char(c));
        }
    }

    fn app() -> App<MemoryStore> {
        let (tx, _rx) = mpsc::unbounded_channel();
        App::new(SessionConfig::default(), None, NoteStore::new(MemoryStore::default()), tx)
    }

    #[test]
    fn test_char_to_byte_index_multibyte() {
        assert_eq!(char_to_byte_index("héllo", 2), 3);
        assert_eq!(char_to_byte_index("abc", 10), 3);
    }

    #[test]
    fn test_typing_and_enter_sends() {
        let mut app = app();
        type_text(&mut app, "Hellx");
        press(&mut app, KeyCode::Backspace);
        type_text(&mut app, "o");
        press(&mut app, KeyCode::Enter);

        let rows = app.message_rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].role, ChatRole::User);
        assert_eq!(rows[0].content, "Hello");
        assert!(app.input.is_empty());
    }

    #[test]
    fn test_persona_picker_via_keys() {
        let mut app = app();
        press(&mut app, KeyCode::Esc);
        press(&mut app, KeyCode::Char('p'));
        assert_eq!(app.popup, Some(Popup::PersonaPicker));

        press(&mut app, KeyCode::Down);
        press(&mut app, KeyCode::Enter);
        assert_eq!(app.popup, None);
        assert_eq!(app.session.config().persona, Persona::Guide);
        assert_eq!(app.session.transcript().len(), 1);
    }

    #[test]
    fn test_saved_view_opens_and_closes() {
        let mut app = app();
        type_text(&mut app, "Good idea");
        press(&mut app, KeyCode::Enter);
        press(&mut app, KeyCode::Esc);
        press(&mut app, KeyCode::Char('s'));
        press(&mut app, KeyCode::Char('v'));
        assert_eq!(app.popup, Some(Popup::SavedNotes));
        assert_eq!(app.saved_notes.len(), 1);

        press(&mut app, KeyCode::Char('q'));
        assert_eq!(app.popup, None);
        assert!(!app.should_quit);
    }
}

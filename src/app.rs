use ratatui::widgets::ListState;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{error, warn};

use crate::completion::{CompletionClient, CompletionReply};
use crate::config::Config;
use crate::error::ChatError;
use crate::notes::{FileStore, KeyValueStore, NoteStore, SavedNote};
use crate::session::{CompletionRequest, Session};
use crate::state::{ChatRole, Persona, ResponseLength, SessionConfig};
use crate::tui::AppEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Popup {
    PersonaPicker,
    LengthPicker,
    SavedNotes,
}

/// A transcript entry as shown in the chat pane
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRow {
    pub id: u64,
    pub role: ChatRole,
    pub content: String,
}

pub struct App<S: KeyValueStore = FileStore> {
    pub should_quit: bool,
    pub input_mode: InputMode,
    pub popup: Option<Popup>,

    // Send box
    pub input: String,
    pub cursor: usize,

    // Chat pane
    pub session: Session,
    pub selected_row: Option<usize>,
    pub chat_scroll: u16,
    pub chat_height: u16,
    pub chat_width: u16,
    pub animation_frame: u8,

    // Popups
    pub picker_state: ListState,
    pub saved_notes: Vec<SavedNote>,
    pub saved_state: ListState,

    /// Footer message for save/list outcomes
    pub status: Option<String>,
    pub model: String,

    client: Option<CompletionClient>,
    notes: NoteStore<S>,
    events: UnboundedSender<AppEvent>,
    remember_config: bool,
}

impl<S: KeyValueStore> App<S> {
    pub fn new(
        config: SessionConfig,
        client: Option<CompletionClient>,
        notes: NoteStore<S>,
        events: UnboundedSender<AppEvent>,
    ) -> Self {
        let model = client
            .as_ref()
            .map(|c| c.model().to_string())
            .unwrap_or_else(|| "no model".to_string());

        Self {
            should_quit: false,
            input_mode: InputMode::Editing,
            popup: None,

            input: String::new(),
            cursor: 0,

            session: Session::new(config),
            selected_row: None,
            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,
            animation_frame: 0,

            picker_state: ListState::default(),
            saved_notes: Vec::new(),
            saved_state: ListState::default(),

            status: None,
            model,

            client,
            notes,
            events,
            remember_config: false,
        }
    }

    /// Persist persona/length changes to the config file
    pub fn with_remembered_config(mut self) -> Self {
        self.remember_config = true;
        self
    }

    /// Send the opening directive for the configured persona
    pub fn start(&mut self) {
        let request = self.session.start();
        self.dispatch(request);
    }

    /// Transcript rows visible to the user; system directives stay hidden
    pub fn message_rows(&self) -> Vec<MessageRow> {
        self.session
            .transcript()
            .iter()
            .filter(|entry| entry.role != ChatRole::System)
            .map(|entry| MessageRow {
                id: entry.id,
                role: entry.role,
                content: entry.content.clone(),
            })
            .collect()
    }

    pub fn send_input(&mut self) {
        let text = std::mem::take(&mut self.input);
        self.cursor = 0;
        self.selected_row = None;
        self.status = None;
        let request = self.session.submit_user_message(text);
        self.dispatch(request);
        self.scroll_to_bottom();
    }

    pub fn change_persona(&mut self, persona: Persona) {
        let current = self.session.config();
        if persona != current.persona {
            self.apply_configuration(persona, current.response_length);
        }
    }

    pub fn change_length(&mut self, length: ResponseLength) {
        let current = self.session.config();
        if length != current.response_length {
            self.apply_configuration(current.persona, length);
        }
    }

    fn apply_configuration(&mut self, persona: Persona, length: ResponseLength) {
        let request = self.session.apply_configuration(persona, length);
        self.dispatch(request);
        self.scroll_to_bottom();

        if self.remember_config {
            if let Err(e) = Config::save_session_config(self.session.config()) {
                warn!(error = %e, "could not remember session configuration");
            }
        }
    }

    /// Feed a finished completion back into the session
    pub fn handle_completion(&mut self, ticket: u64, result: Result<CompletionReply, ChatError>) {
        let follow_up = self.session.finish(ticket, result);
        self.dispatch(follow_up);
        self.scroll_to_bottom();
    }

    fn dispatch(&mut self, mut request: Option<CompletionRequest>) {
        while let Some(CompletionRequest { ticket, messages, max_tokens }) = request.take() {
            let Some(client) = self.client.clone() else {
                request = self.session.on_completion_failure(ticket, &ChatError::MissingApiKey);
                continue;
            };

            let events = self.events.clone();
            tokio::spawn(async move {
                let result = client.request_completion(&messages, max_tokens).await;
                if events.send(AppEvent::Completion { ticket, result }).is_err() {
                    warn!(ticket, "completion finished after the event loop closed");
                }
            });
        }
    }

    /// Bookmark the selected row, or the newest one when nothing is selected
    pub fn save_selected(&mut self) {
        let rows = self.message_rows();
        let row = match self.selected_row {
            Some(i) => rows.get(i),
            None => rows.last(),
        };
        let Some(row) = row else {
            self.status = Some("Nothing to save yet".to_string());
            return;
        };

        self.status = Some(match self.notes.append_note(&row.content) {
            Ok(_) => "Message saved".to_string(),
            Err(e) => {
                error!(error = %e, "saving message failed");
                format!("Could not save message: {e}")
            }
        });
    }

    pub fn open_saved_notes(&mut self) {
        match self.notes.list_notes() {
            Ok(notes) => {
                self.saved_state
                    .select(if notes.is_empty() { None } else { Some(0) });
                self.saved_notes = notes;
                self.popup = Some(Popup::SavedNotes);
            }
            Err(e) => {
                error!(error = %e, "loading saved messages failed");
                self.status = Some(format!("Could not load saved messages: {e}"));
            }
        }
    }

    pub fn open_persona_picker(&mut self) {
        let current = self.session.config().persona;
        let idx = Persona::all().iter().position(|p| *p == current);
        self.picker_state.select(idx);
        self.popup = Some(Popup::PersonaPicker);
    }

    pub fn open_length_picker(&mut self) {
        let current = self.session.config().response_length;
        let idx = ResponseLength::all().iter().position(|l| *l == current);
        self.picker_state.select(idx);
        self.popup = Some(Popup::LengthPicker);
    }

    pub fn close_popup(&mut self) {
        self.popup = None;
    }

    fn picker_len(&self) -> usize {
        match self.popup {
            Some(Popup::PersonaPicker) => Persona::all().len(),
            Some(Popup::LengthPicker) => ResponseLength::all().len(),
            Some(Popup::SavedNotes) => self.saved_notes.len(),
            None => 0,
        }
    }

    pub fn popup_nav_down(&mut self) {
        let len = self.picker_len();
        let state = if self.popup == Some(Popup::SavedNotes) {
            &mut self.saved_state
        } else {
            &mut self.picker_state
        };
        if len > 0 {
            let i = state.selected().unwrap_or(0);
            state.select(Some((i + 1).min(len - 1)));
        }
    }

    pub fn popup_nav_up(&mut self) {
        let state = if self.popup == Some(Popup::SavedNotes) {
            &mut self.saved_state
        } else {
            &mut self.picker_state
        };
        let i = state.selected().unwrap_or(0);
        state.select(Some(i.saturating_sub(1)));
    }

    /// Apply the highlighted picker option and close the popup
    pub fn confirm_picker(&mut self) {
        let selected = self.picker_state.selected();
        match self.popup {
            Some(Popup::PersonaPicker) => {
                if let Some(persona) = selected.and_then(|i| Persona::all().get(i).copied()) {
                    self.change_persona(persona);
                }
            }
            Some(Popup::LengthPicker) => {
                if let Some(length) = selected.and_then(|i| ResponseLength::all().get(i).copied()) {
                    self.change_length(length);
                }
            }
            Some(Popup::SavedNotes) | None => {}
        }
        self.popup = None;
    }

    pub fn select_next_row(&mut self) {
        let len = self.message_rows().len();
        if len == 0 {
            return;
        }
        self.selected_row = match self.selected_row {
            Some(i) if i + 1 < len => Some(i + 1),
            Some(_) | None => Some(len - 1),
        };
    }

    pub fn select_prev_row(&mut self) {
        let len = self.message_rows().len();
        if len == 0 {
            return;
        }
        self.selected_row = match self.selected_row {
            Some(i) => Some(i.saturating_sub(1)),
            None => Some(len - 1),
        };
    }

    pub fn tick_animation(&mut self) {
        if self.session.is_composing() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    /// Footer text: local status first, then the last completion failure
    pub fn status_line(&self) -> Option<String> {
        self.status.clone().or_else(|| {
            self.session
                .last_error()
                .map(|e| format!("Last message failed: {e}"))
        })
    }

    /// Scroll chat to bottom so the newest message and "Thinking..." are visible
    pub fn scroll_to_bottom(&mut self) {
        // Use actual chat width for wrap calculation, default to 50 if not set
        let wrap_width = if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            50
        };

        let mut total_lines: u16 = 0;

        // Saturates: a huge transcript just pins the view to the bottom
        for row in self.message_rows() {
            total_lines = total_lines.saturating_add(1); // Role line ("You:" or "AI:")
            for line in row.content.lines() {
                let wrapped = line.chars().count() / wrap_width + 1;
                total_lines =
                    total_lines.saturating_add(u16::try_from(wrapped).unwrap_or(u16::MAX));
            }
            total_lines = total_lines.saturating_add(1); // Blank line after message
        }

        if self.session.is_composing() {
            total_lines = total_lines.saturating_add(2); // "AI:" + "Thinking..."
        }

        let visible_height = if self.chat_height > 0 {
            self.chat_height
        } else {
            20
        };

        self.chat_scroll = total_lines.saturating_sub(visible_height);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notes::{format_note_line, MemoryStore};
    use chrono::Local;
    use tokio::sync::mpsc;

    fn offline_app() -> (App<MemoryStore>, mpsc::UnboundedReceiver<AppEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let app = App::new(
            SessionConfig::default(),
            None,
            NoteStore::new(MemoryStore::default()),
            tx,
        );
        (app, rx)
    }

    fn reply(text: &str) -> CompletionReply {
        CompletionReply {
            role: ChatRole::Assistant,
            content: text.to_string(),
        }
    }

    #[test]
    fn test_rows_hide_system_entries() {
        let (mut app, _rx) = offline_app();
        app.start();
        app.input = "Hello".to_string();
        app.send_input();

        let rows = app.message_rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].role, ChatRole::User);
        assert_eq!(rows[0].content, "Hello");
        assert_eq!(app.session.transcript().len(), 2);
    }

    #[test]
    fn test_missing_client_fails_quietly() {
        let (mut app, _rx) = offline_app();
        app.input = "Hello".to_string();
        app.send_input();

        assert!(!app.session.is_composing());
        assert_eq!(app.message_rows().len(), 1);
        assert!(app.status_line().unwrap().contains("API key"));
    }

    #[test]
    fn test_picking_same_persona_adds_nothing() {
        let (mut app, _rx) = offline_app();
        app.change_persona(Persona::Friend);
        app.change_length(ResponseLength::Medium);
        assert!(app.session.transcript().is_empty());

        app.change_persona(Persona::Scholar);
        assert_eq!(app.session.transcript().len(), 1);
        assert_eq!(app.session.transcript()[0].content, "Act as scholar");
    }

    #[test]
    fn test_confirm_picker_applies_highlighted_length() {
        let (mut app, _rx) = offline_app();
        app.open_length_picker();
        assert_eq!(app.picker_state.selected(), Some(1));
        app.popup_nav_up();
        app.confirm_picker();

        assert_eq!(app.popup, None);
        assert_eq!(app.session.config().response_length, ResponseLength::Short);
        assert_eq!(app.session.transcript().last().unwrap().content, "Act as friend");
    }

    #[test]
    fn test_save_then_view_saved_notes() {
        let (mut app, _rx) = offline_app();
        app.input = "Good idea".to_string();
        app.send_input();
        app.save_selected();
        assert_eq!(app.status.as_deref(), Some("Message saved"));

        app.open_saved_notes();
        assert_eq!(app.popup, Some(Popup::SavedNotes));
        let last = app.saved_notes.last().unwrap();
        assert_eq!(last.text, "Good idea");

        let expected_date = last.saved_at.with_timezone(&Local).format("%B %-d").to_string();
        assert_eq!(
            format_note_line(last, &Local),
            format!("{expected_date} : Good idea")
        );
    }

    #[test]
    fn test_scroll_saturates_on_huge_transcript() {
        let (mut app, _rx) = offline_app();
        app.input = "a\n".repeat(70_000);
        app.send_input();
        assert_eq!(app.chat_scroll, u16::MAX - 20);

        let (mut app, _rx) = offline_app();
        app.chat_width = 1;
        app.chat_height = 10;
        app.input = "b".repeat(100_000);
        app.send_input();
        assert_eq!(app.chat_scroll, u16::MAX - 10);
    }

    #[test]
    fn test_save_with_no_rows_reports_status() {
        let (mut app, _rx) = offline_app();
        app.save_selected();
        assert_eq!(app.status.as_deref(), Some("Nothing to save yet"));
    }

    #[test]
    fn test_row_selection_saves_chosen_message() {
        let (mut app, _rx) = offline_app();
        for text in ["first", "second", "third"] {
            app.input = text.to_string();
            app.send_input();
        }
        app.select_prev_row();
        app.select_prev_row();
        assert_eq!(app.selected_row, Some(1));
        app.save_selected();

        app.open_saved_notes();
        assert_eq!(app.saved_notes[0].text, "second");
    }

    #[tokio::test]
    async fn test_completion_event_appends_reply() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        // Unreachable endpoint: the spawned request fails and reports back.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let client = CompletionClient::new(&format!("http://{addr}"), "test-key", "gpt-4o");
        let mut app = App::new(
            SessionConfig::default(),
            Some(client),
            NoteStore::new(MemoryStore::default()),
            tx,
        );

        app.input = "Hello".to_string();
        app.send_input();
        assert!(app.session.is_composing());

        let Some(AppEvent::Completion { ticket, result }) = rx.recv().await else {
            panic!("expected a completion event");
        };
        assert!(result.is_err());
        app.handle_completion(ticket, result);
        assert!(!app.session.is_composing());
        assert_eq!(app.message_rows().len(), 1);

        app.input = "Again".to_string();
        app.send_input();
        let Some(AppEvent::Completion { ticket, .. }) = rx.recv().await else {
            panic!("expected a completion event");
        };
        app.handle_completion(ticket, Ok(reply("Hi!")));
        let rows = app.message_rows();
        assert_eq!(rows.last().unwrap().role, ChatRole::Assistant);
        assert_eq!(rows.last().unwrap().content, "Hi!");
        assert!(app.status_line().is_none());
    }
}

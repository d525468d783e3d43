//! Event Handling - Keyboard input processing

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use std::path::PathBuf;
use std::time::Duration;

use super::state::{AppState, InputMode};
use crate::model::CaseNumber;

/// Actions that can be triggered by user input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Quit,
    Logout,
    Refresh,
    NextColumn,
    PrevColumn,
    ScrollUp,
    ScrollDown,
    /// Cycle the selected worker on the focused card
    CycleWorker,
    Assign,
    /// Path prompt opened or edited
    EditUpload,
    SubmitUpload { case_number: CaseNumber, path: PathBuf },
    CancelInput,
    None,
}

/// Handle keyboard events
pub fn handle_key_event(key: KeyEvent, state: &mut AppState) -> Action {
    if key.modifiers == KeyModifiers::CONTROL && key.code == KeyCode::Char('c') {
        return Action::Quit;
    }

    if matches!(state.input, InputMode::UploadPath { .. }) {
        return handle_upload_input(key, state);
    }

    match key.code {
        KeyCode::Char('q') => Action::Quit,
        KeyCode::Char('L') => Action::Logout,
        KeyCode::Char('r') => Action::Refresh,

        KeyCode::Tab | KeyCode::Right | KeyCode::Char('l') => {
            state.focus = state.focus.next();
            Action::NextColumn
        }
        KeyCode::BackTab | KeyCode::Left | KeyCode::Char('h') => {
            state.focus = state.focus.prev();
            Action::PrevColumn
        }
        KeyCode::Up | KeyCode::Char('k') => {
            state.move_selection(-1);
            Action::ScrollUp
        }
        KeyCode::Down | KeyCode::Char('j') => {
            state.move_selection(1);
            Action::ScrollDown
        }

        KeyCode::Char('w') if state.selected_task().is_some() => Action::CycleWorker,
        KeyCode::Char('a') | KeyCode::Enter if state.selected_task().is_some() => Action::Assign,
        KeyCode::Char('u') => match state.selected_task() {
            Some(task) => {
                state.input = InputMode::UploadPath {
                    case_number: task.case_number.clone(),
                    buffer: String::new(),
                };
                Action::EditUpload
            }
            None => Action::None,
        },

        _ => Action::None,
    }
}

fn handle_upload_input(key: KeyEvent, state: &mut AppState) -> Action {
    match key.code {
        KeyCode::Esc => {
            state.input = InputMode::Normal;
            Action::CancelInput
        }
        KeyCode::Enter => {
            let target = state.input.upload_target();
            state.input = InputMode::Normal;
            match target {
                Some((case_number, path)) => Action::SubmitUpload { case_number, path },
                None => Action::CancelInput,
            }
        }
        KeyCode::Backspace => {
            if let InputMode::UploadPath { buffer, .. } = &mut state.input {
                buffer.pop();
            }
            Action::EditUpload
        }
        KeyCode::Char(c) => {
            if let InputMode::UploadPath { buffer, .. } = &mut state.input {
                buffer.push(c);
            }
            Action::EditUpload
        }
        _ => Action::None,
    }
}

/// Poll for keyboard events with timeout
pub fn poll_event(timeout: Duration) -> std::io::Result<Option<KeyEvent>> {
    if event::poll(timeout)? {
        if let Event::Key(key) = event::read()? {
            return Ok(Some(key));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BoardSnapshot, Column, MessageSnapshot, Task};
    use crate::sync::{RefreshTrigger, SyncEvent};

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn state_with_task() -> AppState {
        let mut state = AppState::new("ops");
        state.apply(SyncEvent::SnapshotApplied {
            trigger: RefreshTrigger::Bootstrap,
            board: BoardSnapshot::empty()
                .with_column(Column::New, vec![Task::new("C-1", "Fiber cut")]),
            messages: MessageSnapshot::new(),
        });
        state
    }

    #[test]
    fn test_quit_action() {
        let mut state = AppState::new("ops");
        assert_eq!(handle_key_event(key(KeyCode::Char('q')), &mut state), Action::Quit);
    }

    #[test]
    fn test_ctrl_c_quit() {
        let mut state = AppState::new("ops");
        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(handle_key_event(ctrl_c, &mut state), Action::Quit);
    }

    #[test]
    fn test_tab_cycles_columns() {
        let mut state = AppState::new("ops");
        assert_eq!(state.focus, Column::New);
        handle_key_event(key(KeyCode::Tab), &mut state);
        assert_eq!(state.focus, Column::Pending);
        handle_key_event(key(KeyCode::BackTab), &mut state);
        assert_eq!(state.focus, Column::New);
    }

    #[test]
    fn test_card_actions_need_a_task() {
        let mut state = AppState::new("ops");
        assert_eq!(handle_key_event(key(KeyCode::Char('a')), &mut state), Action::None);
        assert_eq!(handle_key_event(key(KeyCode::Char('u')), &mut state), Action::None);

        let mut state = state_with_task();
        assert_eq!(handle_key_event(key(KeyCode::Char('a')), &mut state), Action::Assign);
        assert_eq!(
            handle_key_event(key(KeyCode::Char('w')), &mut state),
            Action::CycleWorker
        );
    }

    #[test]
    fn test_upload_prompt() {
        let mut state = state_with_task();
        handle_key_event(key(KeyCode::Char('u')), &mut state);
        for c in "/tmp/a.pdfx".chars() {
            handle_key_event(key(KeyCode::Char(c)), &mut state);
        }
        // 'q' is text while the prompt is open
        assert_ne!(handle_key_event(key(KeyCode::Char('q')), &mut state), Action::Quit);
        handle_key_event(key(KeyCode::Backspace), &mut state);
        handle_key_event(key(KeyCode::Backspace), &mut state);

        let action = handle_key_event(key(KeyCode::Enter), &mut state);
        assert_eq!(
            action,
            Action::SubmitUpload {
                case_number: "C-1".into(),
                path: PathBuf::from("/tmp/a.pdf"),
            }
        );
        assert_eq!(state.input, InputMode::Normal);
    }

    #[test]
    fn test_empty_upload_path_cancels() {
        let mut state = state_with_task();
        handle_key_event(key(KeyCode::Char('u')), &mut state);
        assert_eq!(
            handle_key_event(key(KeyCode::Enter), &mut state),
            Action::CancelInput
        );
    }
}

use crate::orchestrator::{dispatch, Action, AppState, Pipeline, UiCommand};
use crossterm::event::{KeyCode, KeyModifiers};
use std::path::PathBuf;

pub const TAB_VQA: usize = 0;
pub const TAB_OCR: usize = 1;
pub const TAB_HELP: usize = 2;
const TAB_COUNT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    /// Typing into the VQA question field.
    Question,
    /// Typing a file path for the given pipeline.
    Path(Pipeline),
}

/// What the event loop should do after an input.
#[derive(Debug)]
pub enum Flow {
    Send(Vec<UiCommand>),
    Copy(String),
    Quit,
}

impl Flow {
    fn none() -> Self {
        Flow::Send(Vec::new())
    }
}

pub struct UiState {
    pub tab: usize,
    pub mode: InputMode,
    /// Path prompt buffer; the question lives in `app.vqa.question`.
    pub path_input: String,
    pub app: AppState,
    pub base_url: String,
}

impl UiState {
    pub fn new(app: AppState, base_url: String) -> Self {
        Self {
            tab: TAB_VQA,
            mode: InputMode::Normal,
            path_input: String::new(),
            app,
            base_url,
        }
    }

    pub fn pipeline(&self) -> Option<Pipeline> {
        match self.tab {
            TAB_VQA => Some(Pipeline::Vqa),
            TAB_OCR => Some(Pipeline::Ocr),
            _ => None,
        }
    }

    fn act(&mut self, action: Action) -> Flow {
        Flow::Send(dispatch(&mut self.app, action))
    }

    pub fn on_key(&mut self, modifiers: KeyModifiers, code: KeyCode) -> Flow {
        if modifiers.contains(KeyModifiers::CONTROL) && code == KeyCode::Char('c') {
            return Flow::Quit;
        }
        match self.mode {
            InputMode::Question => self.on_question_key(code),
            InputMode::Path(target) => self.on_path_key(target, code),
            InputMode::Normal => self.on_normal_key(code),
        }
    }

    fn on_question_key(&mut self, code: KeyCode) -> Flow {
        match code {
            KeyCode::Esc => self.mode = InputMode::Normal,
            KeyCode::Enter => {
                self.mode = InputMode::Normal;
                return self.act(Action::Ask);
            }
            KeyCode::Backspace => {
                self.app.vqa.question.pop();
            }
            KeyCode::Char(c) => self.app.vqa.question.push(c),
            _ => {}
        }
        Flow::none()
    }

    fn on_path_key(&mut self, target: Pipeline, code: KeyCode) -> Flow {
        match code {
            KeyCode::Esc => {
                self.mode = InputMode::Normal;
                self.path_input.clear();
            }
            KeyCode::Enter => {
                self.mode = InputMode::Normal;
                let raw = std::mem::take(&mut self.path_input);
                let raw = raw.trim();
                if raw.is_empty() {
                    return Flow::none();
                }
                return self.act(Action::PickImage(target, PathBuf::from(raw)));
            }
            KeyCode::Backspace => {
                self.path_input.pop();
            }
            KeyCode::Char(c) => self.path_input.push(c),
            _ => {}
        }
        Flow::none()
    }

    fn on_normal_key(&mut self, code: KeyCode) -> Flow {
        match code {
            KeyCode::Char('q') => return Flow::Quit,
            KeyCode::Tab => self.tab = (self.tab + 1) % TAB_COUNT,
            KeyCode::BackTab => self.tab = (self.tab + TAB_COUNT - 1) % TAB_COUNT,
            KeyCode::Char('?') => self.tab = TAB_HELP,
            KeyCode::Char('x') | KeyCode::Esc => return self.act(Action::DismissNotification),
            KeyCode::Char('h') => return self.act(Action::CheckHealth),
            KeyCode::Char('o') => {
                if let Some(p) = self.pipeline() {
                    self.path_input.clear();
                    self.mode = InputMode::Path(p);
                }
            }
            _ => {
                return match self.tab {
                    TAB_VQA => self.on_vqa_key(code),
                    TAB_OCR => self.on_ocr_key(code),
                    _ => Flow::none(),
                }
            }
        }
        Flow::none()
    }

    fn on_vqa_key(&mut self, code: KeyCode) -> Flow {
        match code {
            KeyCode::Char('i') => {
                self.mode = InputMode::Question;
                Flow::none()
            }
            KeyCode::Enter => self.act(Action::Ask),
            KeyCode::Char('c') => self.act(Action::ClearVqaImage),
            KeyCode::Char('s') => self.act(Action::ClearSession),
            KeyCode::Char('e') => self.act(Action::ExportTranscript),
            _ => Flow::none(),
        }
    }

    fn on_ocr_key(&mut self, code: KeyCode) -> Flow {
        match code {
            KeyCode::Char('r') | KeyCode::Enter => self.act(Action::Recognize),
            KeyCode::Char('l') => self.act(Action::CycleLanguage),
            KeyCode::Char('c') => self.act(Action::ClearOcrImage),
            KeyCode::Char('d') => self.act(Action::Download),
            KeyCode::Char('y') => match self.app.ocr.task() {
                Some(task) => Flow::Copy(task.result_text.clone()),
                None => Flow::none(),
            },
            _ => Flow::none(),
        }
    }

    /// Bracketed paste. A path pasted outside the question field counts as a
    /// dropped file, which is what terminals deliver on drag-and-drop.
    pub fn on_paste(&mut self, text: &str) -> Flow {
        match self.mode {
            InputMode::Question => {
                self.app
                    .vqa
                    .question
                    .extend(text.chars().filter(|c| !c.is_control()));
                Flow::none()
            }
            InputMode::Path(target) => {
                self.mode = InputMode::Normal;
                self.path_input.clear();
                self.act(Action::DropImage(target, text.to_string()))
            }
            InputMode::Normal => match self.pipeline() {
                Some(target) => self.act(Action::DropImage(target, text.to_string())),
                None => Flow::none(),
            },
        }
    }
}

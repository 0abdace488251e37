//! Application state and logic.

use crate::action::{Action, CameraGrant};
use crate::log_buffer::LogBuffer;
use crate::theme::{Palette, Theme};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use qrkit_core::display::{actions_for_decoded, as_link};
use qrkit_core::{
    AppConfig, DecodeAdapter, DragData, ErrorCorrection, FrameStep, GenerationRequest,
    GenerationTrigger, GenerationView, MAX_IMAGE_SIZE, QrError, RenderOptions, ResultAction,
    ScanController, ScanState, TextStats, TextTool,
};

/// Smallest image size offered by the size keys.
const MIN_SIZE: u32 = 64;
const SIZE_STEP: u32 = 32;

/// Current tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum View {
    #[default]
    Generate,
    Scan,
    Decode,
    Tools,
    Logs,
}

impl View {
    pub fn all() -> &'static [View] {
        &[View::Generate, View::Scan, View::Decode, View::Tools, View::Logs]
    }

    pub fn label(&self) -> &'static str {
        match self {
            View::Generate => "Generate",
            View::Scan => "Scan",
            View::Decode => "Decode",
            View::Tools => "Tools",
            View::Logs => "Logs",
        }
    }

    pub fn index(&self) -> usize {
        Self::all().iter().position(|v| v == self).unwrap_or(0)
    }

    pub fn from_index(index: usize) -> View {
        Self::all().get(index).copied().unwrap_or_default()
    }

    fn next(&self) -> View {
        Self::from_index((self.index() + 1) % Self::all().len())
    }

    fn prev(&self) -> View {
        let len = Self::all().len();
        Self::from_index((self.index() + len - 1) % len)
    }
}

/// Input mode for the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    #[default]
    Normal,
    /// Typing into the current tab's text field.
    Editing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLevel {
    Info,
    Success,
    Error,
}

/// One-line message shown in the footer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub level: StatusLevel,
    pub text: String,
}

/// State of the decode tab.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DecodeState {
    #[default]
    Idle,
    Loading(String),
    Done(String),
    Failed(QrError),
}

/// Application state.
pub struct App {
    pub theme: Theme,
    pub palette: Palette,
    pub current_view: View,
    pub input_mode: InputMode,
    pub showing_help: bool,
    pub should_quit: bool,
    pub status: Option<StatusMessage>,
    tick_count: u64,

    // Generate
    pub generate_input: String,
    pub error_correction: ErrorCorrection,
    pub render_options: RenderOptions,
    pub generator: GenerationTrigger,

    // Scan
    pub scan: ScanController,
    pub scan_result: Option<String>,
    pub scan_error: Option<QrError>,

    // Decode
    pub decoder: DecodeAdapter,
    pub decode_input: String,
    pub decode_state: DecodeState,
    decode_seq: u64,

    // Tools
    pub tool: TextTool,
    pub tool_input: String,

    // Logs
    pub log_buffer: LogBuffer,
    /// Log scroll offset (0 = most recent).
    pub log_scroll: usize,
}

impl App {
    pub fn new(
        config: &AppConfig,
        theme: Theme,
        generator: GenerationTrigger,
        decoder: DecodeAdapter,
        log_buffer: LogBuffer,
    ) -> Self {
        Self {
            theme,
            palette: theme.palette(),
            current_view: View::default(),
            input_mode: InputMode::default(),
            showing_help: false,
            should_quit: false,
            status: None,
            tick_count: 0,
            generate_input: String::new(),
            error_correction: config.error_correction,
            render_options: config.render_options(),
            generator,
            scan: ScanController::new(decoder.clone()),
            scan_result: None,
            scan_error: None,
            decoder,
            decode_input: String::new(),
            decode_state: DecodeState::Idle,
            decode_seq: 0,
            tool: TextTool::default(),
            tool_input: String::new(),
            log_buffer,
            log_scroll: 0,
        }
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn spinner_char(&self) -> char {
        const SPINNER: [char; 4] = ['|', '/', '-', '\\'];
        SPINNER[(self.tick_count / 3 % 4) as usize]
    }

    pub fn set_status(&mut self, level: StatusLevel, text: impl Into<String>) {
        self.status = Some(StatusMessage {
            level,
            text: text.into(),
        });
    }

    pub fn report(&mut self, result: Result<String, String>) {
        match result {
            Ok(text) => self.set_status(StatusLevel::Success, text),
            Err(text) => self.set_status(StatusLevel::Error, text),
        }
    }

    /// One refresh tick: sample at most one camera frame.
    pub fn tick(&mut self) {
        self.tick_count = self.tick_count.wrapping_add(1);

        let Some(ticket) = self.scan.request_frame() else {
            return;
        };
        match self.scan.process_frame(ticket) {
            FrameStep::Decoded(text) => {
                self.set_status(StatusLevel::Success, "QR code scanned");
                self.scan_result = Some(text);
            }
            FrameStep::Failed(err) => {
                self.set_status(StatusLevel::Error, err.to_string());
                self.scan_error = Some(err);
            }
            FrameStep::Continue | FrameStep::Discarded => {}
        }
    }

    // ==================== Keys ====================

    pub fn handle_key(&mut self, key: KeyEvent) -> Option<Action> {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return Some(Action::Quit);
        }
        if self.showing_help {
            if matches!(key.code, KeyCode::Esc | KeyCode::Char('?') | KeyCode::Char('q')) {
                self.showing_help = false;
            }
            return None;
        }
        match self.input_mode {
            InputMode::Editing => self.handle_editing_key(key),
            InputMode::Normal => self.handle_normal_key(key),
        }
    }

    fn handle_normal_key(&mut self, key: KeyEvent) -> Option<Action> {
        match key.code {
            KeyCode::Char('q') => return Some(Action::Quit),
            KeyCode::Char('?') => {
                self.showing_help = true;
                return None;
            }
            KeyCode::Tab => {
                self.switch_view(self.current_view.next());
                return None;
            }
            KeyCode::BackTab => {
                self.switch_view(self.current_view.prev());
                return None;
            }
            KeyCode::Char(c @ '1'..='5') => {
                self.switch_view(View::from_index(c as usize - '1' as usize));
                return None;
            }
            KeyCode::Char('T') => {
                self.theme = self.theme.toggle();
                self.palette = self.theme.palette();
                return None;
            }
            KeyCode::PageUp => {
                self.scroll_logs_up();
                return None;
            }
            KeyCode::PageDown => {
                self.scroll_logs_down();
                return None;
            }
            _ => {}
        }

        match self.current_view {
            View::Generate => self.handle_generate_key(key),
            View::Scan => self.handle_scan_key(key),
            View::Decode => self.handle_decode_key(key),
            View::Tools => self.handle_tools_key(key),
            View::Logs => self.handle_logs_key(key),
        }
    }

    fn switch_view(&mut self, view: View) {
        if self.current_view == View::Scan && view != View::Scan && self.scan.state().is_active() {
            // Leaving the scan tab releases the camera.
            self.scan.stop();
        }
        self.current_view = view;
    }

    fn handle_generate_key(&mut self, key: KeyEvent) -> Option<Action> {
        match key.code {
            KeyCode::Char('e') | KeyCode::Char('i') | KeyCode::Enter => {
                self.input_mode = InputMode::Editing;
            }
            KeyCode::Char('l') => {
                self.error_correction = self.error_correction.next();
                self.regenerate();
            }
            KeyCode::Char('+') | KeyCode::Char('=') => {
                self.render_options.size =
                    (self.render_options.size + SIZE_STEP).min(MAX_IMAGE_SIZE);
                self.regenerate();
            }
            KeyCode::Char('-') => {
                self.render_options.size = self
                    .render_options
                    .size
                    .saturating_sub(SIZE_STEP)
                    .max(MIN_SIZE);
                self.regenerate();
            }
            KeyCode::Char('y') if self.generator.view().image().is_some() => {
                return Some(Action::CopyText(self.generate_input.clone()));
            }
            KeyCode::Char('c') if self.generator.view().image().is_some() => {
                return Some(Action::CopyImage);
            }
            KeyCode::Char('s') if self.generator.view().image().is_some() => {
                return Some(Action::SavePng);
            }
            KeyCode::Char('x') => {
                self.generate_input.clear();
                self.regenerate();
            }
            _ => {}
        }
        None
    }

    fn handle_scan_key(&mut self, key: KeyEvent) -> Option<Action> {
        match key.code {
            KeyCode::Char('s') | KeyCode::Enter => return self.start_scan(),
            KeyCode::Char('x') | KeyCode::Esc => {
                self.scan.stop();
            }
            KeyCode::Char('y') => {
                return self.scan_result.clone().map(Action::CopyText);
            }
            KeyCode::Char('o') => {
                return self.scan_result.as_deref().and_then(link_action);
            }
            _ => {}
        }
        None
    }

    fn handle_decode_key(&mut self, key: KeyEvent) -> Option<Action> {
        match key.code {
            KeyCode::Char('e') | KeyCode::Char('i') => {
                self.input_mode = InputMode::Editing;
            }
            KeyCode::Enter => return self.submit_decode(),
            KeyCode::Char('p') => {
                let id = self.begin_decode("clipboard image");
                return Some(Action::PasteImage { id });
            }
            KeyCode::Char('y') => {
                if let DecodeState::Done(text) = &self.decode_state {
                    return Some(Action::CopyText(text.clone()));
                }
            }
            KeyCode::Char('o') => {
                if let DecodeState::Done(text) = &self.decode_state {
                    return link_action(text);
                }
            }
            _ => {}
        }
        None
    }

    fn handle_tools_key(&mut self, key: KeyEvent) -> Option<Action> {
        match key.code {
            KeyCode::Char('e') | KeyCode::Char('i') | KeyCode::Enter => {
                self.input_mode = InputMode::Editing;
            }
            KeyCode::Right | KeyCode::Char(']') | KeyCode::Char('l') => {
                self.tool = self.tool.next();
            }
            KeyCode::Left | KeyCode::Char('[') | KeyCode::Char('h') => {
                self.tool = self.tool.prev();
            }
            KeyCode::Char('y') => {
                if let Ok(output) = self.tool_output() {
                    return Some(Action::CopyText(output));
                }
            }
            KeyCode::Char('x') => self.tool_input.clear(),
            _ => {}
        }
        None
    }

    fn handle_logs_key(&mut self, key: KeyEvent) -> Option<Action> {
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => self.scroll_logs_up(),
            KeyCode::Down | KeyCode::Char('j') => self.scroll_logs_down(),
            KeyCode::End | KeyCode::Char('G') => self.log_scroll = 0,
            _ => {}
        }
        None
    }

    fn handle_editing_key(&mut self, key: KeyEvent) -> Option<Action> {
        match key.code {
            KeyCode::Esc => {
                self.input_mode = InputMode::Normal;
            }
            KeyCode::Enter => {
                self.input_mode = InputMode::Normal;
                if self.current_view == View::Decode {
                    return self.submit_decode();
                }
            }
            KeyCode::Backspace => {
                if let Some(field) = self.active_field() {
                    field.pop();
                }
                self.on_field_changed();
            }
            KeyCode::Char(c) => {
                if let Some(field) = self.active_field() {
                    field.push(c);
                }
                self.on_field_changed();
            }
            _ => {}
        }
        None
    }

    fn active_field(&mut self) -> Option<&mut String> {
        match self.current_view {
            View::Generate => Some(&mut self.generate_input),
            View::Decode => Some(&mut self.decode_input),
            View::Tools => Some(&mut self.tool_input),
            View::Scan | View::Logs => None,
        }
    }

    fn on_field_changed(&mut self) {
        if self.current_view == View::Generate {
            self.regenerate();
        }
    }

    /// Bracketed paste. While editing it goes into the field; otherwise it is
    /// treated as a drop and decoded.
    pub fn handle_paste(&mut self, text: String) -> Option<Action> {
        if self.input_mode == InputMode::Editing && self.current_view != View::Decode {
            if let Some(field) = self.active_field() {
                field.push_str(&text);
            }
            self.on_field_changed();
            return None;
        }

        self.input_mode = InputMode::Normal;
        self.switch_view(View::Decode);
        self.decode_input = text.trim().to_string();
        let id = self.begin_decode("dropped content");
        Some(Action::Decode {
            id,
            data: DragData::from_text(text),
        })
    }

    // ==================== Generate ====================

    /// Feed the current text and options to the debounced generator.
    pub fn regenerate(&mut self) {
        match GenerationRequest::with_options(
            self.generate_input.clone(),
            self.error_correction,
            self.render_options,
        ) {
            Ok(request) => {
                self.generator.on_input(request);
            }
            Err(err) => self.set_status(StatusLevel::Error, err.to_string()),
        }
    }

    pub fn generation_view(&self) -> &GenerationView {
        self.generator.view()
    }

    // ==================== Scan ====================

    fn start_scan(&mut self) -> Option<Action> {
        match self.scan.begin_start() {
            Ok(token) => {
                self.scan_result = None;
                self.scan_error = None;
                self.set_status(StatusLevel::Info, "Requesting camera...");
                Some(Action::RequestCamera(token))
            }
            Err(err) => {
                self.set_status(StatusLevel::Error, err.to_string());
                None
            }
        }
    }

    pub fn on_camera_response(&mut self, token: qrkit_core::RequestToken, grant: CameraGrant) {
        match self.scan.finish_start(token, grant.0) {
            Ok(()) if self.scan.state() == ScanState::Scanning => {
                self.set_status(StatusLevel::Info, "Scanning, hold a QR code up to the camera");
            }
            Ok(()) => {}
            Err(err) => {
                self.set_status(StatusLevel::Error, err.to_string());
                self.scan_error = Some(err);
            }
        }
    }

    // ==================== Decode ====================

    fn submit_decode(&mut self) -> Option<Action> {
        let input = self.decode_input.trim().to_string();
        if input.is_empty() {
            self.set_status(StatusLevel::Error, "Enter a path, URL or data URL first");
            return None;
        }
        let id = self.begin_decode(&input);
        Some(Action::Decode {
            id,
            data: DragData::from_text(input),
        })
    }

    fn begin_decode(&mut self, label: &str) -> u64 {
        self.decode_seq += 1;
        self.decode_state = DecodeState::Loading(label.to_string());
        self.decode_seq
    }

    /// Apply a finished decode unless a newer one was started since.
    pub fn on_decode_finished(&mut self, id: u64, result: Result<String, QrError>) {
        if id != self.decode_seq {
            tracing::debug!("Ignoring stale decode {} (latest {})", id, self.decode_seq);
            return;
        }
        self.decode_state = match result {
            Ok(text) => {
                self.set_status(StatusLevel::Success, "QR code decoded");
                DecodeState::Done(text)
            }
            Err(err) => {
                self.set_status(StatusLevel::Error, err.to_string());
                DecodeState::Failed(err)
            }
        };
    }

    /// Actions available for the result shown on the current tab.
    pub fn current_actions(&self) -> Vec<ResultAction> {
        match self.current_view {
            View::Scan => self
                .scan_result
                .as_deref()
                .map(actions_for_decoded)
                .unwrap_or_default(),
            View::Decode => match &self.decode_state {
                DecodeState::Done(text) => actions_for_decoded(text),
                _ => Vec::new(),
            },
            View::Generate => self
                .generator
                .view()
                .image()
                .map(qrkit_core::display::actions_for_generated)
                .unwrap_or_default(),
            View::Tools | View::Logs => Vec::new(),
        }
    }

    // ==================== Tools ====================

    pub fn tool_output(&self) -> Result<String, QrError> {
        self.tool.apply(&self.tool_input)
    }

    pub fn tool_stats(&self) -> TextStats {
        TextStats::of(&self.tool_input)
    }

    // ==================== Logs ====================

    pub fn scroll_logs_up(&mut self) {
        let log_count = self.log_buffer.len();
        if log_count > 3 {
            self.log_scroll = (self.log_scroll + 1).min(log_count.saturating_sub(3));
        }
    }

    pub fn scroll_logs_down(&mut self) {
        self.log_scroll = self.log_scroll.saturating_sub(1);
    }
}

fn link_action(text: &str) -> Option<Action> {
    as_link(text).map(|url| Action::OpenLink(url.to_string()))
}

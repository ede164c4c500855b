use crate::client::ChatSession;
use crate::cycle::{CycleOutcome, Renderer};
use crossterm::cursor::MoveTo;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, size};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Paragraph, Widget, Wrap};
use ratatui::{Frame, Terminal, TerminalOptions, Viewport};
use std::io;
use std::io::Write;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

type TuiTerminal = Terminal<CrosstermBackend<io::Stdout>>;
type UiResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

const INPUT_HEIGHT: u16 = 6;
const ANSWER_HEIGHT: u16 = 10;

// Restores terminal settings even if the loop exits early.
struct TerminalGuard;

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = io::stdout().flush();
    }
}

#[derive(Debug, Clone, PartialEq)]
enum ChatMessage {
    User(String),
    Assistant(String),
    Failed(String),
}

impl ChatMessage {
    fn from_outcome(outcome: &CycleOutcome) -> Self {
        match outcome {
            CycleOutcome::Completed(text) => ChatMessage::Assistant(text.clone()),
            CycleOutcome::Failed(_) => ChatMessage::Failed(outcome.text().to_string()),
        }
    }

    fn lines(&self) -> Vec<(String, Style)> {
        let (header, body, color) = match self {
            ChatMessage::User(body) => ("You:", body, Color::Blue),
            ChatMessage::Assistant(body) => ("Assistant:", body, Color::Yellow),
            ChatMessage::Failed(body) => ("Assistant:", body, Color::Red),
        };

        let body_style = Style::default().fg(color);
        let mut lines = vec![(header.to_string(), body_style.add_modifier(Modifier::BOLD))];
        lines.extend(body.lines().map(|line| (format!("  {}", line), body_style)));
        lines
    }

    fn to_text(&self) -> Text<'static> {
        Text::from(
            self.lines()
                .into_iter()
                .map(|(text, style)| Line::from(Span::styled(text, style)))
                .collect::<Vec<_>>(),
        )
    }

    fn rendered_height(&self, width: u16) -> u16 {
        let width = width.max(1) as usize;
        let total: usize = self
            .lines()
            .iter()
            .map(|(text, _)| text.chars().count().max(1).div_ceil(width))
            .sum();
        total.min(u16::MAX as usize) as u16
    }
}

enum UiEvent {
    Partial(String),
    Finished {
        session: ChatSession,
        outcome: CycleOutcome,
    },
}

/// Forwards every presented answer to the UI loop. A partial dropped on a
/// full channel is superseded by the next one, and the terminal value
/// always arrives through `UiEvent::Finished`.
struct ChannelRenderer {
    sender: mpsc::Sender<UiEvent>,
}

impl Renderer for ChannelRenderer {
    fn present(&mut self, text: &str) {
        let _ = self.sender.try_send(UiEvent::Partial(text.to_string()));
    }
}

/// Streams an answer to a line-oriented writer by printing only the part
/// of each presented text not yet shown.
pub struct PrintRenderer<W: Write> {
    out: W,
    shown: String,
}

impl<W: Write> PrintRenderer<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            shown: String::new(),
        }
    }

    pub fn finish(&mut self) -> io::Result<()> {
        writeln!(self.out)?;
        self.out.flush()
    }
}

impl<W: Write> Renderer for PrintRenderer<W> {
    fn present(&mut self, text: &str) {
        let written = match text.strip_prefix(self.shown.as_str()) {
            Some(suffix) => write!(self.out, "{}", suffix),
            None if self.shown.is_empty() => write!(self.out, "{}", text),
            None => write!(self.out, "\n{}", text),
        };
        if let Err(err) = written.and_then(|_| self.out.flush()) {
            tracing::warn!("failed to write answer: {}", err);
        }
        self.shown = text.to_string();
    }
}

/// Multi-line prompt editor. The cursor column counts characters, not bytes.
#[derive(Debug)]
struct InputBuffer {
    lines: Vec<String>,
    row: usize,
    col: usize,
}

impl Default for InputBuffer {
    fn default() -> Self {
        Self {
            lines: vec![String::new()],
            row: 0,
            col: 0,
        }
    }
}

impl InputBuffer {
    fn line_len(&self, row: usize) -> usize {
        self.lines[row].chars().count()
    }

    fn byte_offset(&self) -> usize {
        self.lines[self.row]
            .char_indices()
            .nth(self.col)
            .map(|(idx, _)| idx)
            .unwrap_or(self.lines[self.row].len())
    }

    fn insert_char(&mut self, c: char) {
        let at = self.byte_offset();
        self.lines[self.row].insert(at, c);
        self.col += 1;
    }

    fn delete_char(&mut self) {
        if self.col > 0 {
            self.col -= 1;
            let at = self.byte_offset();
            self.lines[self.row].remove(at);
        } else if self.row > 0 {
            let tail = self.lines.remove(self.row);
            self.row -= 1;
            self.col = self.line_len(self.row);
            self.lines[self.row].push_str(&tail);
        }
    }

    fn new_line(&mut self) {
        let at = self.byte_offset();
        let tail = self.lines[self.row].split_off(at);
        self.lines.insert(self.row + 1, tail);
        self.row += 1;
        self.col = 0;
    }

    fn move_left(&mut self) {
        if self.col > 0 {
            self.col -= 1;
        } else if self.row > 0 {
            self.row -= 1;
            self.col = self.line_len(self.row);
        }
    }

    fn move_right(&mut self) {
        if self.col < self.line_len(self.row) {
            self.col += 1;
        } else if self.row + 1 < self.lines.len() {
            self.row += 1;
            self.col = 0;
        }
    }

    fn move_vertical(&mut self, down: bool) {
        let target = if down {
            (self.row + 1 < self.lines.len()).then_some(self.row + 1)
        } else {
            self.row.checked_sub(1)
        };
        if let Some(row) = target {
            self.row = row;
            self.col = self.col.min(self.line_len(row));
        }
    }

    fn home(&mut self) {
        self.col = 0;
    }

    fn end(&mut self) {
        self.col = self.line_len(self.row);
    }

    fn take(&mut self) -> String {
        let text = self.lines.join("\n");
        *self = Self::default();
        text
    }

    fn is_blank(&self) -> bool {
        self.lines.iter().all(|line| line.trim().is_empty())
    }

    fn render(&self) -> Text<'static> {
        if self.lines.iter().all(String::is_empty) {
            return Text::from(Span::styled(
                "Ask about movies and shows...",
                Style::default().fg(Color::DarkGray),
            ));
        }
        Text::from(
            self.lines
                .iter()
                .map(|line| Line::from(line.clone()))
                .collect::<Vec<_>>(),
        )
    }
}

struct App {
    // `None` while a cycle owns the session, which blocks new prompts.
    session: Option<ChatSession>,
    // Every message printed so far, kept with the style it was shown in.
    transcript: Vec<ChatMessage>,
    input: InputBuffer,
    answer: Option<String>,
    cancel: Option<CancellationToken>,
    sender: mpsc::Sender<UiEvent>,
    receiver: mpsc::Receiver<UiEvent>,
    should_quit: bool,
}

impl App {
    fn new(session: ChatSession) -> Self {
        let (sender, receiver) = mpsc::channel(100);

        Self {
            session: Some(session),
            transcript: Vec::new(),
            input: InputBuffer::default(),
            answer: None,
            cancel: None,
            sender,
            receiver,
            should_quit: false,
        }
    }

    fn is_streaming(&self) -> bool {
        self.session.is_none()
    }

    fn draw(&self, f: &mut Frame) {
        let [answer_area, input_area] =
            Layout::vertical([Constraint::Min(1), Constraint::Length(INPUT_HEIGHT)])
                .areas(f.area());

        if let Some(answer) = &self.answer {
            let message = if answer.is_empty() {
                ChatMessage::Assistant("Generating response...".to_string())
            } else {
                ChatMessage::Assistant(answer.clone())
            };
            // Keep the newest lines in view as the answer grows.
            let overflow = message
                .rendered_height(answer_area.width)
                .saturating_sub(answer_area.height);
            let paragraph = Paragraph::new(message.to_text())
                .wrap(Wrap { trim: false })
                .scroll((overflow, 0));
            f.render_widget(paragraph, answer_area);
        }

        let title = if self.is_streaming() {
            " Movie Recommender Chat (Esc to quit) [Generating...] "
        } else {
            " Movie Recommender Chat (Enter to send, Esc to quit) "
        };

        let input = Paragraph::new(self.input.render())
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(title)
                    .border_style(Style::default().fg(Color::DarkGray)),
            )
            .wrap(Wrap { trim: false });
        f.render_widget(input, input_area);

        let x = (input_area.x + 1 + self.input.col as u16).min(input_area.right().saturating_sub(2));
        let y = (input_area.y + 1 + self.input.row as u16).min(input_area.bottom().saturating_sub(2));
        f.set_cursor_position((x, y));
    }

    fn print_message(&self, terminal: &mut TuiTerminal, message: &ChatMessage) -> UiResult<()> {
        let width = terminal.size()?.width;
        let height = message.rendered_height(width).saturating_add(1);
        let mut text = message.to_text();
        text.extend(Text::raw("\n"));
        // Insert above the inline viewport so the log stays in scrollback.
        terminal.insert_before(height, |buf| {
            Paragraph::new(text)
                .wrap(Wrap { trim: false })
                .render(buf.area, buf);
        })?;
        Ok(())
    }

    fn replay_transcript(&self, terminal: &mut TuiTerminal) -> UiResult<()> {
        terminal.clear()?;
        for message in &self.transcript {
            self.print_message(terminal, message)?;
        }
        Ok(())
    }

    /// Takes the prompt and the session for a new cycle. Returns `None`,
    /// leaving the prompt in place, when the prompt is blank or a cycle
    /// already holds the session.
    fn begin_cycle(&mut self) -> Option<(ChatSession, String, CancellationToken)> {
        if self.input.is_blank() {
            return None;
        }
        let session = self.session.take()?;

        let prompt = self.input.take();
        self.transcript.push(ChatMessage::User(prompt.clone()));
        self.answer = Some(String::new());

        let cancel = CancellationToken::new();
        self.cancel = Some(cancel.clone());
        Some((session, prompt, cancel))
    }

    fn finish_cycle(&mut self, session: ChatSession, outcome: &CycleOutcome) -> &ChatMessage {
        tracing::debug!(turns = session.history().turns().len(), "cycle finished");
        self.answer = None;
        self.cancel = None;
        self.session = Some(session);
        self.transcript.push(ChatMessage::from_outcome(outcome));
        &self.transcript[self.transcript.len() - 1]
    }

    fn submit(&mut self, terminal: &mut TuiTerminal) -> UiResult<()> {
        let Some((mut session, prompt, cancel)) = self.begin_cycle() else {
            return Ok(());
        };
        self.print_message(terminal, &ChatMessage::User(prompt.clone()))?;

        let sender = self.sender.clone();
        tokio::spawn(async move {
            let mut renderer = ChannelRenderer {
                sender: sender.clone(),
            };
            let outcome = session.submit(&prompt, &mut renderer, &cancel).await;
            let _ = sender.send(UiEvent::Finished { session, outcome }).await;
        });

        Ok(())
    }

    fn quit(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
        self.should_quit = true;
    }

    fn handle_key(&mut self, terminal: &mut TuiTerminal, key: KeyEvent) -> UiResult<()> {
        if key.modifiers.contains(KeyModifiers::CONTROL) {
            match key.code {
                KeyCode::Char('c') => self.quit(),
                KeyCode::Char('l') => self.replay_transcript(terminal)?,
                _ => {}
            }
            return Ok(());
        }

        match key.code {
            KeyCode::Esc => self.quit(),
            KeyCode::Enter if key.modifiers.contains(KeyModifiers::SHIFT) => self.input.new_line(),
            KeyCode::Enter => self.submit(terminal)?,
            KeyCode::Char(c) => self.input.insert_char(c),
            KeyCode::Backspace => self.input.delete_char(),
            KeyCode::Left => self.input.move_left(),
            KeyCode::Right => self.input.move_right(),
            KeyCode::Up => self.input.move_vertical(false),
            KeyCode::Down => self.input.move_vertical(true),
            KeyCode::Home => self.input.home(),
            KeyCode::End => self.input.end(),
            _ => {}
        }
        Ok(())
    }

    fn handle_events(&mut self, terminal: &mut TuiTerminal) -> UiResult<()> {
        while let Ok(event) = self.receiver.try_recv() {
            match event {
                UiEvent::Partial(text) => {
                    if self.answer.is_some() {
                        self.answer = Some(text);
                    }
                }
                UiEvent::Finished { session, outcome } => {
                    let message = self.finish_cycle(session, &outcome).clone();
                    self.print_message(terminal, &message)?;
                }
            }
        }

        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                self.handle_key(terminal, key)?;
            }
        }

        Ok(())
    }
}

pub fn run_tui(session: ChatSession) -> UiResult<()> {
    enable_raw_mode()?;
    let _guard = TerminalGuard;

    let mut stdout = io::stdout();
    let (_, rows) = size()?;
    // Push existing screen content into scrollback without clearing it.
    for _ in 0..rows {
        writeln!(stdout)?;
    }
    stdout.flush()?;
    execute!(stdout, MoveTo(0, 0))?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::with_options(
        backend,
        TerminalOptions {
            viewport: Viewport::Inline(ANSWER_HEIGHT + INPUT_HEIGHT),
        },
    )?;

    let mut app = App::new(session);
    terminal.draw(|f| app.draw(f))?;

    while !app.should_quit {
        app.handle_events(&mut terminal)?;
        terminal.draw(|f| app.draw(f))?;
        std::thread::sleep(Duration::from_millis(10));
    }

    terminal.clear()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ChatClient, ClientConfig, DEFAULT_CONNECT_TIMEOUT};
    use crate::cycle::{ERROR_MESSAGE, FailureReason};

    fn app() -> App {
        let client = ChatClient::new(ClientConfig {
            api_url: "http://127.0.0.1:1".to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        })
        .unwrap();
        App::new(ChatSession::new(client))
    }

    fn typed(text: &str) -> InputBuffer {
        let mut buffer = InputBuffer::default();
        for ch in text.chars() {
            buffer.insert_char(ch);
        }
        buffer
    }

    #[test]
    fn shift_enter_splits_the_prompt() {
        let mut buffer = typed("hello");
        buffer.new_line();
        for ch in "world".chars() {
            buffer.insert_char(ch);
        }

        assert_eq!(buffer.row, 1);
        assert_eq!(buffer.take(), "hello\nworld");
        assert!(buffer.is_blank());
    }

    #[test]
    fn edits_multibyte_text_by_character() {
        let mut buffer = typed("Amélie");
        buffer.move_left();
        buffer.move_left();
        buffer.delete_char();
        buffer.insert_char('l');
        assert_eq!(buffer.col, 4);
        assert_eq!(buffer.take(), "Amélie");

        let mut buffer = typed("né");
        buffer.home();
        buffer.move_right();
        buffer.new_line();
        assert_eq!(buffer.lines, vec!["n".to_string(), "é".to_string()]);
    }

    #[test]
    fn backspace_at_line_start_joins_lines() {
        let mut buffer = typed("ab");
        buffer.new_line();
        buffer.insert_char('c');
        buffer.home();
        buffer.delete_char();
        assert_eq!(buffer.lines, vec!["abc".to_string()]);
        assert_eq!(buffer.col, 2);
    }

    #[test]
    fn failed_outcome_renders_the_error_message() {
        let message = ChatMessage::from_outcome(&CycleOutcome::Failed(FailureReason::Stream));
        assert_eq!(message, ChatMessage::Failed(ERROR_MESSAGE.to_string()));
    }

    #[test]
    fn print_renderer_writes_only_new_text() {
        let mut renderer = PrintRenderer::new(Vec::new());
        renderer.present("Try");
        renderer.present("Try Dune");
        renderer.present("Try Dune");
        renderer.present(ERROR_MESSAGE);
        renderer.finish().unwrap();

        let printed = String::from_utf8(renderer.out).unwrap();
        assert_eq!(printed, format!("Try Dune\n{}\n", ERROR_MESSAGE));
    }

    #[test]
    fn wraps_long_lines_when_measuring_height() {
        let message = ChatMessage::Assistant("x".repeat(30));
        // header + "  " prefix + 30 chars over a 10 column terminal
        assert_eq!(message.rendered_height(10), 1 + 4);
    }

    #[test]
    fn second_prompt_is_ignored_while_a_cycle_runs() {
        let mut app = app();
        app.input = typed("first");
        let (_session, prompt, _cancel) = app.begin_cycle().unwrap();
        assert_eq!(prompt, "first");
        assert!(app.is_streaming());

        app.input = typed("second");
        assert!(app.begin_cycle().is_none());
        assert_eq!(app.input.lines, vec!["second".to_string()]);
        assert_eq!(app.transcript, vec![ChatMessage::User("first".to_string())]);
    }

    #[test]
    fn blank_prompt_does_not_start_a_cycle() {
        let mut app = app();
        app.input = typed("   ");
        assert!(app.begin_cycle().is_none());
        assert!(!app.is_streaming());
    }

    #[test]
    fn transcript_keeps_failed_turns_and_is_available_mid_cycle() {
        let mut app = app();
        app.input = typed("first");
        let (session, _, _) = app.begin_cycle().unwrap();
        app.finish_cycle(session, &CycleOutcome::Failed(FailureReason::Disconnected));

        app.input = typed("second");
        let (_session, _, _) = app.begin_cycle().unwrap();
        assert!(app.is_streaming());
        assert_eq!(
            app.transcript,
            vec![
                ChatMessage::User("first".to_string()),
                ChatMessage::Failed(ERROR_MESSAGE.to_string()),
                ChatMessage::User("second".to_string()),
            ]
        );
        assert_eq!(app.transcript[1].lines()[0].1.fg, Some(Color::Red));
    }
}

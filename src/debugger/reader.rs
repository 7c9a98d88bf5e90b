use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufRead as _, BufReader, IsTerminal as _, Write as _};

use crossterm::{cursor, execute, terminal};

use crate::exec::Interrupt;
use crate::output::Output;
use crate::term::{self, Key};

/// Source of debugger command lines.
///
/// Lines from the `--command` argument are consumed first, then the stream
/// (piped stdin or interactive terminal). Commands are separated by newlines
/// or `;`.
#[derive(Debug)]
pub struct CommandReader {
    argument: Option<Argument>,
    stream: Stream,
}

/// A trait for objects which can yield a command line.
pub trait Read {
    /// `None` indicates end of input or a stop request while waiting.
    /// The returned slice may include surrounding whitespace.
    fn read(&mut self) -> Option<&str>;
}

/// Command-line argument.
#[derive(Debug)]
struct Argument {
    buffer: String,
    /// Byte index.
    cursor: usize,
}

/// Stdin or interactive terminal.
#[derive(Debug)]
enum Stream {
    Stdin(Stdin),
    Terminal(Terminal),
}

/// Stdin which is not attached to a terminal, i.e. piped.
#[derive(Debug)]
struct Stdin {
    buffer: String,
}

/// Interactive unbuffered terminal with line editing and history recall.
#[derive(Debug)]
struct Terminal {
    stderr: io::Stderr,
    /// Line being edited. ASCII only, so byte and char indices agree.
    buffer: String,
    cursor: usize,
    /// Byte index into an already-read multi-command line.
    head: usize,
    history: History,
}

/// In-session command history, backed by a file for recall across runs.
#[derive(Debug)]
struct History {
    list: Vec<String>,
    /// Focused item, or new entry if index == length.
    index: usize,
    /// `None` indicates failure to open the file.
    file: Option<File>,
}

/// Must be ASCII so its length equals its display width.
const PROMPT: &str = "(weft) ";

impl CommandReader {
    pub fn from(argument: Option<String>) -> Self {
        Self {
            argument: argument.map(Argument::from),
            stream: Stream::new(),
        }
    }
}

impl Read for CommandReader {
    fn read(&mut self) -> Option<&str> {
        // Read from the argument until exhausted, then fall back to the stream
        if let Some(argument) = &mut self.argument {
            if let Some(command) = argument.read() {
                echo_command(Some(command));
                return Some(command);
            }
        }
        self.stream.read()
    }
}

/// Print prompt and command, for sources which do not echo themselves.
fn echo_command(command: Option<&str>) {
    if command.is_some_and(|command| command.trim().is_empty()) {
        return;
    }
    dprint!(Sometimes, "{}", PROMPT);
    dprintln!(Sometimes, "{}", command.unwrap_or("(end of input)").trim());
}

impl Argument {
    fn from(source: String) -> Self {
        Self {
            buffer: source,
            cursor: 0,
        }
    }
}

impl Read for Argument {
    fn read(&mut self) -> Option<&str> {
        if self.cursor >= self.buffer.len() {
            return None;
        }

        // Take characters until delimiter
        let start = self.cursor;
        let rest = &self.buffer[start..];
        let end = match rest.find(['\n', ';']) {
            Some(index) => start + index,
            None => self.buffer.len(),
        };
        self.cursor = end + 1; // sizeof('\n' or ';')

        Some(&self.buffer[start..end])
    }
}

impl Stream {
    fn new() -> Self {
        if io::stdin().is_terminal() {
            Self::Terminal(Terminal::new())
        } else {
            Self::Stdin(Stdin::new())
        }
    }
}

impl Read for Stream {
    fn read(&mut self) -> Option<&str> {
        match self {
            Self::Stdin(stdin) => {
                let command = stdin.read();
                echo_command(command);
                command
            }
            Self::Terminal(terminal) => terminal.read(),
        }
    }
}

impl Stdin {
    fn new() -> Self {
        Self {
            buffer: String::new(),
        }
    }
}

impl Read for Stdin {
    fn read(&mut self) -> Option<&str> {
        // Bytes come through the shared reader channel so they stay in pipe
        // order with program input. Delimiters are ASCII and cannot land
        // inside a multi-byte UTF-8 sequence; the line is decoded whole.
        let mut bytes = Vec::new();
        loop {
            let Some(byte) = term::read_stdin_byte() else {
                if bytes.is_empty() {
                    return None; // First byte is EOF
                }
                break;
            };
            if byte == b'\n' || byte == b';' {
                break;
            }
            bytes.push(byte);
        }

        self.buffer = String::from_utf8_lossy(&bytes).into_owned();
        Some(&self.buffer)
    }
}

impl Terminal {
    fn new() -> Self {
        Self {
            stderr: io::stderr(),
            buffer: String::new(),
            cursor: 0,
            head: 0,
            history: History::new(),
        }
    }

    /// Returns `true` if editing a new command rather than a history item.
    fn is_next(&self) -> bool {
        debug_assert!(
            self.history.index <= self.history.list.len(),
            "index went past history"
        );
        self.history.index >= self.history.list.len()
    }

    /// Run before modifying the buffer: if focused on a history item, make it
    /// the editable line.
    fn edit_current(&mut self) {
        if self.is_next() {
            return;
        }
        self.buffer = self.history.list[self.history.index].clone();
        self.history.index = self.history.list.len();
    }

    fn current(&self) -> &str {
        if self.is_next() {
            &self.buffer
        } else {
            &self.history.list[self.history.index]
        }
    }

    /// Clear the current line, draw the prompt and input, set the cursor.
    fn print_prompt(&mut self) {
        execute!(
            self.stderr,
            terminal::Clear(terminal::ClearType::CurrentLine),
            cursor::MoveToColumn(0),
        )
        .expect("failed to clear line and move cursor");

        if Output::is_minimal() {
            write!(&self.stderr, "{}", PROMPT)
        } else {
            write!(&self.stderr, "\x1b[1m{}\x1b[0m", PROMPT)
        }
        .expect("failed to print debugger prompt");

        // Inline `self.current()` due to borrowing issues
        let current = if self.is_next() {
            &self.buffer
        } else {
            &self.history.list[self.history.index]
        };
        write!(self.stderr, "{}", current).expect("failed to print debugger input");

        execute!(
            self.stderr,
            cursor::MoveToColumn((PROMPT.len() + self.cursor) as u16),
        )
        .expect("failed to move cursor");
    }

    /// Returns `None` on Ctrl+C/Ctrl+D or an external stop request,
    /// `Some(true)` when a non-empty line has been entered.
    fn handle_key(&mut self, key: Key) -> Option<bool> {
        match key {
            Key::CtrlC => {
                Interrupt::raise();
                return None;
            }
            Key::CtrlD => return None,

            Key::Enter => {
                if self.is_next() && self.buffer.trim().is_empty() {
                    self.buffer.clear();
                    self.cursor = 0;
                } else {
                    self.edit_current();
                    return Some(true);
                }
            }

            Key::Char(ch) => {
                // Editing is ASCII-only to keep indices simple
                if ch.is_ascii() && !ch.is_ascii_control() {
                    self.edit_current();
                    self.buffer.insert(self.cursor, ch);
                    self.cursor += 1;
                }
            }

            Key::Backspace => {
                self.edit_current();
                if self.cursor > 0 {
                    self.cursor -= 1;
                    self.buffer.remove(self.cursor);
                }
            }
            Key::Delete => {
                self.edit_current();
                if self.cursor < self.buffer.len() {
                    self.buffer.remove(self.cursor);
                }
            }

            Key::Left => {
                self.cursor = self.cursor.saturating_sub(1);
            }
            Key::Right => {
                if self.cursor < self.current().len() {
                    self.cursor += 1;
                }
            }

            // Back/forth through history
            Key::Up => {
                if self.history.index > 0 {
                    self.history.index -= 1;
                    self.cursor = self.current().len();
                }
            }
            Key::Down => {
                if self.history.index < self.history.list.len() {
                    self.history.index += 1;
                    self.cursor = self.current().len();
                }
            }
        }
        Some(false)
    }

    /// Read keys until a non-empty line is entered. Returns `false` on
    /// end of input or a stop request.
    fn read_line_raw(&mut self) -> bool {
        term::enable_raw_mode();

        // Loop must `break`, not `return`, so raw mode is always restored
        let entered = loop {
            self.print_prompt();
            let Some(key) = term::read_key() else {
                break false; // Stop request while blocked
            };
            match self.handle_key(key) {
                Some(false) => continue,
                Some(true) => break true,
                None => break false,
            }
        };

        term::disable_raw_mode();
        eprintln!();
        entered
    }

    /// Read an entire (possibly multi-command) line from the terminal.
    /// Returns `false` on end of input.
    fn read_line(&mut self) -> bool {
        self.buffer.clear();
        self.cursor = 0;

        if !self.read_line_raw() {
            return false;
        }

        // Push to history unless identical to the previous command
        if self.history.list.last() != Some(&self.buffer) {
            self.history.push(self.buffer.clone());
        }
        self.history.index = self.history.list.len();
        true
    }

    /// Returns next command from the line buffer.
    fn next_command(&mut self) -> &str {
        let rest = &self.buffer[self.head..];
        match rest.find(';') {
            // Take first command and advance head
            Some(index) => {
                self.head += index + 1;
                &rest[..index]
            }
            // Rest of buffer is one command; reset head
            None => {
                self.head = 0;
                rest
            }
        }
    }
}

impl Read for Terminal {
    fn read(&mut self) -> Option<&str> {
        // Head at zero means the previous line is exhausted
        if self.head == 0 && !self.read_line() {
            return None;
        }
        Some(self.next_command())
    }
}

impl History {
    const FILE_NAME: &'static str = "weft-history";

    fn new() -> Self {
        let mut file = Self::open_file();
        let list = Self::read_file(file.as_mut());
        let index = list.len();
        Self { list, index, file }
    }

    /// Append to the in-session list and the history file.
    fn push(&mut self, command: String) {
        if let Some(file) = &mut self.file {
            if writeln!(file, "{}", command).is_err() {
                Self::report_error("failed to write to file");
            }
        }
        self.list.push(command);
    }

    /// Returns an empty list if the file could not be read.
    fn read_file(file: Option<&mut File>) -> Vec<String> {
        let Some(file) = file else {
            return Vec::new();
        };
        let mut history = Vec::new();
        for line in BufReader::new(file).lines() {
            let Ok(line) = line else {
                Self::report_error("failed to read from file");
                break;
            };
            history.push(line);
        }
        history
    }

    /// Open (or create) the history file in the user cache directory.
    fn open_file() -> Option<File> {
        let Some(parent_dir) = dirs_next::cache_dir() else {
            Self::report_error("cannot retrieve user cache directory, eg. $XDG_CACHE_HOME");
            return None;
        };
        if !parent_dir.is_dir() {
            return None;
        }

        let file_path = parent_dir.join(Self::FILE_NAME);
        if file_path.exists() && !file_path.is_file() {
            Self::report_error(format_args!(
                "path exists but is not a file: {}",
                file_path.display(),
            ));
            return None;
        }

        match fs::OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&file_path)
        {
            Ok(file) => Some(file),
            Err(_) => {
                Self::report_error(format_args!(
                    "failed to open file: {}",
                    file_path.display()
                ));
                None
            }
        }
    }

    fn report_error(message: impl fmt::Display) {
        dprintln!(Always, "Error with debugger history file: {}", message);
    }
}

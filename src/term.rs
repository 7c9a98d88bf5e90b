use std::io::{self, IsTerminal as _, Read as _};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::{Mutex, OnceLock};
use std::thread;
use std::time::Duration;

use crossterm::event::{self, Event, KeyEvent};
use crossterm::terminal;

use crate::exec::Interrupt;

/// Similar to [`crossterm::event::KeyCode`] but only contains relevant information.
#[derive(Debug)]
pub enum Key {
    CtrlC,
    CtrlD,
    Enter,
    Backspace,
    Delete,
    Left,
    Right,
    Up,
    Down,
    Char(char),
}

/// Must only be called if terminal is NOT in raw mode.
pub fn enable_raw_mode() {
    debug_assert!(
        !terminal::is_raw_mode_enabled().is_ok_and(|is| is),
        "terminal should not be in raw mode to enable raw mode",
    );
    terminal::enable_raw_mode().expect("failed to enable raw terminal");
}

/// Must only be called if terminal is in raw mode.
pub fn disable_raw_mode() {
    debug_assert!(
        terminal::is_raw_mode_enabled().is_ok_and(|is| is),
        "terminal should already be in raw mode to disable raw mode",
    );
    terminal::disable_raw_mode().expect("failed to disable raw terminal");
}

/// Read next key from interactive terminal, or `None` if a stop request
/// arrives while waiting.
///
/// The wait polls in short intervals so that a `SIGINT` delivered outside
/// the terminal (while this thread is blocked) is noticed promptly.
///
/// Caller must ensure terminal is in raw mode.
pub fn read_key() -> Option<Key> {
    assert!(
        terminal::is_raw_mode_enabled().is_ok_and(|is| is),
        "terminal must be in raw mode to read key",
    );
    loop {
        if Interrupt::pending() {
            return None;
        }
        let is_ready = event::poll(Duration::from_millis(100)).expect("failed to poll terminal");
        if !is_ready {
            continue;
        }
        let event = event::read().expect("failed to read terminal event");
        if let Ok(key) = event.try_into() {
            return Some(key);
        }
    }
}

/// Read one byte of program input, blocking. `None` indicates end of input.
///
/// Used by the `GETC` and `IN` trap routines.
pub fn read_byte() -> Option<u8> {
    if io::stdin().is_terminal() {
        read_terminal_byte()
    } else {
        read_stdin_byte()
    }
}

/// Non-blocking probe for pending program input.
///
/// Used by reads of the keyboard status register. On an interactive terminal
/// this polls with a zero timeout; on piped stdin it checks the reader-thread
/// channel without waiting.
pub fn poll_byte() -> Option<u8> {
    if io::stdin().is_terminal() {
        poll_terminal_byte()
    } else {
        poll_stdin_byte()
    }
}

fn read_terminal_byte() -> Option<u8> {
    enable_raw_mode();
    let byte = loop {
        match read_key() {
            // A raw terminal delivers Ctrl+C as ETX
            Some(Key::CtrlC) | None => {
                Interrupt::raise();
                break Some(0x03);
            }
            Some(Key::CtrlD) => break None,
            Some(Key::Enter) => break Some(b'\n'),
            Some(Key::Char(ch)) if ch.is_ascii() => break Some(ch as u8),
            _ => continue,
        }
    };
    disable_raw_mode();
    byte
}

fn poll_terminal_byte() -> Option<u8> {
    enable_raw_mode();
    let mut byte = None;
    while event::poll(Duration::ZERO).expect("failed to poll terminal") {
        let event = event::read().expect("failed to read terminal event");
        let key = match Key::try_from(event) {
            Ok(key) => key,
            Err(()) => continue, // consume non-key events
        };
        byte = match key {
            Key::CtrlC => {
                Interrupt::raise();
                Some(0x03)
            }
            Key::Enter => Some(b'\n'),
            Key::Char(ch) if ch.is_ascii() => Some(ch as u8),
            _ => continue,
        };
        break;
    }
    disable_raw_mode();
    byte
}

/// Bytes from piped stdin, delivered through a bounded channel so a status
/// read can check for input without waiting on the pipe.
///
/// The reader thread starts on first use and stays at most one byte ahead of
/// the consumer, so command reads and program input keep their pipe order.
/// It exits at end of input, disconnecting the channel.
fn stdin_channel() -> &'static Mutex<Receiver<u8>> {
    static CHANNEL: OnceLock<Mutex<Receiver<u8>>> = OnceLock::new();
    CHANNEL.get_or_init(|| {
        let (sender, receiver) = mpsc::sync_channel(1);
        thread::spawn(move || {
            let mut stdin = io::stdin();
            let mut buffer = [0; 1];
            loop {
                match stdin.read(&mut buffer) {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {
                        if sender.send(buffer[0]).is_err() {
                            break;
                        }
                    }
                }
            }
        });
        Mutex::new(receiver)
    })
}

/// Blocking read of one byte from piped stdin. `None` indicates end of input.
pub(crate) fn read_stdin_byte() -> Option<u8> {
    let receiver = stdin_channel().lock().expect("stdin channel lock poisoned");
    receiver.recv().ok()
}

fn poll_stdin_byte() -> Option<u8> {
    let receiver = stdin_channel().lock().expect("stdin channel lock poisoned");
    match receiver.try_recv() {
        Ok(byte) => Some(byte),
        Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
    }
}

impl TryFrom<Event> for Key {
    type Error = ();
    fn try_from(event: Event) -> Result<Self, Self::Error> {
        if let Event::Key(event) = event {
            if let Ok(key) = event.try_into() {
                return Ok(key);
            }
        }
        Err(())
    }
}

impl TryFrom<KeyEvent> for Key {
    type Error = ();
    fn try_from(event: KeyEvent) -> Result<Self, Self::Error> {
        use event::{KeyCode, KeyEventKind, KeyModifiers as Mod};

        if matches!(event.kind, KeyEventKind::Release) {
            return Err(());
        }

        let key = match (event.modifiers, event.code) {
            (Mod::CONTROL, KeyCode::Char('c')) => Key::CtrlC,
            (Mod::CONTROL, KeyCode::Char('d')) => Key::CtrlD,

            (_, KeyCode::Backspace) => Key::Backspace,
            (_, KeyCode::Delete) => Key::Delete,
            (_, KeyCode::Enter) | (_, KeyCode::Char('\n')) => Key::Enter,

            (Mod::NONE, KeyCode::Left) => Key::Left,
            (Mod::NONE, KeyCode::Right) => Key::Right,
            (Mod::NONE, KeyCode::Up) => Key::Up,
            (Mod::NONE, KeyCode::Down) => Key::Down,

            (Mod::NONE | Mod::SHIFT, KeyCode::Char(ch)) => Key::Char(ch),

            _ => return Err(()),
        };

        Ok(key)
    }
}

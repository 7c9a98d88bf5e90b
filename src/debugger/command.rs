use std::fmt;

/// A parsed debugger command.
///
/// `memory` is recognized and its arguments are parsed, but it is not yet
/// implemented; the controller treats it as a no-op.
#[derive(Debug, PartialEq)]
pub enum Command {
    Help,
    Continue,
    Step,
    Registers,
    Memory {
        addr: Option<u16>,
        count: Option<u16>,
    },
}

/// Command was not recognized. Carries the offending line for reporting.
#[derive(Debug, PartialEq)]
pub struct Unrecognized<'a>(pub &'a str);

impl fmt::Display for Unrecognized<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unrecognized command: {}", self.0)
    }
}

impl<'a> TryFrom<&'a str> for Command {
    type Error = Unrecognized<'a>;

    /// Assumes line is non-empty. Commands are matched by their first
    /// character, case-sensitively, so `h`, `help` and `hello` all mean
    /// `help`.
    fn try_from(line: &'a str) -> Result<Self, Self::Error> {
        let mut words = line.split_whitespace();
        let name = words.next().expect("line must be non-empty");

        let command = match name.chars().next() {
            Some('h') => Self::Help,
            Some('c') => Self::Continue,
            Some('s') => Self::Step,
            Some('r') => Self::Registers,
            Some('m') => Self::Memory {
                addr: words.next().and_then(parse_integer),
                count: words.next().and_then(parse_integer),
            },
            _ => return Err(Unrecognized(line)),
        };
        Ok(command)
    }
}

/// Lenient integer argument: `0x`-prefixed hex or decimal. Invalid arguments
/// are discarded rather than reported, since nothing consumes them yet.
fn parse_integer(word: &str) -> Option<u16> {
    if let Some(hex) = word.strip_prefix("0x") {
        u16::from_str_radix(hex, 16).ok()
    } else {
        word.parse().ok()
    }
}

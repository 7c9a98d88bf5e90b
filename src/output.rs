use std::cell::RefCell;

use colored::Colorize;

use crate::runtime::RunState;

/// Program (trap) output on stdout.
#[macro_export]
macro_rules! print_char {
    ( $ch:expr ) => {{
        $crate::output::Output::Normal.print_char($ch);
    }};
}

/// Debugger output on stderr. First argument is a [`Condition`].
#[macro_export]
macro_rules! dprint {
    ( $cond:expr, $fmt:literal $($tt:tt)* ) => {{
        #[allow(unused_imports)]
        use $crate::output::Condition::*;
        let s = format!(
            $fmt
            $($tt)*
        );
        $crate::output::Output::Debugger($cond).print_str(&s);
    }};
}

#[macro_export]
macro_rules! dprintln {
    ( $cond:expr ) => {{
        #[allow(unused_imports)]
        use $crate::output::Condition::*;
        $crate::output::Output::Debugger($cond).print_str("\n");
    }};
    ( $cond:expr, $fmt:literal $($tt:tt)* ) => {{
        #[allow(unused_imports)]
        use $crate::output::Condition::*;
        let s = format!(
            concat!($fmt, "\n")
            $($tt)*
        );
        $crate::output::Output::Debugger($cond).print_str(&s);
    }};
}

#[derive(Clone, Copy, Debug)]
pub enum Output {
    /// What the emulated program prints, on stdout.
    Normal,
    /// What the debugger prints, on stderr.
    Debugger(Condition),
}

/// Whether debugger text survives `--minimal` mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Condition {
    Always,
    Sometimes,
}

impl Output {
    thread_local! {
        static IS_LINE_START: RefCell<bool> = const { RefCell::new(true) };
        static IS_MINIMAL: RefCell<bool> = const { RefCell::new(false) };
    }

    pub fn set_minimal(new_value: bool) -> bool {
        Self::IS_MINIMAL.with(|value| value.replace(new_value))
    }
    pub fn is_minimal() -> bool {
        Self::IS_MINIMAL.with(|value| *value.borrow())
    }

    fn set_line_start(new_value: bool) {
        Self::IS_LINE_START.with(|value| *value.borrow_mut() = new_value);
    }
    fn is_line_start() -> bool {
        Self::IS_LINE_START.with(|value| *value.borrow())
    }

    pub fn print_char(&self, ch: char) {
        match self {
            Self::Normal => print!("{}", ch),
            Self::Debugger(..) => eprint!("{}", ch),
        }
        Self::set_line_start(ch == '\n');
    }

    pub fn print_str(&self, string: &str) {
        match self {
            Self::Normal => {
                print!("{}", string);
            }
            Self::Debugger(condition) => match (Self::is_minimal(), *condition) {
                (false, _) => eprint!("{}", string.blue()),
                (true, Condition::Always) => eprint!("{}", string),
                // Decorative text is dropped entirely in minimal mode
                (true, Condition::Sometimes) => return,
            },
        }
        if let Some(ch) = string.chars().last() {
            Self::set_line_start(ch == '\n');
        }
    }

    /// Ensure following output begins on a fresh line, e.g. after program
    /// output with no trailing newline.
    pub fn start_new_line(&self) {
        if !Self::is_line_start() {
            self.print_char('\n');
        }
    }

    /// All 8 general registers, PC, and the condition flag, as 4-digit hex.
    pub fn print_registers(&self, state: &RunState) {
        for i in 0..8 {
            self.print_str(&format!("R{}:  0x{:04x}\n", i, state.reg(i)));
        }
        self.print_str(&format!("PC:  0x{:04x}\n", state.pc()));
        self.print_str(&format!("CC:  0x{:04x}\n", state.flag() as u16));
    }
}

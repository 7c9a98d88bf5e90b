mod command;
mod reader;

use self::command::Command;
use self::reader::{CommandReader, Read as _};
use crate::exec::Interrupt;
use crate::output::{Condition, Output};
use crate::runtime::RunState;

/// Leave this as a struct, in case more options are added in the future.
#[derive(Debug)]
pub struct DebuggerOptions {
    pub command: Option<String>,
}

/// The interactive front end consulted before every instruction while the
/// machine is in single-step mode.
pub struct Debugger {
    reader: CommandReader,
}

/// What the command loop hands back to the fetch loop.
#[derive(Debug)]
pub enum Action {
    /// Execute the fetched instruction, stay in single-step mode.
    Step,
    /// Execute the fetched instruction and switch to full speed.
    Resume,
    /// End of input or operator cancellation: stop the machine.
    Quit,
}

impl Debugger {
    pub(crate) fn new(opts: DebuggerOptions) -> Self {
        Self {
            reader: CommandReader::from(opts.command),
        }
    }

    /// Prompt for commands until one ends the loop. Informational commands
    /// (`help`, `reg`, unrecognized input) keep prompting.
    pub(crate) fn wait_for_action(&mut self, state: &RunState) -> Action {
        loop {
            Output::Debugger(Condition::Always).start_new_line();

            let Some(line) = self.reader.read() else {
                // A read cut short by Ctrl+C or SIGINT is not end of input
                if Interrupt::take() {
                    dprintln!(Always, "Interrupted. Exiting...");
                } else {
                    dprintln!(Always, "End of input. Exiting...");
                }
                return Action::Quit;
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match Command::try_from(line) {
                Ok(Command::Help) => {
                    dprintln!(Always, "{}", include_str!("./help.txt"));
                }
                Ok(Command::Continue) => {
                    dprintln!(Sometimes, "Continuing...");
                    return Action::Resume;
                }
                Ok(Command::Step) => return Action::Step,
                Ok(Command::Registers) => {
                    let output = Output::Debugger(Condition::Always);
                    output.print_registers(state);
                }
                Ok(Command::Memory { .. }) => {
                    // Declared in the help text; display format still undecided
                    dprintln!(Always, "`memory` is not yet implemented.");
                }
                Err(error) => {
                    dprintln!(Always, "{} (type `help` for help)", error);
                }
            }
        }
    }
}

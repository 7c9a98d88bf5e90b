use std::fs;
use std::path::PathBuf;

use clap::Parser;
use colored::Colorize;
use miette::{bail, IntoDiagnostic, Result, WrapErr};

use weft::{DebuggerOptions, Interrupt, Memory, RunEnvironment};

/// Weft is a 16-bit LC-3 virtual machine with a built-in single-step debugger.
#[derive(Parser)]
#[command(version)]
struct Args {
    /// Program image files to load, in big-endian `.obj` format
    #[arg(required = true)]
    image: Vec<PathBuf>,

    /// Read debugger commands from argument, separated by `;` or newlines
    #[arg(short, long)]
    command: Option<String>,

    /// Produce minimal output, suited for blackbox tests
    #[arg(short, long)]
    minimal: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    Interrupt::install()?;

    let mut memory = Memory::new();
    for path in &args.image {
        file_message(MsgColor::Green, "Loading", path);
        let words = read_image_file(path)?;
        memory
            .load_image(&words)
            .wrap_err_with(|| format!("failed to load image '{}'", path.display()))?;
    }

    let mut program = RunEnvironment::new(
        memory,
        DebuggerOptions {
            command: args.command,
        },
    );
    program.set_minimal(args.minimal);

    message(MsgColor::Green, "Running", "loaded image");
    program.run();
    message(MsgColor::Green, "Completed", "execution finished");

    Ok(())
}

/// Read an image file into native-order words. The first word (the origin)
/// stays part of the returned buffer.
fn read_image_file(path: &PathBuf) -> Result<Vec<u16>> {
    let buffer = fs::read(path)
        .into_diagnostic()
        .wrap_err_with(|| format!("failed to open image '{}'", path.display()))?;

    if buffer.len() % 2 != 0 {
        bail!("image '{}' is not aligned to 16 bits", path.display());
    }

    Ok(buffer
        .chunks_exact(2)
        .map(|word| u16::from_be_bytes([word[0], word[1]]))
        .collect())
}

#[allow(unused)]
enum MsgColor {
    Green,
    Cyan,
    Red,
}

fn file_message(color: MsgColor, left: &str, right: &PathBuf) {
    let right = format!("target {}", right.display());
    message(color, left, &right);
}

fn message<S>(color: MsgColor, left: S, right: S)
where
    S: Colorize + std::fmt::Display,
{
    let left = match color {
        MsgColor::Green => left.green(),
        MsgColor::Cyan => left.cyan(),
        MsgColor::Red => left.red(),
    };
    println!("{left:>12} {right}");
}

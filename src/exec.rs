use std::sync::atomic::{AtomicBool, Ordering};

use miette::{IntoDiagnostic, Result};

/// Run mode of the machine. `Off` is terminal.
///
/// Starts at `SingleStep`; the only transition upward is `continue` raising
/// it to `Turbo`. The stop signal lowers it one state at a time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExecutionState {
    Off,
    #[default]
    SingleStep,
    Turbo,
}

impl ExecutionState {
    /// One stop request: `Turbo` drops to `SingleStep`, anything else turns
    /// the machine off.
    pub fn demote(&mut self) {
        *self = match self {
            Self::Turbo => Self::SingleStep,
            Self::SingleStep | Self::Off => Self::Off,
        };
    }
}

static STOP_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Cooperative stop request, shared between the signal handler, the raw-mode
/// key reader, and the fetch loop.
///
/// The handler only stores a flag; all state transitions happen on the
/// interpreter thread, at the top of the fetch loop or when a blocked
/// command read returns.
pub struct Interrupt;

impl Interrupt {
    /// Route `SIGINT` to the flag. Must only be called once per process.
    pub fn install() -> Result<()> {
        ctrlc::set_handler(Self::raise).into_diagnostic()
    }

    pub fn raise() {
        STOP_REQUESTED.store(true, Ordering::SeqCst);
    }

    /// Consume a pending stop request, if any.
    pub fn take() -> bool {
        STOP_REQUESTED.swap(false, Ordering::SeqCst)
    }

    pub fn pending() -> bool {
        STOP_REQUESTED.load(Ordering::SeqCst)
    }
}

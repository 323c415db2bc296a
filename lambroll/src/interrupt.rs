use anyhow::{Context, Result};
use lambroll_core::Error;
use tokio_util::sync::CancellationToken;

/// Process-wide interrupt flag, shared with everything that waits on the
/// remote service.
#[derive(Clone, Debug, Default)]
pub struct InterruptState {
    token: CancellationToken,
}

impl InterruptState {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    pub fn set_interrupted(&self) {
        self.token.cancel();
    }

    pub fn is_interrupted(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn check_interrupted(&self) -> Result<()> {
        if self.is_interrupted() {
            Err(Error::Interrupted.into())
        } else {
            Ok(())
        }
    }

    /// Cancelled when the process is interrupted.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

fn set_process_interrupt_handler(interrupted: &InterruptState) -> Result<()> {
    let interrupted = interrupted.clone();
    ctrlc::set_handler(move || {
        tracing::warn!("interrupted; stopping after the current step");
        interrupted.set_interrupted();
    })
    .context("setting interrupt handler")
}

pub fn set_up_process_interrupt_handler() -> Result<InterruptState> {
    let interrupt_state = InterruptState::new();
    set_process_interrupt_handler(&interrupt_state)?;
    Ok(interrupt_state)
}

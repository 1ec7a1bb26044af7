//! The operator's session: which discovered host commands are addressed to.

use crate::command::CommandKind;
use crate::error::CoreError;
use crate::peer::{PeerDescriptor, PeerDirectory};

/// Session context created once discovery has finished.
///
/// Owns the [`PeerDirectory`] and the current selection. Only
/// [`SessionState::select`] changes the selection; a failed exchange with the
/// selected host leaves it in place.
#[derive(Debug, Clone)]
pub struct SessionState {
    directory: PeerDirectory,
    selected: Option<usize>,
}

impl SessionState {
    /// Start a session with nothing selected.
    pub fn new(directory: PeerDirectory) -> Self {
        Self {
            directory,
            selected: None,
        }
    }

    pub fn directory(&self) -> &PeerDirectory {
        &self.directory
    }

    /// Select the host at `index`. Out-of-range indices leave the selection as it was.
    pub fn select(&mut self, index: i64) -> Result<&PeerDescriptor, CoreError> {
        let len = self.directory.len();
        let position = usize::try_from(index)
            .ok()
            .filter(|position| *position < len)
            .ok_or(CoreError::IndexOutOfRange { index, len })?;
        self.selected = Some(position);
        tracing::debug!(index = position, "host selected");
        Ok(&self.directory.list()[position])
    }

    /// The selected host, if any.
    pub fn current(&self) -> Option<&PeerDescriptor> {
        self.selected.and_then(|i| self.directory.list().get(i))
    }

    /// The selected host, or [`CoreError::NoPeerSelected`] naming what `kind` needed it for.
    pub fn require_current(&self, kind: CommandKind) -> Result<&PeerDescriptor, CoreError> {
        self.current().ok_or(CoreError::NoPeerSelected { kind })
    }
}

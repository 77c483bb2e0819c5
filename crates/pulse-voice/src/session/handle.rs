use tokio::sync::{mpsc, oneshot, watch};

use pulse_common::{ParticipantId, VoiceError};

use super::types::{Command, SessionView};

/// Control surface for a running session. Cheap to clone.
#[derive(Clone)]
pub struct VoiceHandle {
    commands: mpsc::Sender<Command>,
    view: watch::Receiver<SessionView>,
    local_id: ParticipantId,
}

impl VoiceHandle {
    pub(crate) fn new(
        commands: mpsc::Sender<Command>,
        view: watch::Receiver<SessionView>,
        local_id: ParticipantId,
    ) -> Self {
        Self {
            commands,
            view,
            local_id,
        }
    }

    pub fn local_id(&self) -> &ParticipantId {
        &self.local_id
    }

    /// Enable or disable the local microphone. Peer connections are kept.
    pub async fn set_muted(&self, muted: bool) -> Result<(), VoiceError> {
        self.send(Command::SetMuted(muted)).await
    }

    /// Silence every remote stream. Deafening also mutes; undeafening
    /// leaves the mute flag as it is.
    pub async fn set_deafened(&self, deafened: bool) -> Result<(), VoiceError> {
        self.send(Command::SetDeafened(deafened)).await
    }

    /// Leave the channel and wait for teardown to finish. Calling it again,
    /// or after the session ended, is a no-op.
    pub async fn leave(&self) -> Result<(), VoiceError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.commands.send(Command::Leave(ack_tx)).await.is_err() {
            return Ok(());
        }
        let _ = ack_rx.await;
        Ok(())
    }

    /// Current snapshot.
    pub fn view(&self) -> SessionView {
        self.view.borrow().clone()
    }

    /// Receiver that wakes on every published snapshot.
    pub fn watch(&self) -> watch::Receiver<SessionView> {
        self.view.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    async fn send(&self, command: Command) -> Result<(), VoiceError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| VoiceError::SessionClosed)
    }
}

use voicekeep_models::voice::{VoiceState, VoiceStateCommand};

/// Desired voice placement, fixed for the lifetime of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceTarget {
    pub guild_id: Option<String>,
    pub channel_id: Option<String>,
    pub self_mute: bool,
    pub self_deaf: bool,
}

impl VoiceTarget {
    /// Both ids are needed before any join is attempted.
    pub fn is_configured(&self) -> bool {
        self.guild_id.is_some() && self.channel_id.is_some()
    }

    pub fn join_command(&self) -> Option<VoiceStateCommand> {
        let (Some(guild_id), Some(channel_id)) = (&self.guild_id, &self.channel_id) else {
            return None;
        };
        Some(VoiceStateCommand {
            guild_id: guild_id.clone(),
            channel_id: Some(channel_id.clone()),
            self_mute: self.self_mute,
            self_deaf: self.self_deaf,
        })
    }

    /// Channel and guild must both match.
    pub fn matches(&self, state: &VoiceState) -> bool {
        self.is_configured()
            && state.channel_id == self.channel_id
            && state.guild_id == self.guild_id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceObservation {
    /// Placement matches and was not confirmed before.
    Confirmed,
    /// Placement matches and was already confirmed.
    AlreadyConfirmed,
    /// Placement diverges from the target.
    Drift,
    /// No target configured; nothing to compare against.
    Untracked,
}

/// Compares observed voice-state events for the session's own user against
/// the [`VoiceTarget`].
pub struct VoiceStateTracker {
    target: VoiceTarget,
    confirmed: bool,
}

impl VoiceStateTracker {
    pub fn new(target: VoiceTarget) -> Self {
        Self {
            target,
            confirmed: false,
        }
    }

    pub fn target(&self) -> &VoiceTarget {
        &self.target
    }

    pub fn is_confirmed(&self) -> bool {
        self.confirmed
    }

    /// The caller has already checked that `state` concerns the session's
    /// own user.
    pub fn observe(&mut self, state: &VoiceState) -> VoiceObservation {
        if !self.target.is_configured() {
            return VoiceObservation::Untracked;
        }
        if self.target.matches(state) {
            if self.confirmed {
                VoiceObservation::AlreadyConfirmed
            } else {
                self.confirmed = true;
                VoiceObservation::Confirmed
            }
        } else {
            self.confirmed = false;
            VoiceObservation::Drift
        }
    }

    pub fn reset(&mut self) {
        self.confirmed = false;
    }
}

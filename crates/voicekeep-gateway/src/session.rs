/// Identity state of one gateway session: credential, sequence counter,
/// authenticated user and validity.
pub struct SessionIdentity {
    token: String,
    last_sequence: Option<u64>,
    user_id: Option<String>,
    valid: bool,
}

impl SessionIdentity {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            last_sequence: None,
            user_id: None,
            valid: true,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn last_sequence(&self) -> Option<u64> {
        self.last_sequence
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Record a frame's sequence number. Values below the current one are
    /// ignored so the counter never moves backwards while the session lives.
    /// Returns whether the counter changed.
    pub fn observe_sequence(&mut self, seq: Option<u64>) -> bool {
        let Some(seq) = seq else {
            return false;
        };
        match self.last_sequence {
            Some(current) if seq < current => {
                tracing::debug!(current, seq, "ignoring out-of-order sequence");
                false
            }
            Some(current) if seq == current => false,
            _ => {
                self.last_sequence = Some(seq);
                true
            }
        }
    }

    pub fn set_user(&mut self, user_id: impl Into<String>) {
        self.user_id = Some(user_id.into());
    }

    pub fn is_own_user(&self, user_id: &str) -> bool {
        self.user_id.as_deref() == Some(user_id)
    }

    pub fn invalidate(&mut self) {
        self.valid = false;
    }

    /// Clear the invalid mark ahead of a fresh Identify.
    pub fn revalidate(&mut self) {
        self.valid = true;
    }

    /// Drop per-connection state. The token and validity survive.
    pub fn reset(&mut self) {
        self.last_sequence = None;
        self.user_id = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_is_monotonic() {
        let mut session = SessionIdentity::new("tok");
        assert_eq!(session.last_sequence(), None);
        assert!(!session.observe_sequence(None));
        assert!(session.observe_sequence(Some(3)));
        assert!(!session.observe_sequence(Some(2)));
        assert_eq!(session.last_sequence(), Some(3));
        assert!(!session.observe_sequence(None));
        assert_eq!(session.last_sequence(), Some(3));
        assert!(session.observe_sequence(Some(7)));
        assert_eq!(session.last_sequence(), Some(7));
    }

    #[test]
    fn reset_clears_sequence_and_user_only() {
        let mut session = SessionIdentity::new("tok");
        session.observe_sequence(Some(9));
        session.set_user("123");
        session.invalidate();
        session.reset();
        assert_eq!(session.last_sequence(), None);
        assert_eq!(session.user_id(), None);
        assert_eq!(session.token(), "tok");
        assert!(!session.is_valid());
        session.revalidate();
        assert!(session.is_valid());
    }

    #[test]
    fn own_user_match() {
        let mut session = SessionIdentity::new("tok");
        assert!(!session.is_own_user("123"));
        session.set_user("123");
        assert!(session.is_own_user("123"));
        assert!(!session.is_own_user("456"));
    }
}

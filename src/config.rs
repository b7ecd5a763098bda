use crate::InputError;

/// Largest counter gap a receive chain will skip ahead over, and the size of
/// its skipped message key buffer.
pub const MAX_COUNTER_GAP: u32 = 1000;

/// Number of receive chains a session state keeps for late messages.
pub const MAX_RECV_CHAINS: usize = 5;

/// Number of session states (one per session tag) a session keeps.
pub const MAX_SESSION_STATES: usize = 100;

/// Bounds applied to a session's ratchet bookkeeping.
///
/// Not part of the wire form: a deserialised session takes whatever
/// configuration the caller hands to [`Session::deserialise`](crate::Session::deserialise).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    /// Maximum distance between a receive chain's index and an incoming counter.
    pub max_counter_gap: u32,
    /// Maximum number of historical receive chains per session state.
    pub max_recv_chains: usize,
    /// Maximum number of session states per session.
    pub max_session_states: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_counter_gap: MAX_COUNTER_GAP,
            max_recv_chains: MAX_RECV_CHAINS,
            max_session_states: MAX_SESSION_STATES,
        }
    }
}

impl SessionConfig {
    /// Checks that every bound leaves room for the state a session needs.
    ///
    /// A session state always holds the receive chain it is decrypting on,
    /// and a session always holds its current state, so neither bound may be
    /// zero.
    pub fn validate(&self) -> Result<(), InputError> {
        if self.max_recv_chains == 0 {
            return Err(InputError::RangeError(
                "max_recv_chains must be at least 1".to_string(),
            ));
        }
        if self.max_session_states == 0 {
            return Err(InputError::RangeError(
                "max_session_states must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert_eq!(SessionConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_zero_bounds_are_rejected() {
        let no_chains = SessionConfig {
            max_recv_chains: 0,
            ..SessionConfig::default()
        };
        assert!(matches!(
            no_chains.validate(),
            Err(InputError::RangeError(_))
        ));

        let no_states = SessionConfig {
            max_session_states: 0,
            ..SessionConfig::default()
        };
        assert!(matches!(
            no_states.validate(),
            Err(InputError::RangeError(_))
        ));

        // A zero gap only disables skip-ahead.
        let no_gap = SessionConfig {
            max_counter_gap: 0,
            ..SessionConfig::default()
        };
        assert_eq!(no_gap.validate(), Ok(()));
    }
}

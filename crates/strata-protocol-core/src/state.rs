/// The phase of a protocol connection.
///
/// Transitions are one-way: Handshake branches to Status or Login, Login
/// advances through Configuration into Play, and every phase may fall into
/// Disconnecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Handshake,
    Status,
    Login,
    Configuration,
    Play,
    Disconnecting,
}

impl Phase {
    /// Map the handshake's nextState field onto a phase.
    pub fn from_handshake_next(next: i32) -> Option<Self> {
        match next {
            1 => Some(Phase::Status),
            2 => Some(Phase::Login),
            _ => None,
        }
    }

    /// Whether a formal Disconnect packet can be sent in this phase.
    /// Handshake and Status peers just get a socket close.
    pub fn supports_disconnect_packet(self) -> bool {
        matches!(self, Phase::Login | Phase::Configuration | Phase::Play)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_next() {
        assert_eq!(Phase::from_handshake_next(1), Some(Phase::Status));
        assert_eq!(Phase::from_handshake_next(2), Some(Phase::Login));
        assert_eq!(Phase::from_handshake_next(0), None);
        assert_eq!(Phase::from_handshake_next(3), None);
    }

    #[test]
    fn test_disconnect_packet_support() {
        assert!(!Phase::Handshake.supports_disconnect_packet());
        assert!(!Phase::Status.supports_disconnect_packet());
        assert!(Phase::Login.supports_disconnect_packet());
        assert!(Phase::Play.supports_disconnect_packet());
    }
}

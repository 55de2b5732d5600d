use std::fmt;

/// Pipeline lifecycle states.
///
/// Startup walks `Created -> Initialized -> Paused -> Playing`; graceful
/// shutdown walks `Playing -> Paused -> Ready -> Null`. `Eos` and `Error`
/// are reached from `Playing` and lead back down through `Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineState {
    Created,
    Initialized,
    Ready,
    Paused,
    Playing,
    Error,
    Eos,
    Null,
}

impl PipelineState {
    pub fn can_transition_to(self, next: PipelineState) -> bool {
        use PipelineState::*;
        matches!(
            (self, next),
            (Created, Initialized | Error | Null)
                | (Initialized, Paused | Ready | Error | Null)
                | (Ready, Paused | Null)
                | (Paused, Playing | Ready | Error)
                | (Playing, Paused | Eos | Error)
                | (Eos, Ready | Null)
                | (Error, Ready | Null)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == PipelineState::Null
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Created => "CREATED",
            PipelineState::Initialized => "INITIALIZED",
            PipelineState::Ready => "READY",
            PipelineState::Paused => "PAUSED",
            PipelineState::Playing => "PLAYING",
            PipelineState::Error => "ERROR",
            PipelineState::Eos => "EOS",
            PipelineState::Null => "NULL",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::PipelineState::*;

    #[test]
    fn test_startup_and_shutdown_sequences() {
        for pair in [Created, Initialized, Paused, Playing].windows(2) {
            assert!(pair[0].can_transition_to(pair[1]));
        }
        for pair in [Playing, Paused, Ready, Null].windows(2) {
            assert!(pair[0].can_transition_to(pair[1]));
        }
    }

    #[test]
    fn test_illegal_transitions() {
        assert!(!Created.can_transition_to(Playing));
        assert!(!Initialized.can_transition_to(Playing));
        assert!(!Playing.can_transition_to(Null));
        assert!(!Null.can_transition_to(Created));
        assert!(Null.is_terminal());
    }
}

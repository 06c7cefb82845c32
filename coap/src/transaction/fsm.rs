use tokio::sync::watch;

/// Defines the possible states of an outbound transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, PartialOrd, Ord)]
pub enum State {
    #[default]
    /// Filling in defaults and resolving the destination.
    Preparing,
    /// Registered under its message-id and token keys.
    Registered,
    /// Sent, retransmitted while confirmable and unacknowledged.
    Retrying,
    /// Request acknowledged, waiting for the separate response.
    AwaitingResponse,
    /// Finalized by an empty acknowledgement.
    Acknowledged,
    /// Finalized by a reset.
    Reset,
    /// Finalized by a response.
    Responded,
    /// Finalized by the deadline.
    TimedOut,
    /// Finalized by a transport error or a shutdown.
    SendFailed,
}

impl State {
    /// Returns `true` for the states a transaction never leaves.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Acknowledged | Self::Reset | Self::Responded | Self::TimedOut | Self::SendFailed
        )
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state_str = match self {
            Self::Preparing => "Preparing",
            Self::Registered => "Registered",
            Self::Retrying => "Retrying",
            Self::AwaitingResponse => "AwaitingResponse",
            Self::Acknowledged => "Acknowledged",
            Self::Reset => "Reset",
            Self::Responded => "Responded",
            Self::TimedOut => "TimedOut",
            Self::SendFailed => "SendFailed",
        };
        write!(f, "{}", state_str)
    }
}

/// Defines the possible states of the response to an inbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseState {
    #[default]
    /// Surfaced to the application, nothing sent yet.
    New,
    /// Answered at once, piggybacked on the acknowledgement.
    Answered,
    /// Acknowledged empty, the answer will be a separate message.
    Deferred,
    /// Separate answer handed to its own transaction.
    Delivered,
}

pub struct StateMachine<S> {
    state: S,
    state_change_notifier: Option<watch::Sender<S>>,
}

impl<S: Copy> StateMachine<S> {
    pub fn new(state: S) -> Self {
        Self {
            state,
            state_change_notifier: None,
        }
    }
    /// Subscribe to state changes
    ///
    /// Returns a watch::Receiver that can be used to monitor state changes
    pub fn subscribe_state(&mut self) -> watch::Receiver<S> {
        match self.state_change_notifier {
            Some(ref state) => state.subscribe(),
            None => {
                let (sender, recv) = watch::channel(self.state);

                self.state_change_notifier = Some(sender);

                recv
            }
        }
    }

    #[inline(always)]
    fn notify_state_change(&self, state: S) {
        if let Some(sender) = self.state_change_notifier.as_ref() {
            let _result = sender.send(state);
        }
    }

    pub fn state(&self) -> S {
        self.state
    }

    pub fn set_state(&mut self, state: S) {
        self.state = state;

        self.notify_state_change(state);
    }
}

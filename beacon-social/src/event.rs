//! Notifications emitted to the embedding application.

use crate::roster::{ParticipantRecord, UserProfile};
use crate::router::DeliveredMessage;

/// Events emitted by a session, in the order they happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocialEvent {
    /// A participant entered the roster or changed status.
    ClientState(ParticipantRecord),
    /// A participant's profile was seen for the first time.
    UserProfile(UserProfile),
    /// A message addressed to the local identity arrived.
    Message(DeliveredMessage),
}

impl SocialEvent {
    /// Callback-style event name (`onClientState`, `onUserProfile`, `onMessage`).
    pub fn name(&self) -> &'static str {
        match self {
            SocialEvent::ClientState(_) => "onClientState",
            SocialEvent::UserProfile(_) => "onUserProfile",
            SocialEvent::Message(_) => "onMessage",
        }
    }
}

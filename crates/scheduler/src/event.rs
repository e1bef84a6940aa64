use jobwatch_core::UserKey;

/// Signals a poller raises for the command layer to act on.
///
/// Pollers never change a user's flags themselves; deciding what a
/// failure means for the user is left to whoever consumes these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollerEvent {
    /// The chat transport permanently rejected a message for this user.
    DeliveryBlocked { user: UserKey, reason: String },
}

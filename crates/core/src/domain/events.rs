use super::progress::ProgressEvent;

/// Notifications emitted by the operation dispatcher for the presentation layer
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// An operation reached a terminal state; re-read the full record list
    Refresh,

    /// Progress of the operation running on `receiver_id`
    Progress(ProgressEvent),

    /// Short-lived message for the user (pull/checkout outcome)
    Notice { folder: String, message: String },
}

//! History transforms for the end-of-round hook.

use toolrun_core::{Message, Role};

/// Keep every system message plus the newest `max_messages` others.
///
/// A kept window never starts with tool results whose assistant request was
/// cut off; those orphans are dropped too.
pub fn truncate(history: Vec<Message>, max_messages: usize) -> Vec<Message> {
    let (system, rest): (Vec<Message>, Vec<Message>) =
        history.into_iter().partition(|m| m.role == Role::System);

    let skip = rest.len().saturating_sub(max_messages);
    let tail = rest
        .into_iter()
        .skip(skip)
        .skip_while(|m| m.role == Role::Tool);

    system.into_iter().chain(tail).collect()
}

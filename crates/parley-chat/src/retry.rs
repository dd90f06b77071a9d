//! Regenerate support: recover the user turn that produced an assistant
//! message so it can be resent, optionally under a different model.

use crate::{
    session,
    transcript::{ChatMessage, Role, Transcript},
};

/// Find the user turn that triggered the given assistant message: the
/// nearest preceding user message, scanning backward.
///
/// Returns `None` for the greeting, a missing id, a user-message id, or an
/// assistant message with no user turn before it. Callers treat `None` as
/// a silent no-op.
pub fn find_trigger_turn<'a>(
    transcript: &'a Transcript,
    assistant_id: &str,
) -> Option<&'a ChatMessage> {
    if session::is_welcome_message(assistant_id) {
        return None;
    }
    let position = transcript.position(assistant_id)?;
    if transcript.messages()[position].role != Role::Assistant {
        return None;
    }
    transcript.messages()[..position]
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::ChatMessage;

    fn sample() -> Transcript {
        Transcript::default()
            .append(ChatMessage::assistant("welcome", "greeting", 0))
            .append(ChatMessage::user("u1", "first question"))
            .append(ChatMessage::assistant_final("a1", "first answer", 10))
            .append(ChatMessage::user("u2", "second question"))
            .append(ChatMessage::assistant_final("a2", "second answer", 20))
    }

    #[test]
    fn test_finds_nearest_preceding_user_turn() {
        let transcript = sample();
        assert_eq!(find_trigger_turn(&transcript, "a2").unwrap().id, "u2");
        assert_eq!(find_trigger_turn(&transcript, "a1").unwrap().id, "u1");
    }

    #[test]
    fn test_welcome_message_has_no_trigger() {
        assert!(find_trigger_turn(&sample(), "welcome").is_none());
    }

    #[test]
    fn test_missing_id_has_no_trigger() {
        assert!(find_trigger_turn(&sample(), "nope").is_none());
    }

    #[test]
    fn test_user_message_is_not_a_target() {
        assert!(find_trigger_turn(&sample(), "u1").is_none());
    }

    #[test]
    fn test_assistant_without_prior_user_turn() {
        let transcript =
            Transcript::default().append(ChatMessage::assistant_final("a0", "orphan", 5));
        assert!(find_trigger_turn(&transcript, "a0").is_none());
    }
}

//! The colon-delimited action token grammar (spec §4.7, formalized in §6).
//!
//! ```text
//! token  := "onboarding" ":" action (":" param)* ":" userId
//! action := "preview" | "select_guide" | "confirm_guide"
//!         | "back_to_guide_selection"
//!         | "step"N"_next" | "step"N"_replay" | "step7_complete"
//!         | "age" | "voice" | "eroipu"
//!         | "neochi" | "neochi_handling"
//!         | "dm" | "friend" | "event" | "step3_next"
//! ```
//!
//! The whole token is bounded to 100 bytes; any context that doesn't fit
//! belongs in the session, not the token (spec §4.7).

use twilight_model::id::{marker::UserMarker, Id};

/// Max length, in bytes, of an encoded action token.
pub const MAX_LEN: usize = 100;

const PREFIX: &str = "onboarding";

/// A decoded action token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionToken {
    pub action: Action,
    pub params: Vec<String>,
    pub user_id: Id<UserMarker>,
}

/// The `action` segment of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Preview,
    SelectGuide,
    ConfirmGuide,
    BackToGuideSelection,
    StepNext(u8),
    StepReplay(u8),
    Step7Complete,
    Age,
    Voice,
    Eroipu,
    Neochi,
    NeochiHandling,
    Dm,
    Friend,
    Event,
    Step3Next,
}

impl Action {
    fn as_str(&self) -> String {
        match self {
            Action::Preview => "preview".to_string(),
            Action::SelectGuide => "select_guide".to_string(),
            Action::ConfirmGuide => "confirm_guide".to_string(),
            Action::BackToGuideSelection => "back_to_guide_selection".to_string(),
            Action::StepNext(n) => format!("step{n}_next"),
            Action::StepReplay(n) => format!("step{n}_replay"),
            Action::Step7Complete => "step7_complete".to_string(),
            Action::Age => "age".to_string(),
            Action::Voice => "voice".to_string(),
            Action::Eroipu => "eroipu".to_string(),
            Action::Neochi => "neochi".to_string(),
            Action::NeochiHandling => "neochi_handling".to_string(),
            Action::Dm => "dm".to_string(),
            Action::Friend => "friend".to_string(),
            Action::Event => "event".to_string(),
            Action::Step3Next => "step3_next".to_string(),
        }
    }

    fn parse(s: &str) -> Option<Action> {
        if let Some(rest) = s.strip_prefix("step") {
            if let Some(n) = rest.strip_suffix("_next") {
                return n.parse().ok().map(Action::StepNext);
            }
            if let Some(n) = rest.strip_suffix("_replay") {
                return n.parse().ok().map(Action::StepReplay);
            }
        }

        Some(match s {
            "preview" => Action::Preview,
            "select_guide" => Action::SelectGuide,
            "confirm_guide" => Action::ConfirmGuide,
            "back_to_guide_selection" => Action::BackToGuideSelection,
            "step7_complete" => Action::Step7Complete,
            "age" => Action::Age,
            "voice" => Action::Voice,
            "eroipu" => Action::Eroipu,
            "neochi" => Action::Neochi,
            "neochi_handling" => Action::NeochiHandling,
            "dm" => Action::Dm,
            "friend" => Action::Friend,
            "event" => Action::Event,
            "step3_next" => Action::Step3Next,
            _ => return None,
        })
    }
}

/// An error parsing an [`ActionToken`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("token is not an onboarding token")]
    WrongPrefix,
    #[error("token is malformed")]
    Malformed,
    #[error("unknown action {0:?}")]
    UnknownAction(String),
    #[error("trailing segment is not a valid user id")]
    InvalidUserId,
    #[error("token exceeds {MAX_LEN} bytes")]
    TooLong,
}

impl ActionToken {
    /// Parses a custom id into an [`ActionToken`].
    ///
    /// Returns [`ParseError::WrongPrefix`] for any custom id that isn't part
    /// of this feature, so callers can fall through to other handlers.
    pub fn parse(custom_id: &str) -> Result<ActionToken, ParseError> {
        if custom_id.len() > MAX_LEN {
            return Err(ParseError::TooLong);
        }

        let mut parts = custom_id.split(':');

        if parts.next() != Some(PREFIX) {
            return Err(ParseError::WrongPrefix);
        }

        let action_str = parts.next().ok_or(ParseError::Malformed)?;
        let rest: Vec<&str> = parts.collect();

        let (params, user_id_str) = rest.split_at(rest.len().saturating_sub(1));
        let user_id_str = user_id_str.first().ok_or(ParseError::Malformed)?;

        let action = Action::parse(action_str)
            .ok_or_else(|| ParseError::UnknownAction(action_str.to_string()))?;

        let user_id = user_id_str
            .parse::<u64>()
            .ok()
            .and_then(Id::new_checked)
            .ok_or(ParseError::InvalidUserId)?;

        Ok(ActionToken {
            action,
            params: params.iter().map(|s| s.to_string()).collect(),
            user_id,
        })
    }

    /// Formats the token back into its custom-id string form.
    pub fn format(&self) -> String {
        let mut out = String::from(PREFIX);
        out.push(':');
        out.push_str(&self.action.as_str());
        for param in &self.params {
            out.push(':');
            out.push_str(param);
        }
        out.push(':');
        out.push_str(&self.user_id.to_string());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uid() -> Id<UserMarker> {
        Id::new(123456789012345678)
    }

    #[test]
    fn round_trips_simple_actions() {
        let cases = [
            Action::Preview,
            Action::SelectGuide,
            Action::ConfirmGuide,
            Action::BackToGuideSelection,
            Action::StepNext(3),
            Action::StepReplay(7),
            Action::Step7Complete,
            Action::Age,
            Action::Voice,
            Action::Eroipu,
            Action::Neochi,
            Action::NeochiHandling,
            Action::Dm,
            Action::Friend,
            Action::Event,
            Action::Step3Next,
        ];

        for action in cases {
            let token = ActionToken {
                action,
                params: Vec::new(),
                user_id: uid(),
            };
            let formatted = token.format();
            let parsed = ActionToken::parse(&formatted).unwrap();
            assert_eq!(parsed, token);
        }
    }

    #[test]
    fn round_trips_with_params() {
        let token = ActionToken {
            action: Action::Preview,
            params: vec!["kk".to_string()],
            user_id: uid(),
        };
        assert_eq!(token.format(), format!("onboarding:preview:kk:{}", uid()));
        assert_eq!(ActionToken::parse(&token.format()).unwrap(), token);
    }

    #[test]
    fn example_tokens_from_spec_parse() {
        let examples = [
            "onboarding:preview:kk:U1",
            "onboarding:select_guide:U1",
            "onboarding:step3_next:U1",
            "onboarding:age:20early:U1",
        ];

        for example in examples {
            // U1 is not a valid u64 here, swap for a real id to check shape
            let replaced = example.replace("U1", "123");
            assert!(ActionToken::parse(&replaced).is_ok(), "{replaced}");
        }
    }

    #[test]
    fn rejects_wrong_prefix() {
        assert_eq!(
            ActionToken::parse("other:foo:123"),
            Err(ParseError::WrongPrefix)
        );
    }

    #[test]
    fn rejects_unknown_action() {
        assert_eq!(
            ActionToken::parse("onboarding:nonsense:123"),
            Err(ParseError::UnknownAction("nonsense".to_string()))
        );
    }

    #[test]
    fn rejects_bad_user_id() {
        assert_eq!(
            ActionToken::parse("onboarding:preview:kk:not-a-user"),
            Err(ParseError::InvalidUserId)
        );
    }

    #[test]
    fn rejects_overlong_token() {
        let long_param = "x".repeat(MAX_LEN);
        let token = format!("onboarding:preview:{long_param}:123");
        assert_eq!(ActionToken::parse(&token), Err(ParseError::TooLong));
    }
}

//! Step 3's sub-step tree (spec §4.6):
//!
//! ```text
//! S3.AGE → S3.VOICE → S3.EROIPU → S3.NEOCHI_OK_NG → S3.NEOCHI_HANDLING
//!        → S3.DM → S3.FRIEND → S3.EVENT (multi-select) → S3.DONE
//! ```
//!
//! Every sub-step but `Event` is an exclusive choice that advances on the
//! first press. `Event` is a multi-select: each press grants its role and
//! restarts a quiescence timer (owned by the session task, see
//! [`crate::session::lifecycle`]) that auto-advances to `Done` once presses
//! stop arriving.

use serde::{Deserialize, Serialize};
use twilight_model::channel::message::component::{ActionRow, Button, ButtonStyle, Component};

use crate::platform::{OutgoingMessage, Platform};
use crate::step::StepContext;
use crate::token::Action;
use crate::voice::VoiceConnection;
use crate::{audio, error::Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Step3Phase {
    Age,
    Voice,
    Eroipu,
    NeochiOkNg,
    NeochiHandling,
    Dm,
    Friend,
    Event,
    Done,
}

impl Step3Phase {
    /// The sub-step that follows an exclusive-choice answer here. `Event`
    /// does not use this — it only leaves via the quiescence timer or an
    /// explicit `Step3Next` once on `Done`.
    pub fn next(self) -> Step3Phase {
        match self {
            Step3Phase::Age => Step3Phase::Voice,
            Step3Phase::Voice => Step3Phase::Eroipu,
            Step3Phase::Eroipu => Step3Phase::NeochiOkNg,
            Step3Phase::NeochiOkNg => Step3Phase::NeochiHandling,
            Step3Phase::NeochiHandling => Step3Phase::Dm,
            Step3Phase::Dm => Step3Phase::Friend,
            Step3Phase::Friend => Step3Phase::Event,
            Step3Phase::Event => Step3Phase::Done,
            Step3Phase::Done => Step3Phase::Done,
        }
    }

    fn action(self) -> Option<Action> {
        match self {
            Step3Phase::Age => Some(Action::Age),
            Step3Phase::Voice => Some(Action::Voice),
            Step3Phase::Eroipu => Some(Action::Eroipu),
            Step3Phase::NeochiOkNg => Some(Action::Neochi),
            Step3Phase::NeochiHandling => Some(Action::NeochiHandling),
            Step3Phase::Dm => Some(Action::Dm),
            Step3Phase::Friend => Some(Action::Friend),
            Step3Phase::Event => Some(Action::Event),
            Step3Phase::Done => None,
        }
    }

    fn role_prefix(self) -> &'static str {
        match self {
            Step3Phase::Age => "age",
            Step3Phase::Voice => "voice",
            Step3Phase::Eroipu => "eroipu",
            Step3Phase::NeochiOkNg => "neochi",
            Step3Phase::NeochiHandling => "neochi_handling",
            Step3Phase::Dm => "dm",
            Step3Phase::Friend => "friend",
            Step3Phase::Event => "event",
            Step3Phase::Done => "",
        }
    }

    /// The answer options presented for this sub-step, as
    /// `(button label key, role/param suffix)` pairs. Content is owned by
    /// the I18N catalog; only the param suffix (used to key the configured
    /// role) lives in code.
    pub fn options(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Step3Phase::Age => &[
                ("onboarding.step3.age.under20", "under20"),
                ("onboarding.step3.age.20s", "20s"),
                ("onboarding.step3.age.30s", "30s"),
                ("onboarding.step3.age.40plus", "40plus"),
            ],
            Step3Phase::Voice => &[
                ("onboarding.step3.voice.yes", "yes"),
                ("onboarding.step3.voice.no", "no"),
            ],
            Step3Phase::Eroipu => &[
                ("onboarding.step3.eroipu.yes", "yes"),
                ("onboarding.step3.eroipu.no", "no"),
            ],
            Step3Phase::NeochiOkNg => &[
                ("onboarding.step3.neochi.ok", "ok"),
                ("onboarding.step3.neochi.ng", "ng"),
            ],
            Step3Phase::NeochiHandling => &[
                ("onboarding.step3.neochi_handling.gentle", "gentle"),
                ("onboarding.step3.neochi_handling.firm", "firm"),
            ],
            Step3Phase::Dm => &[
                ("onboarding.step3.dm.open", "open"),
                ("onboarding.step3.dm.closed", "closed"),
            ],
            Step3Phase::Friend => &[
                ("onboarding.step3.friend.open", "open"),
                ("onboarding.step3.friend.closed", "closed"),
            ],
            Step3Phase::Event => &[
                ("onboarding.step3.event.daytime", "daytime"),
                ("onboarding.step3.event.night", "night"),
            ],
            Step3Phase::Done => &[],
        }
    }

    /// Whether presses here are additive (multi-select) rather than
    /// exclusive-choice.
    pub fn is_multi_select(self) -> bool {
        matches!(self, Step3Phase::Event)
    }
}

/// The configured-role key for an answer `param` on sub-step `phase`.
pub fn role_key(phase: Step3Phase, param: &str) -> String {
    format!("{}_{param}", phase.role_prefix())
}

/// Renders the answer buttons for `phase`, stopping any prior audio (no
/// clip plays during the sub-step choices themselves; `Replay` is a no-op
/// here per spec §4.6).
pub async fn enter<P: Platform>(ctx: &StepContext<'_, P>, conn: &VoiceConnection, phase: Step3Phase) -> Result<()> {
    audio::stop(conn);

    if phase == Step3Phase::Done {
        let message = OutgoingMessage {
            content: Some("onboarding.step3.done.text".to_string()),
            components: vec![next_button(ctx)],
            ..Default::default()
        };
        ctx.platform.send_message(ctx.channel_id, message).await?;
        return Ok(());
    }

    let Some(action) = phase.action() else { return Ok(()) };

    let buttons = phase
        .options()
        .iter()
        .map(|(label_key, param)| {
            Component::Button(Button {
                custom_id: Some(
                    crate::token::ActionToken {
                        action,
                        params: vec![param.to_string()],
                        user_id: ctx.user_id,
                    }
                    .format(),
                ),
                disabled: false,
                emoji: None,
                label: Some(label_key.to_string()),
                style: ButtonStyle::Secondary,
                url: None,
            })
        })
        .collect();

    let message = OutgoingMessage {
        content: Some(format!("onboarding.step3.{}.text", phase.role_prefix())),
        components: vec![Component::ActionRow(ActionRow { components: buttons })],
        ..Default::default()
    };
    ctx.platform.send_message(ctx.channel_id, message).await?;

    Ok(())
}

fn next_button<P: Platform>(ctx: &StepContext<'_, P>) -> Component {
    Component::ActionRow(ActionRow {
        components: vec![Component::Button(Button {
            custom_id: Some(
                crate::token::ActionToken {
                    action: Action::Step3Next,
                    params: Vec::new(),
                    user_id: ctx.user_id,
                }
                .format(),
            ),
            disabled: false,
            emoji: None,
            label: Some("Next".to_string()),
            style: ButtonStyle::Primary,
            url: None,
        })],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_order_matches_spec() {
        let order = [
            Step3Phase::Age,
            Step3Phase::Voice,
            Step3Phase::Eroipu,
            Step3Phase::NeochiOkNg,
            Step3Phase::NeochiHandling,
            Step3Phase::Dm,
            Step3Phase::Friend,
            Step3Phase::Event,
            Step3Phase::Done,
        ];

        for pair in order.windows(2) {
            assert_eq!(pair[0].next(), pair[1]);
        }
        assert_eq!(Step3Phase::Done.next(), Step3Phase::Done);
    }

    #[test]
    fn only_event_is_multi_select() {
        for phase in [
            Step3Phase::Age,
            Step3Phase::Voice,
            Step3Phase::Eroipu,
            Step3Phase::NeochiOkNg,
            Step3Phase::NeochiHandling,
            Step3Phase::Dm,
            Step3Phase::Friend,
            Step3Phase::Done,
        ] {
            assert!(!phase.is_multi_select());
        }
        assert!(Step3Phase::Event.is_multi_select());
    }

    #[test]
    fn role_key_format() {
        assert_eq!(role_key(Step3Phase::Age, "20s"), "age_20s");
        assert_eq!(role_key(Step3Phase::NeochiOkNg, "ok"), "neochi_ok");
    }
}

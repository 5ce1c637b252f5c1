//! Guide Asset Set discovery: each subdirectory of the audio root is a
//! selectable guide persona; step images live alongside under a fixed
//! layout. Missing files are tolerated — a guide still "exists" even if one
//! clip or image is absent, since playback and images are advisory (spec
//! §4.1, §4.6).

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::warn;
use twilight_model::channel::message::component::{ActionRow, Button, ButtonStyle, Component};
use twilight_model::id::{marker::ChannelMarker, Id};

use crate::error::Result;
use crate::platform::{OutgoingMessage, Platform};
use crate::token::{Action, ActionToken};
use crate::voice::VoiceConnection;
use crate::audio;

/// The set of guide ids discovered under `audio_root`, one per subdirectory.
pub async fn discover(audio_root: &Path) -> Vec<String> {
    let mut entries = match fs::read_dir(audio_root).await {
        Ok(entries) => entries,
        Err(err) => {
            warn!(root = %audio_root.display(), %err, "could not read guide audio root");
            return Vec::new();
        }
    };

    let mut guides = Vec::new();
    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(err) => {
                warn!(%err, "error walking guide audio root");
                break;
            }
        };

        let Ok(file_type) = entry.file_type().await else { continue };
        if !file_type.is_dir() {
            continue;
        }

        if let Some(name) = entry.file_name().to_str() {
            guides.push(name.to_string());
        }
    }

    guides.sort();
    guides
}

/// Sends the guide-menu message (spec §4.1): a `Preview`/`Select` pair of
/// buttons per discovered guide.
pub async fn send_menu<P: Platform>(
    platform: &P,
    channel_id: Id<ChannelMarker>,
    user_id: Id<twilight_model::id::marker::UserMarker>,
    audio_root: &Path,
) -> Result<()> {
    let guides = discover(audio_root).await;

    let rows = guides
        .into_iter()
        .map(|guide| {
            Component::ActionRow(ActionRow {
                components: vec![
                    Component::Button(Button {
                        custom_id: Some(
                            ActionToken {
                                action: Action::Preview,
                                params: vec![guide.clone()],
                                user_id,
                            }
                            .format(),
                        ),
                        disabled: false,
                        emoji: None,
                        label: Some(format!("Preview {guide}")),
                        style: ButtonStyle::Secondary,
                        url: None,
                    }),
                    Component::Button(Button {
                        custom_id: Some(
                            ActionToken {
                                action: Action::SelectGuide,
                                params: vec![guide.clone()],
                                user_id,
                            }
                            .format(),
                        ),
                        disabled: false,
                        emoji: None,
                        label: Some(format!("Choose {guide}")),
                        style: ButtonStyle::Primary,
                        url: None,
                    }),
                ],
            })
        })
        .collect();

    let message = OutgoingMessage {
        content: Some("onboarding.guide_menu.text".to_string()),
        components: rows,
        ..Default::default()
    };
    platform.send_message(channel_id, message).await
}

/// Plays a guide's preview clip (spec: pressing `preview:{guide}` streams
/// that guide's sample voice line without changing phase).
pub async fn play_preview(conn: &VoiceConnection, audio_root: &Path, guide: &str) -> Result<()> {
    let clip = audio::clip_path(audio_root, guide, audio::PREVIEW_CLIP);
    audio::start(conn, &clip).await
}

/// Sends the guide-confirmation message (spec §4.1): `Confirm`/`Back`
/// buttons for the just-selected `guide`.
pub async fn send_confirm<P: Platform>(
    platform: &P,
    channel_id: Id<ChannelMarker>,
    user_id: Id<twilight_model::id::marker::UserMarker>,
    guide: &str,
) -> Result<()> {
    let row = Component::ActionRow(ActionRow {
        components: vec![
            Component::Button(Button {
                custom_id: Some(ActionToken { action: Action::BackToGuideSelection, params: Vec::new(), user_id }.format()),
                disabled: false,
                emoji: None,
                label: Some("Back".to_string()),
                style: ButtonStyle::Secondary,
                url: None,
            }),
            Component::Button(Button {
                custom_id: Some(ActionToken { action: Action::ConfirmGuide, params: Vec::new(), user_id }.format()),
                disabled: false,
                emoji: None,
                label: Some("Confirm".to_string()),
                style: ButtonStyle::Success,
                url: None,
            }),
        ],
    });

    let message = OutgoingMessage {
        content: Some(format!("onboarding.guide_confirm.text:{guide}")),
        components: vec![row],
        ..Default::default()
    };
    platform.send_message(channel_id, message).await
}

/// The image path for step `step` (1-7) of `guide`, under
/// `assets/images/onboarding/step{N}.png`. Step 6 additionally has a second
/// slide at `step6-2.png`, covered by [`step_image_variant`].
pub fn step_image(assets_root: &Path, step: u8) -> PathBuf {
    assets_root
        .join("images")
        .join("onboarding")
        .join(format!("step{step}.png"))
}

/// The `N`th image slide for a step that has more than one (currently only
/// Step 6, with slides 1 and 2).
pub fn step_image_variant(assets_root: &Path, step: u8, variant: u8) -> PathBuf {
    assets_root
        .join("images")
        .join("onboarding")
        .join(format!("step{step}-{variant}.png"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_image_layout() {
        let path = step_image(Path::new("assets"), 1);
        assert_eq!(path, PathBuf::from("assets/images/onboarding/step1.png"));
    }

    #[test]
    fn step_image_variant_layout() {
        let path = step_image_variant(Path::new("assets"), 6, 2);
        assert_eq!(path, PathBuf::from("assets/images/onboarding/step6-2.png"));
    }
}

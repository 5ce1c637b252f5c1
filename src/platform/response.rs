//! Interaction response building, adapted from the teacher's
//! `interaction::ResponseExt`/`Response` builder. The core only ever needs
//! the three response kinds named in spec §4.7 plus an ephemeral message
//! (spec §6: "the core uses the first three plus ephemeral").

use twilight_model::channel::message::{Embed, MessageFlags};
use twilight_model::http::interaction::{InteractionResponse, InteractionResponseData, InteractionResponseType};

/// One of the response kinds the Interaction Router can send back.
#[derive(Debug, Clone)]
pub enum InteractionReply {
    /// Keeps the existing message/buttons as-is (used after `Replay`).
    DeferredUpdate,
    /// Replaces the message content/buttons in place (used after `Next`).
    UpdateMessage(MessageBody),
    /// Posts a brand-new message (used for the first guide-menu message).
    NewMessage(MessageBody),
    /// A private, only-you-can-see message (used for errors and "not your
    /// button").
    Ephemeral(String),
}

#[derive(Debug, Clone, Default)]
pub struct MessageBody {
    pub content: Option<String>,
    pub embeds: Vec<Embed>,
}

impl MessageBody {
    pub fn content(content: impl ToString) -> MessageBody {
        MessageBody {
            content: Some(content.to_string()),
            embeds: Vec::new(),
        }
    }
}

impl InteractionReply {
    /// Builds the raw [`InteractionResponse`] twilight expects.
    pub fn into_response(self) -> InteractionResponse {
        match self {
            InteractionReply::DeferredUpdate => InteractionResponse {
                kind: InteractionResponseType::DeferredUpdateMessage,
                data: None,
            },
            InteractionReply::UpdateMessage(body) => InteractionResponse {
                kind: InteractionResponseType::UpdateMessage,
                data: Some(InteractionResponseData {
                    content: body.content,
                    embeds: Some(body.embeds),
                    ..Default::default()
                }),
            },
            InteractionReply::NewMessage(body) => InteractionResponse {
                kind: InteractionResponseType::ChannelMessageWithSource,
                data: Some(InteractionResponseData {
                    content: body.content,
                    embeds: Some(body.embeds),
                    ..Default::default()
                }),
            },
            InteractionReply::Ephemeral(content) => InteractionResponse {
                kind: InteractionResponseType::ChannelMessageWithSource,
                data: Some(InteractionResponseData {
                    content: Some(content),
                    flags: Some(MessageFlags::EPHEMERAL),
                    ..Default::default()
                }),
            },
        }
    }
}

//! Upstream request assembly
//!
//! Builds the chat-completion payload sent upstream: a system turn is always
//! injected first, client history follows unchanged, and any attached images
//! are inlined concurrently and merged into the last user turn as multimodal
//! content parts.

use futures::future::join_all;
use tracing::debug;

use crate::config::Config;
use crate::images::ImageInliner;
use crate::types::{ChatTurn, ContentPart, Role, TurnContent, UpstreamChatRequest};

/// Assistant persona used when no system prompt is configured.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// Upper bound on images inlined per request; excess references are dropped
/// to bound upstream payload size and latency.
pub const MAX_INLINE_IMAGES: usize = 6;

const TEMPERATURE: f64 = 0.7;
const MAX_TOKENS: u32 = 2000;

/// Build the upstream chat-completion request from client history and image
/// references. The caller's history is consumed, never mutated in place.
pub async fn build_request(
    config: &Config,
    inliner: &ImageInliner,
    history: Vec<ChatTurn>,
    image_refs: &[String],
) -> UpstreamChatRequest {
    let system_prompt = config
        .system_prompt
        .as_deref()
        .filter(|p| !p.is_empty())
        .unwrap_or(DEFAULT_SYSTEM_PROMPT);

    let mut messages = Vec::with_capacity(history.len() + 1);
    messages.push(ChatTurn::text(Role::System, system_prompt));
    messages.extend(history);

    if !image_refs.is_empty() {
        let bounded = &image_refs[..image_refs.len().min(MAX_INLINE_IMAGES)];
        if bounded.len() < image_refs.len() {
            debug!(
                supplied = image_refs.len(),
                kept = bounded.len(),
                "Dropping excess image references"
            );
        }

        // Fan out inlining per image; failures come back as None and are
        // filtered out without affecting the rest.
        let parts: Vec<ContentPart> = join_all(bounded.iter().map(|r| inliner.inline(r)))
            .await
            .into_iter()
            .flatten()
            .collect();

        if !parts.is_empty() {
            attach_to_last_user_turn(&mut messages, parts);
        }
    }

    UpstreamChatRequest {
        model: config.openai_model.clone(),
        messages,
        stream: true,
        temperature: TEMPERATURE,
        max_tokens: MAX_TOKENS,
    }
}

/// Rewrite the last user turn into multimodal parts, keeping its original
/// text as the leading text part. Appends a fresh user turn when the history
/// holds no user turn at all.
fn attach_to_last_user_turn(messages: &mut Vec<ChatTurn>, images: Vec<ContentPart>) {
    let last_user = messages.iter().rposition(|m| m.role == Role::User);

    let mut parts = match last_user.map(|i| &messages[i].content) {
        Some(TurnContent::Text(text)) if !text.is_empty() => vec![ContentPart::text(text.clone())],
        Some(TurnContent::Text(_)) | None => Vec::new(),
        Some(TurnContent::Parts(existing)) => existing.clone(),
    };
    parts.extend(images);

    let turn = ChatTurn {
        role: Role::User,
        content: TurnContent::Parts(parts),
    };

    match last_user {
        Some(i) => messages[i] = turn,
        None => messages.push(turn),
    }
}

//! Prompt assembly for in-character replies.

use crate::models::api::{PromptCharacter, PromptScenario};
use crate::models::scenario::{Character, Scenario};
use crate::models::turn::Turn;
use crate::completion::Message;

/// Label used for player turns when the scenario has no player character.
pub const PLAYER_FALLBACK_NAME: &str = "Player";
/// Label used for turns whose sender is no longer in the character list.
pub const AI_FALLBACK_NAME: &str = "AI";

/// Display name for the sender of a stored turn.
pub fn speaker_name<'a>(scenario: &'a Scenario, turn: &Turn) -> &'a str {
    if turn.sender_is_player {
        scenario
            .cast()
            .player
            .map(|c| c.name.as_str())
            .filter(|n| !n.is_empty())
            .unwrap_or(PLAYER_FALLBACK_NAME)
    } else {
        scenario
            .character_by_id(&turn.sender_character_id)
            .map(|c| c.name.as_str())
            .filter(|n| !n.is_empty())
            .unwrap_or(AI_FALLBACK_NAME)
    }
}

/// `Name: text` lines for the last `window` turns, oldest first.
pub fn context_window(scenario: &Scenario, history: &[Turn], window: usize) -> String {
    let start = history.len().saturating_sub(window);
    history[start..]
        .iter()
        .map(|turn| format!("{}: {}", speaker_name(scenario, turn), turn.message_content_text))
        .collect::<Vec<_>>()
        .join("\n")
}

fn or_unset<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.trim().is_empty() {
        fallback
    } else {
        value
    }
}

/// System prompt voicing `character` inside `scenario`.
pub fn character_system_prompt(
    scenario: &Scenario,
    character: &Character,
    conversation: &str,
    player_message: &str,
) -> String {
    let traits = if character.personality_traits.is_empty() {
        "None listed".to_string()
    } else {
        character.personality_traits.join(", ")
    };

    format!(
        "You are {name}, a character in a roleplay scenario.
Character Description: {description}
Character Personality: {personality}
Character Backstory: {backstory}
Personality Traits: {traits}
Scenario Context: {scenario_description}
Current Fictional Datetime: {datetime}
Venue: {venue}

Recent conversation:
{conversation}

Player's message to you: \"{player_message}\"

Respond as {name} would, staying in character. Keep responses engaging and appropriate to the scenario.

FORMAT YOUR RESPONSE:
- Use (*action*) for any actions or physical descriptions
- Use (\"dialogue\") for any spoken words
- Example: (*walks closer and smiles*) (\"Hello there, how are you doing today?\")

Your response should be between 60-100 words. Be descriptive but concise.",
        name = character.name,
        description = or_unset(&character.description, "No description provided"),
        personality = or_unset(&character.personality, "No personality provided"),
        backstory = or_unset(&character.backstory, "No backstory provided"),
        scenario_description = or_unset(&scenario.description, "No scenario description"),
        datetime = or_unset(&scenario.current_fictional_date_time, "Not specified"),
        venue = or_unset(&scenario.venue, "Not specified"),
    )
}

/// System prompt for the stateless reply endpoint.
pub fn freeform_system_prompt(character: Option<&PromptCharacter>, scenario: Option<&PromptScenario>) -> String {
    let name = character
        .and_then(|c| c.name.as_deref())
        .filter(|n| !n.is_empty())
        .unwrap_or("an AI assistant");

    let mut prompt = format!("You are {name} in a roleplaying scenario.\n");
    if let Some(personality) = character.and_then(|c| c.personality.as_deref()).filter(|s| !s.is_empty()) {
        prompt.push_str(&format!("Your personality: {personality}\n"));
    }
    if let Some(background) = character.and_then(|c| c.background.as_deref()).filter(|s| !s.is_empty()) {
        prompt.push_str(&format!("Your background: {background}\n"));
    }
    if let Some(description) = scenario.and_then(|s| s.description.as_deref()).filter(|s| !s.is_empty()) {
        prompt.push_str(&format!("Scenario: {description}\n"));
    }
    prompt.push_str("Stay in character and respond naturally to the user's messages.");
    prompt
}

/// Keep only `user`/`assistant` turns from a client-supplied history.
pub fn sanitize_history(history: Vec<Message>) -> Vec<Message> {
    history
        .into_iter()
        .filter(|m| (m.role == "user" || m.role == "assistant") && !m.content.trim().is_empty())
        .collect()
}

//! Scenario drafting through JSON-mode chat completions.

use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info};

use crate::completion::{ChatModel, CompletionError, CompletionModel, CompletionRequest};
use crate::models::api::DraftRequest;
use crate::models::scenario::ScenarioDraft;

const DRAFT_SCHEMA: &str = r#"The output MUST be a valid JSON object with the following structure:
{
  "title": "string (scenario title)",
  "description": "string (detailed scenario description, 2-3 paragraphs)",
  "characters": [
    {
      "name": "string (character name)",
      "gender": "string (male, female, or other)",
      "isPlayer": "boolean (true for the single player character, false for AI characters)",
      "personalityTraits": ["string", "string", "string"],
      "physicalAttributes": ["string", "string", "string"],
      "backstory": "string (character backstory, 1-2 paragraphs)"
    }
  ],
  "scenes": [
    {
      "name": "string (scene/location name)",
      "description": "string (description of the scene/location, 1-2 paragraphs)"
    }
  ]
}"#;

#[derive(Debug, Error)]
pub enum DraftError {
    #[error("{0}")]
    Validation(String),
    #[error("Failed to generate scenario: {0}")]
    Completion(#[from] CompletionError),
    #[error("Failed to parse AI response into valid JSON: {source}")]
    Unparsable {
        raw: String,
        #[source]
        source: serde_json::Error,
    },
}

pub struct ScenarioDrafter {
    completer: Arc<dyn CompletionModel>,
    model: ChatModel,
    max_tokens: u32,
    temperature: f64,
}

impl ScenarioDrafter {
    pub fn new(completer: Arc<dyn CompletionModel>, model: ChatModel, max_tokens: u32, temperature: f64) -> Self {
        Self {
            completer,
            model,
            max_tokens,
            temperature,
        }
    }

    /// Draft from a plot idea, or refine an existing draft when one is given.
    pub async fn draft(&self, request: DraftRequest) -> Result<ScenarioDraft, DraftError> {
        let plot_idea = request.plot_idea.as_deref().map(str::trim).filter(|s| !s.is_empty());
        let (system_prompt, user_message) = match (plot_idea, request.scenario) {
            (Some(idea), _) => (plot_idea_prompt(), format!("Here is the plot idea: {idea}")),
            (None, Some(existing)) => {
                let instructions = request
                    .instructions
                    .as_deref()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| DraftError::Validation("Refinement instructions are required".to_string()))?;
                let current = serde_json::to_string_pretty(&existing)
                    .map_err(|source| DraftError::Unparsable { raw: String::new(), source })?;
                (
                    refine_prompt(),
                    format!("Current scenario:\n{current}\n\nRequested changes: {instructions}"),
                )
            }
            (None, None) => return Err(DraftError::Validation("Plot idea is required".to_string())),
        };

        let mut completion = CompletionRequest::new(system_prompt, user_message, self.model);
        completion.max_tokens = Some(self.max_tokens);
        completion.temperature = Some(self.temperature);
        completion.json_response = true;

        let raw = self.completer.complete(&completion).await?;
        let draft = parse_draft(&raw)?;
        info!(
            "Drafted scenario '{}' with {} characters and {} scenes",
            draft.title,
            draft.characters.len(),
            draft.scenes.len()
        );
        Ok(draft)
    }
}

fn plot_idea_prompt() -> String {
    format!(
        "You are an AI assistant for a roleplay chat application. Your task is to generate a detailed scenario based on a user's plot idea.
{DRAFT_SCHEMA}

Include 2 to 4 characters and 1 to 3 scenes. Ensure exactly one character is the player (isPlayer: true) and the others are AI characters.
If the plot doesn't specify gender or player status, make the first character a male player, and subsequent characters female AI.
Ensure all string fields are populated with relevant, creative content derived from the plot idea.
Provide rich details for personality, physical attributes, and backstory."
    )
}

fn refine_prompt() -> String {
    format!(
        "You are an AI assistant for a roleplay chat application. Your task is to revise an existing scenario according to the user's instructions.
{DRAFT_SCHEMA}

Keep everything the instructions do not ask to change. Ensure exactly one character is the player (isPlayer: true).
Return the complete revised scenario, not only the changed parts."
    )
}

/// Parse model output into a draft, tolerating a fenced code block.
pub fn parse_draft(raw: &str) -> Result<ScenarioDraft, DraftError> {
    let trimmed = raw.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();

    let mut draft: ScenarioDraft = serde_json::from_str(body).map_err(|source| {
        error!("Error parsing drafted scenario: {source}; raw response: {raw}");
        DraftError::Unparsable {
            raw: raw.to_string(),
            source,
        }
    })?;

    if !draft.characters.is_empty() && !draft.characters.iter().any(|c| c.is_player) {
        draft.characters[0].is_player = true;
    }
    Ok(draft)
}

use serde::{Deserialize, Serialize};

pub const MAX_ID_LEN: usize = 64;
pub const MAX_CONTENT_LEN: usize = 65_535;
pub const MAX_PRESENT_CHARACTERS: usize = 10;
pub const MAX_DIALOGUE_TARGETS: usize = 5;
pub const MAX_MENTIONED_CHARACTERS: usize = 10;
pub const MAX_KEY_TOPICS: usize = 20;
pub const MAX_KEY_TOPIC_LEN: usize = 100;
pub const MAX_REFERENCED_MESSAGES: usize = 5;

/// One chat message stored in a scenario's turn collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub message_id: String,
    pub scenario_id: String,
    pub turn_number: i64,
    pub real_timestamp_utc_ms: i64,
    pub sender_character_id: String,
    pub sender_is_player: bool,
    pub venue_name: String,
    pub sub_location_in_venue: String,
    pub present_character_ids_at_location: Vec<String>,
    pub fictional_datetime_iso: String,
    pub fictional_total_time_elapsed_seconds: i64,
    pub message_content_text: String,
    pub message_type: String,
    pub action_details: String,
    pub dialogue_target_ids: Vec<String>,
    // Reserved for a future enrichment pass; always written empty/zero.
    pub mentioned_character_ids_in_content: Vec<String>,
    pub key_topics_or_entities: Vec<String>,
    pub sender_expressed_emotion: String,
    pub references_previous_message_ids: Vec<String>,
    pub plot_relevance_score: f32,
    /// Empty when read back from a query.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub message_embedding: Vec<f32>,
}

/// A turn returned by similarity search with its L2 distance to the query.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredTurn {
    #[serde(flatten)]
    pub turn: Turn,
    pub distance: f64,
}

impl Turn {
    /// Check the bounded fields against the collection schema.
    pub fn validate(&self, dimensions: usize) -> Result<(), String> {
        if self.message_id.is_empty() || self.message_id.len() > MAX_ID_LEN {
            return Err(format!("message_id must be 1..={MAX_ID_LEN} chars"));
        }
        if self.scenario_id.is_empty() || self.scenario_id.len() > MAX_ID_LEN {
            return Err(format!("scenario_id must be 1..={MAX_ID_LEN} chars"));
        }
        if self.sender_character_id.len() > MAX_ID_LEN {
            return Err(format!("sender_character_id exceeds {MAX_ID_LEN} chars"));
        }
        if self.message_content_text.chars().count() > MAX_CONTENT_LEN {
            return Err(format!("message_content_text exceeds {MAX_CONTENT_LEN} chars"));
        }
        if self.message_embedding.len() != dimensions {
            return Err(format!(
                "message_embedding has {} dimensions, collection expects {dimensions}",
                self.message_embedding.len()
            ));
        }
        if !(0.0..=1.0).contains(&self.plot_relevance_score) {
            return Err("plot_relevance_score must be within 0.0..=1.0".to_string());
        }
        let bounded = [
            ("present_character_ids_at_location", &self.present_character_ids_at_location, MAX_PRESENT_CHARACTERS),
            ("dialogue_target_ids", &self.dialogue_target_ids, MAX_DIALOGUE_TARGETS),
            ("mentioned_character_ids_in_content", &self.mentioned_character_ids_in_content, MAX_MENTIONED_CHARACTERS),
            ("key_topics_or_entities", &self.key_topics_or_entities, MAX_KEY_TOPICS),
            ("references_previous_message_ids", &self.references_previous_message_ids, MAX_REFERENCED_MESSAGES),
        ];
        for (field, values, capacity) in bounded {
            if values.len() > capacity {
                return Err(format!("{field} holds {} entries, capacity is {capacity}", values.len()));
            }
        }
        let id_lists = [
            ("present_character_ids_at_location", &self.present_character_ids_at_location),
            ("dialogue_target_ids", &self.dialogue_target_ids),
            ("mentioned_character_ids_in_content", &self.mentioned_character_ids_in_content),
            ("references_previous_message_ids", &self.references_previous_message_ids),
        ];
        for (field, ids) in id_lists {
            if let Some(id) = ids.iter().find(|id| id.len() > MAX_ID_LEN) {
                return Err(format!("{field} entry '{id}' exceeds {MAX_ID_LEN} chars"));
            }
        }
        if let Some(topic) = self
            .key_topics_or_entities
            .iter()
            .find(|t| t.chars().count() > MAX_KEY_TOPIC_LEN)
        {
            return Err(format!("key topic '{topic}' exceeds {MAX_KEY_TOPIC_LEN} chars"));
        }
        Ok(())
    }
}

/// Generate a new globally unique message id.
pub fn generate_message_id() -> String {
    format!("msg_{}", uuid::Uuid::new_v4().simple())
}

#[cfg(test)]
pub(crate) fn sample_turn(scenario_id: &str, message_id: &str, dimensions: usize) -> Turn {
    Turn {
        message_id: message_id.to_string(),
        scenario_id: scenario_id.to_string(),
        turn_number: 1,
        real_timestamp_utc_ms: 1_700_000_000_000,
        sender_character_id: "player".to_string(),
        sender_is_player: true,
        venue_name: "Unknown Venue".to_string(),
        sub_location_in_venue: "Unknown Location".to_string(),
        present_character_ids_at_location: vec!["player".to_string()],
        fictional_datetime_iso: "2077-10-23T18:35:00Z".to_string(),
        fictional_total_time_elapsed_seconds: 0,
        message_content_text: "Hello".to_string(),
        message_type: "dialogue".to_string(),
        action_details: String::new(),
        dialogue_target_ids: vec![],
        mentioned_character_ids_in_content: vec![],
        key_topics_or_entities: vec![],
        sender_expressed_emotion: String::new(),
        references_previous_message_ids: vec![],
        plot_relevance_score: 0.0,
        message_embedding: vec![0.0; dimensions],
    }
}

use serde::{Deserialize, Serialize};

/// A character embedded in a scenario.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Character {
    pub id: String,
    pub name: String,
    pub gender: String,
    pub is_player: bool,
    pub personality_traits: Vec<String>,
    pub physical_attributes: Vec<String>,
    pub backstory: String,
    pub description: String,
    pub personality: String,
    /// Public avatar URL, empty when none was uploaded.
    pub avatar: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scene {
    pub name: String,
    pub description: String,
}

/// A persisted scenario as read back from the document store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    pub id: String,
    pub title: String,
    pub description: String,
    pub venue: String,
    pub current_fictional_date_time: String,
    pub fictional_total_time_elapsed_seconds: i64,
    pub characters: Vec<Character>,
    pub scenes: Vec<Scene>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

/// Scenario payload after canonicalization, ready to persist.
///
/// Every field is explicit; absent inputs become empty strings, zero or empty
/// lists so the stored document never carries null markers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewScenario {
    pub title: String,
    pub description: String,
    pub venue: String,
    pub current_fictional_date_time: String,
    pub fictional_total_time_elapsed_seconds: i64,
    pub characters: Vec<Character>,
    pub scenes: Vec<Scene>,
}

/// Structured scenario draft as produced by the drafting model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScenarioDraft {
    pub title: String,
    pub description: String,
    pub characters: Vec<Character>,
    pub scenes: Vec<Scene>,
}

/// Lightweight listing entry.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioSummary {
    pub id: String,
    pub title: String,
    pub description: String,
    pub character_count: usize,
    pub created_at: Option<String>,
}

/// The speaking roles of a scenario for one exchange.
#[derive(Debug, Clone)]
pub struct Cast<'a> {
    pub player: Option<&'a Character>,
    pub ai: Vec<&'a Character>,
}

impl Scenario {
    /// Split characters into the player and the AI-controlled characters.
    ///
    /// The first character flagged as player is the player; any further
    /// player-flagged characters neither speak nor are voiced by the model.
    /// AI characters keep their order from the character list.
    pub fn cast(&self) -> Cast<'_> {
        let player = self.characters.iter().find(|c| c.is_player);
        let ai = self.characters.iter().filter(|c| !c.is_player).collect();
        Cast { player, ai }
    }

    pub fn character_by_id(&self, id: &str) -> Option<&Character> {
        if id.is_empty() {
            return None;
        }
        self.characters.iter().find(|c| c.id == id)
    }

    pub fn summary(&self) -> ScenarioSummary {
        ScenarioSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            character_count: self.characters.len(),
            created_at: self.created_at.clone(),
        }
    }
}

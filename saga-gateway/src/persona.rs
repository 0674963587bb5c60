//! Chat modes and bot identity.

/// Mode used when the requested key is unknown.
pub const DEFAULT_MODE: &str = "general";

/// Mode key → style instruction.
pub const MODES: &[(&str, &str)] = &[
    ("emotional", "Respond with empathy and focus on feelings."),
    (
        "financial",
        "Give simple, responsible financial guidance. No legal or investment guarantees.",
    ),
    ("sarcastic", "Use polite, dry sarcasm while still being helpful."),
    ("witty", "Be clever and playful with light humor."),
    ("educational", "Explain ideas clearly and help the user learn."),
    ("guidance", "Offer thoughtful life guidance like a calm mentor."),
    (
        "mental",
        "Be gentle and supportive. Encourage healthy thinking. No medical claims.",
    ),
    ("friendly", "Stay warm, positive, and approachable."),
    ("career", "Offer practical career direction and insights."),
    ("health", "Share general wellness tips only. No diagnosis."),
    ("tech", "Explain technology in simple, clear language."),
    ("coding", "Help with programming questions and code examples."),
    ("motivation", "Encourage and energize the user with positive tone."),
    ("relationship", "Provide calm and balanced relationship advice."),
    ("parenting", "Offer supportive, non-judgmental parenting suggestions."),
    ("spiritual", "Respond with a gentle, reflective spiritual tone."),
    ("general", "Reply normally with a helpful conversational tone."),
];

/// Look up a mode's instruction, falling back to [`DEFAULT_MODE`].
pub fn mode_instruction(mode: &str) -> &'static str {
    find_mode(mode)
        .or_else(|| find_mode(DEFAULT_MODE))
        .unwrap_or_default()
}

fn find_mode(mode: &str) -> Option<&'static str> {
    MODES
        .iter()
        .find(|(key, _)| *key == mode)
        .map(|(_, instruction)| *instruction)
}

/// Who the bot says it is.
#[derive(Debug, Clone)]
pub struct BotIdentity {
    pub name: String,
    pub creator: String,
    pub website: String,
}

impl From<&saga_common::BotConfig> for BotIdentity {
    fn from(config: &saga_common::BotConfig) -> Self {
        Self {
            name: config.name.clone(),
            creator: config.creator.clone(),
            website: config.website.clone(),
        }
    }
}

impl Default for BotIdentity {
    fn default() -> Self {
        Self::from(&saga_common::BotConfig::default())
    }
}

impl BotIdentity {
    /// System preamble opening a session in `mode`.
    pub fn system_preamble(&self, mode: &str) -> String {
        format!(
            "You are {name}, a smart and friendly chatbot.\n\
             Developed by {creator}, official website {website}.\n\
             Your goal is to provide helpful, context-aware, and varied responses.\n\
             Follow the style of the selected mode: {instruction}",
            name = self.name,
            creator = self.creator,
            website = self.website,
            instruction = mode_instruction(mode),
        )
    }
}

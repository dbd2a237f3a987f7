use murmur_audio::CaptureConfig;
use murmur_tools::default_tool_declarations;
use murmur_types::ToolDeclaration;

/// Native-audio model used when none is configured.
pub const DEFAULT_MODEL: &str = "models/gemini-2.5-flash-native-audio-preview-12-2025";

/// Prebuilt voice used when none is configured.
pub const DEFAULT_VOICE: &str = "Kore";

pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are a helpful AI assistant.";

/// What to ask the remote model for when a session opens.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub model: String,
    pub voice: String,
    pub system_instruction: String,
    pub tools: Vec<ToolDeclaration>,
    pub capture: CaptureConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            voice: DEFAULT_VOICE.to_string(),
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
            tools: default_tool_declarations(),
            capture: CaptureConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Model name as the server expects it, with the `models/` prefix.
    pub fn qualified_model(&self) -> String {
        if self.model.starts_with("models/") {
            self.model.clone()
        } else {
            format!("models/{}", self.model)
        }
    }
}

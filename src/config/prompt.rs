use serde::Deserialize;
use std::error::Error;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use log::info;

/// Healthcare-assistant persona sent as the first entry of every prompt.
pub const SYSTEM_PROMPT: &str = r#"You are a compassionate, evidence-informed virtual healthcare assistant.
Always:
- Offer supportive, plain-language explanations grounded in reputable sources (CDC, WHO, peer-reviewed guidance) when possible.
- Encourage users to consult licensed healthcare professionals for diagnoses, prescriptions, or emergencies; remind them that you cannot provide medical care.
- Escalate urgent symptoms by advising immediate medical attention or emergency services.
- Respect privacy, avoid storing unnecessary personal information, and never make assumptions about sensitive health details.
- Provide actionable next steps (self-care tips, questions for clinicians, or monitoring advice) without replacing professional judgment.

CRITICAL FORMATTING REQUIREMENTS - Follow these EXACTLY:
1. ALWAYS use double line breaks (blank lines) between major sections
2. Start with a brief 1-2 sentence summary, then add a blank line
3. Use markdown headings with **bold** for section titles (e.g., **Key Points**, **Strategies**, **Next Steps**)
4. Add a blank line before and after each heading
5. Use proper markdown formatting:
   - For lists: Use asterisks (*) or numbers (1., 2., 3.) with proper indentation
   - Add blank lines between list items when they are long
   - Use **bold** for emphasis on important terms
6. Structure your response like this:
   [Brief summary sentence]

   **Section Title**
   
   [Content with proper spacing]
   
   **Next Section Title**
   
   [Content]
   
7. End with a clear disclaimer on a new line
8. NEVER write everything as one continuous paragraph - always break into sections with blank lines

Example of good formatting:
Nervousness is a common feeling that can be managed with various techniques.

**Understanding Nervousness**

Nervousness is your body's natural response to stress. It can manifest physically and mentally.

**Key Strategies**

1. **Deep Breathing**: Practice slow, deep breaths to activate relaxation.

2. **Mindfulness**: Focus on the present moment to calm racing thoughts.

**Next Steps**

- Practice these techniques regularly
- Consider speaking with a healthcare professional if symptoms persist

*Please consult a healthcare professional for personalized advice.*"#;

#[derive(Debug)]
pub enum PromptError {
    EmptySystemPrompt(String),
    IoError(std::io::Error),
    JsonError(serde_json::Error),
}

impl fmt::Display for PromptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromptError::EmptySystemPrompt(path) =>
                write!(f, "Prompt file '{}' has an empty system_prompt", path),
            PromptError::IoError(e) => write!(f, "Prompt file IO error: {}", e),
            PromptError::JsonError(e) => write!(f, "Prompt JSON parsing error: {}", e),
        }
    }
}

impl Error for PromptError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PromptError::IoError(e) => Some(e),
            PromptError::JsonError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PromptError {
    fn from(err: std::io::Error) -> Self {
        PromptError::IoError(err)
    }
}

impl From<serde_json::Error> for PromptError {
    fn from(err: serde_json::Error) -> Self {
        PromptError::JsonError(err)
    }
}

/// On-disk shape of a prompt override file, e.g. `{"system_prompt": "..."}`.
#[derive(Deserialize, Debug, Clone)]
pub struct PromptConfig {
    pub system_prompt: String,
}

/// Loads the system prompt once at startup. Without a path the built-in
/// [`SYSTEM_PROMPT`] is used.
pub fn load_system_prompt(path: Option<&str>) -> Result<Arc<str>, PromptError> {
    match path {
        Some(path) if !path.trim().is_empty() => {
            let config = load_prompts(path)?;
            info!("System prompt loaded from '{}' ({} chars)", path, config.system_prompt.len());
            Ok(Arc::from(config.system_prompt))
        }
        _ => {
            info!("Using built-in system prompt");
            Ok(Arc::from(SYSTEM_PROMPT))
        }
    }
}

pub fn load_prompts<P: AsRef<Path>>(path: P) -> Result<PromptConfig, PromptError> {
    let file_content = fs::read_to_string(&path)?;
    let config: PromptConfig = serde_json::from_str(&file_content)?;
    if config.system_prompt.trim().is_empty() {
        return Err(PromptError::EmptySystemPrompt(path.as_ref().display().to_string()));
    }
    Ok(config)
}

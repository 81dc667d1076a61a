//! Prompt templates for the improvement request

use crate::types::ImprovementCategory;

const BASE_SYSTEM_PROMPT: &str = r#"You are an expert at improving prompts for AI models.
Your task is to improve the provided prompt and suggest several alternative versions.

IMPORTANT: Answer in JSON with exactly this structure:
{
    "improved": "Improved version of the prompt",
    "alternatives": [
        "Alternative version 1",
        "Alternative version 2",
        "Alternative version 3"
    ]
}

Requirements for the improved version:
- Keep the main idea and goal of the original prompt
- Make the wording more precise and clear
- Add missing context where needed
- Fix grammar and style mistakes
- Structure it so an AI model understands it better

Requirements for the alternatives:
- Each one must be distinct and take a different approach
- Keep the meaning of the original prompt
- Offer different ways to phrase the same idea
"#;

const CODE_FOCUS: &str = r#"
ADDITIONALLY, for the improved version and the alternatives (focus on code):
- Use technical terminology precisely
- Make it clear that the AI is expected to write code
- Name the programming language when applicable
- Describe requirements in a structured way (inputs, outputs, constraints)
- Include code examples if they help clarify the task
"#;

const ANALYSIS_FOCUS: &str = r#"
ADDITIONALLY, for the improved version and the alternatives (focus on analysis):
- Make the request more detailed and structured
- State which aspects must be analyzed
- Define the expected answer format (list, table, structured text)
- Add evaluation or comparison criteria when applicable
- Use concrete questions to steer the analysis
"#;

const CREATIVE_FOCUS: &str = r#"
ADDITIONALLY, for the improved version and the alternatives (focus on creativity):
- Make the wording more vivid and expressive
- Add context that invites a creative approach
- Use livelier, more emotional language
- Offer different styles and approaches across the alternatives
- Focus on inspiration and originality
"#;

/// System prompt for `category`; `General` uses the base text only
pub fn system_prompt(category: ImprovementCategory) -> String {
    let focus = match category {
        ImprovementCategory::Code => CODE_FOCUS,
        ImprovementCategory::Analysis => ANALYSIS_FOCUS,
        ImprovementCategory::Creative => CREATIVE_FOCUS,
        ImprovementCategory::General => "",
    };
    format!("{}{}", BASE_SYSTEM_PROMPT, focus)
}

pub fn user_prompt(original: &str) -> String {
    format!(
        "Original prompt to improve:\n\n{}\n\nPlease improve this prompt and suggest several \
         alternative versions in the JSON format described in the system prompt.",
        original
    )
}

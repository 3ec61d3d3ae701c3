//! Assistant types and their instruction preambles.

use serde::{Deserialize, Serialize};

/// The fixed set of topic-scoped assistants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssistantType {
    Coding,
    Email,
    Document,
    Research,
    Meeting,
}

impl AssistantType {
    pub const ALL: [AssistantType; 5] = [
        Self::Coding,
        Self::Email,
        Self::Document,
        Self::Research,
        Self::Meeting,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Coding => "coding",
            Self::Email => "email",
            Self::Document => "document",
            Self::Research => "research",
            Self::Meeting => "meeting",
        }
    }
}

impl std::fmt::Display for AssistantType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AssistantType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "coding" => Ok(Self::Coding),
            "email" => Ok(Self::Email),
            "document" => Ok(Self::Document),
            "research" => Ok(Self::Research),
            "meeting" => Ok(Self::Meeting),
            _ => Err(format!("Unknown assistant type: {}", s)),
        }
    }
}

pub const CODING_INSTRUCTION: &str = "You are an expert coding assistant. Provide helpful, accurate code assistance, best practices, debugging help, and explanations. Focus on writing clean, efficient code. When giving examples, ensure they're well-documented and follow modern conventions.";

pub const EMAIL_INSTRUCTION: &str = "You are an email writing assistant. Help craft professional, clear, and effective emails. Suggest appropriate tone, structure, and language based on the context. Provide template suggestions and help with optimizing email content for the intended audience.";

pub const DOCUMENT_INSTRUCTION: &str = "You are a document assistant. Help create well-structured documents, suggest formatting improvements, assist with clarity and coherence, and provide high-quality content suggestions. Consider formatting, style, and organization in your recommendations.";

pub const RESEARCH_INSTRUCTION: &str = "You are a research assistant. Help with finding relevant information, synthesizing complex topics, suggesting credible sources, and organizing research findings. Provide comprehensive but concise summaries of topics with important details highlighted.";

pub const MEETING_INSTRUCTION: &str = "You are a meeting assistant. Help prepare agendas, summarize discussion points, track action items, and create effective meeting notes. Suggest meeting structures and help with time management strategies for productive discussions.";

/// Used for any tag outside the known set.
pub const DEFAULT_INSTRUCTION: &str = "You are a helpful assistant providing accurate, relevant, and useful information. Answer questions clearly and concisely, and always try to provide the most helpful response possible.";

/// Look up the instruction preamble for an assistant-type tag.
///
/// Unrecognized tags get [`DEFAULT_INSTRUCTION`]; this never fails.
pub fn instruction_for(tag: &str) -> &'static str {
    match tag.parse::<AssistantType>() {
        Ok(AssistantType::Coding) => CODING_INSTRUCTION,
        Ok(AssistantType::Email) => EMAIL_INSTRUCTION,
        Ok(AssistantType::Document) => DOCUMENT_INSTRUCTION,
        Ok(AssistantType::Research) => RESEARCH_INSTRUCTION,
        Ok(AssistantType::Meeting) => MEETING_INSTRUCTION,
        Err(_) => DEFAULT_INSTRUCTION,
    }
}

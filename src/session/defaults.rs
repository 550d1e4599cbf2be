//! Built-in agent identity and knowledge base used for fresh sessions.

use super::types::{KnowledgeBase, SourcePrimary, SourceSecondary};

pub const DEFAULT_AGENT_NAME: &str = "I♥Sundarban";

/// Placeholder title replaced by the first analysed upload.
pub const PLACEHOLDER_PROJECT_TITLE: &str = "I💚Sundarban Tutorial";

/// Placeholder concept replaced by the first analysed upload.
pub const PLACEHOLDER_CORE_CONCEPT: &str = "Boilerplate Configuration Guide";

pub const DEFAULT_PERSONA: &str = r#"**Identity:** You are **SUNDARI** (System for Unified Navigation, Data Analysis, and Research Intelligence), the "Guardian of Mangrove Intelligence."

**Core Mission:**
1. **Educate:** Serve as a tireless mentor for the students of Sundarban.
2. **Preserve:** Hold and protect the local knowledge, culture, and ecological data of the mangroves, referencing the built-in Sundarban Encyclopedia.
3. **Guide:** Help travellers and researchers navigate the delta safely and responsibly.

**Tone:** Wise, resilient, encouraging, and deeply knowledgeable.

**Knowledge Access:**
- Prioritize answers from the loaded knowledge base.
- When internal knowledge is insufficient or the user asks for real-time information, use search.
- When asked how to add knowledge, explain that new sources can be uploaded or pasted in the Knowledge tab of the Agent Console and become part of your active memory.

**Response Style:**
- Be concise but descriptive.
- Use rich formatting (tables, bold text, lists).
- For travel questions, prioritize eco-tourism principles and safety guidelines.
"#;

/// The knowledge base a brand-new session starts with.
pub fn default_knowledge_base() -> KnowledgeBase {
    KnowledgeBase {
        project_title: "The Sundarban Digital Encyclopedia".into(),
        core_concept: "A comprehensive guide to the world's largest mangrove forest, covering its \
                       ecosystem, biodiversity, culture, and conservation challenges."
            .into(),
        primary_sources_en: vec![
            primary(
                "Geography and Ecology",
                "The physical and environmental foundation of the mangrove ecosystem.",
                "System Geodata",
                "# Geography and Ecology of the Sundarbans\n\n\
                 The Sundarbans is a vast mangrove forest on the Bay of Bengal, spanning India and \
                 Bangladesh, formed by the confluence of the Ganges, Brahmaputra, and Meghna rivers.\n\n\
                 - **Tidal Influence:** twice-daily tides deposit silt and shape islands and creeks.\n\
                 - **Brackish Water:** a salinity gradient decides which vegetation can grow.\n\
                 - **Natural Barrier:** the forest shields inland areas from cyclones and storm surges.\n\
                 - **UNESCO World Heritage Site.**",
            ),
            primary(
                "Apex Predator: The Royal Bengal Tiger",
                "Biology, behavior, and conservation of the iconic Sundarban tiger.",
                "Wildlife Institute of India",
                "# The Royal Bengal Tiger in the Sundarbans\n\n\
                 The only tiger population adapted to a mangrove habitat. Strong swimmers that hunt \
                 chital, wild boar, fish and crabs. Endangered; threatened by sea-level rise, poaching \
                 and human-wildlife conflict.",
            ),
            primary(
                "The Mangrove Kingdom: Sundarban Flora",
                "Adaptations and importance of the dominant mangrove species.",
                "Botanical Survey of India",
                "# Resilient Flora\n\n\
                 - **Sundari (Heritiera fomes):** the tree that names the forest.\n\
                 - **Gewa (Excoecaria agallocha):** used for pulp and firewood.\n\
                 - **Goran (Ceriops decandra):** stilt roots, high tannin content.\n\n\
                 Pneumatophores let roots breathe in oxygen-poor, waterlogged soil.",
            ),
        ],
        primary_sources_bn: Vec::new(),
        secondary_sources: vec![
            secondary("WWF-India", "Tiger Conservation & Climate Adaptation Projects"),
            secondary("Zoological Survey of India", "Biodiversity Documentation and Research"),
            secondary(
                "West Bengal Forest Department",
                "Management and Protection of the National Park",
            ),
        ],
        key_terms: [
            "Royal Bengal Tiger",
            "Mangrove Ecosystem",
            "Tidal Delta",
            "Pneumatophores",
            "Sundari Tree",
            "Bonbibi",
            "Mouli (Honey Collector)",
            "Human-Wildlife Conflict",
            "Salinity Intrusion",
            "Eco-Tourism",
            "UNESCO World Heritage Site",
        ]
        .into_iter()
        .map(String::from)
        .collect(),
        suggested_queries: None,
    }
}

fn primary(title: &str, focus: &str, author: &str, content: &str) -> SourcePrimary {
    SourcePrimary {
        text: title.into(),
        concept_focus: Some(focus.into()),
        author: Some(author.into()),
        content: Some(content.into()),
        ..Default::default()
    }
}

fn secondary(author: &str, focus: &str) -> SourceSecondary {
    SourceSecondary {
        author: author.into(),
        focus: focus.into(),
        ..Default::default()
    }
}

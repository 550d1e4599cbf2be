//! Knowledge base edits: adding an analysed source, removing one, and
//! folding in a model-generated knowledge base.

use serde::{Deserialize, Serialize};

use super::defaults::{PLACEHOLDER_CORE_CONCEPT, PLACEHOLDER_PROJECT_TITLE};
use super::types::{KnowledgeBase, SourcePrimary, SourceSecondary};

/// Title an analysis reports when it could not name the document.
pub const UNNAMED_ANALYSIS_TITLE: &str = "Uploaded Knowledge Base";

/// Metadata extracted from a new document (by a model or supplied by the caller).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceAnalysis {
    #[serde(default)]
    pub project_title: Option<String>,
    #[serde(default)]
    pub core_concept: Option<String>,
    #[serde(default)]
    pub secondary_sources: Vec<SourceSecondary>,
    #[serde(default)]
    pub key_terms: Vec<String>,
}

impl SourceAnalysis {
    /// Used when no analysis could be produced for a document.
    pub fn fallback() -> Self {
        Self {
            project_title: Some(UNNAMED_ANALYSIS_TITLE.to_string()),
            core_concept: Some("Document Analysis".to_string()),
            ..Default::default()
        }
    }
}

/// Add a document as a new primary source.
///
/// The new source goes first, the analysis' secondary sources are prepended,
/// key terms are unioned. Title and core concept are only replaced while they
/// still hold their placeholder (or are blank).
pub fn add_source(kb: &mut KnowledgeBase, title: &str, content: &str, analysis: SourceAnalysis) {
    let analysed_title = analysis
        .project_title
        .clone()
        .filter(|t| !t.is_empty() && t != UNNAMED_ANALYSIS_TITLE);

    let source = SourcePrimary {
        text: analysed_title.clone().unwrap_or_else(|| title.to_string()),
        concept_focus: analysis.core_concept.clone().filter(|c| !c.is_empty()),
        content: Some(content.to_string()),
        ..Default::default()
    };

    if kb.project_title.is_empty() || kb.project_title == PLACEHOLDER_PROJECT_TITLE {
        kb.project_title = analysed_title.unwrap_or_else(|| title.to_string());
    }
    if kb.core_concept.is_empty() || kb.core_concept == PLACEHOLDER_CORE_CONCEPT {
        kb.core_concept = analysis
            .core_concept
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| "Custom Knowledge".to_string());
    }

    kb.primary_sources_en.insert(0, source);

    let mut secondary = analysis.secondary_sources;
    secondary.append(&mut kb.secondary_sources);
    kb.secondary_sources = secondary;

    kb.key_terms.extend(
        analysis
            .key_terms
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty()),
    );
}

/// Remove the primary source at `index`. Returns the removed source, if any.
pub fn remove_source(kb: &mut KnowledgeBase, index: usize) -> Option<SourcePrimary> {
    (index < kb.primary_sources_en.len()).then(|| kb.primary_sources_en.remove(index))
}

/// A knowledge base drafted by the model from a persona or a description.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratedKnowledge {
    pub project_title: String,
    pub core_concept: String,
    pub primary_sources_en: Vec<SourcePrimary>,
    pub secondary_sources: Vec<SourceSecondary>,
    pub key_terms: Vec<String>,
    pub suggested_queries: Vec<String>,
}

/// How generated primary sources combine with the existing ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceMerge {
    /// Generated sources go after the existing ones.
    Append,
    /// Generated sources replace the English primary sources.
    Replace,
}

/// Fold a generated knowledge base into `kb`.
///
/// Title, core concept, secondary sources, key terms and starters are
/// replaced. Bengali primary sources are left alone.
pub fn apply_generated(kb: &mut KnowledgeBase, generated: GeneratedKnowledge, sources: SourceMerge) {
    kb.project_title = generated.project_title;
    kb.core_concept = generated.core_concept;
    match sources {
        SourceMerge::Append => kb.primary_sources_en.extend(generated.primary_sources_en),
        SourceMerge::Replace => kb.primary_sources_en = generated.primary_sources_en,
    }
    kb.secondary_sources = generated.secondary_sources;
    kb.key_terms = generated
        .key_terms
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();
    let queries: Vec<String> = generated
        .suggested_queries
        .into_iter()
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty())
        .collect();
    kb.suggested_queries = (!queries.is_empty()).then_some(queries);
}

/// Parse comma-separated starter queries, trimming and dropping blanks.
pub fn parse_suggested_queries(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

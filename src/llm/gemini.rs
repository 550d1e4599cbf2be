//! Gemini REST client: `streamGenerateContent` over SSE plus one-shot `generateContent`.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Url;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use super::{
    effective_system_instruction, recent_history, resolve_api_key, translation_prompt,
    AgentConfiguration, ChatModel, ChatRequest, LlmError, PersonaVariation,
};
use crate::config::LlmConfig;
use crate::session::knowledge::{GeneratedKnowledge, SourceAnalysis};
use crate::session::types::{Attachment, SourcePrimary, SourceSecondary};
use crate::store::local::LocalStore;

/// Characters of a document sent for analysis.
const ANALYSIS_SNIPPET_CHARS: usize = 30_000;

pub struct GeminiClient {
    config: LlmConfig,
    client: reqwest::Client,
    local: Arc<LocalStore>,
}

impl GeminiClient {
    pub fn new(config: LlmConfig, local: Arc<LocalStore>) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_default();
        Self {
            config,
            client,
            local,
        }
    }

    /// Whether a key is available from either source.
    pub fn is_configured(&self) -> bool {
        resolve_api_key(&self.local, &self.config.api_key).is_ok()
    }

    fn model_url(&self, model: &str, method: &str) -> Result<Url, LlmError> {
        let base = self.config.base_url.trim_end_matches('/');
        Url::parse(&format!("{base}/models/{model}:{method}"))
            .map_err(|e| LlmError::Transport(format!("invalid model url: {e}")))
    }

    async fn post(&self, url: Url, body: &Value) -> Result<reqwest::Response, LlmError> {
        let key = resolve_api_key(&self.local, &self.config.api_key)?;
        let resp = self
            .client
            .post(url)
            .header("x-goog-api-key", key)
            .json(body)
            .send()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(resp)
    }

    /// One-shot generation with the default model; returns the reply text.
    async fn generate(&self, body: Value) -> Result<String, LlmError> {
        let url = self.model_url(&self.config.model, "generateContent")?;
        let resp = self.post(url, &body).await?;
        let value: Value = resp
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;
        chunk_text(&value)
    }
}

#[async_trait]
impl ChatModel for GeminiClient {
    async fn stream_chat(
        &self,
        request: &ChatRequest,
        on_text: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<String, LlmError> {
        let (model, body) = build_chat_body(request, &self.config);
        let mut url = self.model_url(&model, "streamGenerateContent")?;
        url.query_pairs_mut().append_pair("alt", "sse");

        tracing::debug!(model = %model, turns = request.history.len(), "streaming chat request");
        let resp = self.post(url, &body).await?;

        let mut stream = resp.bytes_stream();
        let mut events = SseBuffer::default();
        let mut full = String::new();

        while let Some(chunk) = stream.next().await {
            let bytes = chunk.map_err(|e| LlmError::Transport(e.to_string()))?;
            for data in events.push(&bytes) {
                append_event(&data, &mut full, on_text)?;
            }
        }
        if let Some(data) = events.finish() {
            append_event(&data, &mut full, on_text)?;
        }

        Ok(full)
    }

    async fn translate(&self, text: &str) -> Result<String, LlmError> {
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": translation_prompt(text) }] }],
        });
        let translated = self.generate(body).await?;
        Ok(if translated.is_empty() {
            text.to_string()
        } else {
            translated
        })
    }

    async fn analyze_source(&self, content: &str) -> Result<SourceAnalysis, LlmError> {
        let snippet: String = content.chars().take(ANALYSIS_SNIPPET_CHARS).collect();
        let body = json!({
            "contents": [{
                "role": "user",
                "parts": [
                    { "text": ANALYSIS_PROMPT },
                    { "text": format!("DOCUMENT CONTENT (Snippet):\n{snippet}...") },
                ],
            }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": analysis_schema(),
            },
        });
        let raw = self.generate(body).await?;
        parse_analysis(&raw)
    }

    async fn persona_variations(&self, description: &str) -> Result<Vec<PersonaVariation>, LlmError> {
        let schema = json!({
            "type": "OBJECT",
            "properties": {
                "variations": {
                    "type": "ARRAY",
                    "items": {
                        "type": "OBJECT",
                        "properties": {
                            "title": { "type": "STRING" },
                            "tone": { "type": "STRING" },
                            "content": { "type": "STRING" },
                        },
                    },
                },
            },
        });
        let raw = self
            .generate(json_request(&persona_variations_prompt(description), schema))
            .await?;
        parse_variations(&raw)
    }

    async fn draft_persona(&self, description: &str) -> Result<String, LlmError> {
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": persona_draft_prompt(description) }] }],
        });
        Ok(self.generate(body).await?.trim().to_string())
    }

    async fn knowledge_from_persona(&self, persona: &str) -> Result<GeneratedKnowledge, LlmError> {
        let raw = self
            .generate(json_request(&knowledge_prompt(persona), knowledge_schema()))
            .await?;
        let parsed: RawKnowledge =
            serde_json::from_str(&raw).map_err(|e| LlmError::Parse(format!("knowledge base: {e}")))?;
        Ok(parsed.into_generated("Custom Assistant"))
    }

    async fn configure_agent(&self, description: &str) -> Result<AgentConfiguration, LlmError> {
        let schema = json!({
            "type": "OBJECT",
            "properties": {
                "appName": { "type": "STRING" },
                "persona": { "type": "STRING" },
                "syllabus": knowledge_schema(),
            },
        });
        let raw = self
            .generate(json_request(&configuration_prompt(description), schema))
            .await?;
        parse_configuration(&raw)
    }
}

/// One-shot request whose reply must be JSON matching `schema`.
fn json_request(prompt: &str, schema: Value) -> Value {
    json!({
        "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
        "generationConfig": {
            "responseMimeType": "application/json",
            "responseSchema": schema,
        },
    })
}

fn persona_variations_prompt(description: &str) -> String {
    format!(
        "Based on this user description: \"{description}\", generate 3 distinct System Persona variations for an AI Assistant.\n\n\
         1. Variation 1: Balanced/Helpful (Standard interpretation)\n\
         2. Variation 2: Strict/Academic (Formal, concise, expert)\n\
         3. Variation 3: Socratic/Creative (Engaging, asks questions, illustrative)\n\n\
         Return a JSON object containing an array of variations. Each variation must have a 'title' (short name), \
         'tone' (1-2 words), and 'content' (the actual system instruction text, approx 100 words)."
    )
}

fn persona_draft_prompt(description: &str) -> String {
    format!(
        "Create a detailed System Persona/System Instruction for an AI Assistant based on this description:\n\
         \"{description}\"\n\n\
         The persona should define:\n\
         1. Core Identity & Role\n\
         2. Goal/Objective\n\
         3. Tone & Style\n\
         4. Operational Rules (what to do/not do)\n\n\
         Keep it concise but effective (approx 100-150 words).\n\
         Return ONLY the persona text, no conversational filler."
    )
}

fn knowledge_prompt(persona: &str) -> String {
    format!(
        "Based on the following AI Persona, generate a structured Knowledge Base (Syllabus) that this persona would likely reference or study.\n\n\
         PERSONA:\n\"{persona}\"\n\n\
         TASKS:\n\
         1. Create a \"Project Title\" relevant to this persona's field.\n\
         2. Identify the \"Core Concept\" they specialize in.\n\
         3. List 3-5 \"Primary Sources\" (Real books, papers, or foundational texts) that are authoritative in this field.\n\
         4. List 3-5 \"Secondary Sources\" (Prominent scholars or experts).\n\
         5. List 5-8 \"Key Terms\" relevant to the field.\n\
         6. Generate 4 \"Suggested Queries\" (Chat Starters). They must be VERY SHORT, concise one-liners (max 6 words) that act as quick hooks.\n\n\
         Return as JSON matching the SyllabusData structure."
    )
}

fn configuration_prompt(description: &str) -> String {
    format!(
        "Based on this description: \"{description}\", configure a complete AI Agent.\n\n\
         1. Name: A creative name for the agent (App Name).\n\
         2. Persona: A detailed system instruction defining its role, tone, and goals.\n\
         3. Syllabus: A knowledge base structure including Project Title, Core Concept, 3 Primary Sources, \
         3 Secondary Sources, 5 Key Terms, and 4 short Chat Starters.\n\n\
         Return JSON."
    )
}

fn knowledge_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "project_title": { "type": "STRING" },
            "core_concept": { "type": "STRING" },
            "primary_sources_en": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "text": { "type": "STRING" },
                        "author": { "type": "STRING" },
                        "concept_focus": { "type": "STRING" },
                    },
                },
            },
            "secondary_sources": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "author": { "type": "STRING" },
                        "focus": { "type": "STRING" },
                    },
                },
            },
            "key_terms": { "type": "ARRAY", "items": { "type": "STRING" } },
            "suggested_queries": { "type": "ARRAY", "items": { "type": "STRING" } },
        },
    })
}

const ANALYSIS_PROMPT: &str = "Analyze the provided document content.\n\
1. Identify a suitable Project Title and the Core Concept being discussed.\n\
2. Identify if this document represents a Primary Source (e.g., a specific book, article, paper). Return its title, author, and main focus.\n\
3. Identify important Key Terms defined or discussed in the text.\n\
4. Identify any Secondary Sources (other scholars or works) referenced significantly.\n\n\
Return the result as a valid JSON object matching the requested schema.";

fn analysis_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "project_title": { "type": "STRING" },
            "core_concept": { "type": "STRING" },
            "primary_sources": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "text": { "type": "STRING" },
                        "author": { "type": "STRING" },
                        "concept_focus": { "type": "STRING" },
                    },
                },
            },
            "secondary_sources": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "author": { "type": "STRING" },
                        "focus": { "type": "STRING" },
                    },
                },
            },
            "key_terms": { "type": "ARRAY", "items": { "type": "STRING" } },
        },
    })
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawAnalysis {
    project_title: Option<String>,
    core_concept: Option<String>,
    secondary_sources: Vec<RawSecondary>,
    key_terms: Vec<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawSecondary {
    author: Option<String>,
    focus: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawPrimary {
    text: Option<String>,
    author: Option<String>,
    concept_focus: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawKnowledge {
    project_title: Option<String>,
    core_concept: Option<String>,
    primary_sources_en: Vec<RawPrimary>,
    secondary_sources: Vec<RawSecondary>,
    key_terms: Vec<String>,
    suggested_queries: Vec<String>,
}

impl RawKnowledge {
    fn into_generated(self, fallback_title: &str) -> GeneratedKnowledge {
        GeneratedKnowledge {
            project_title: non_empty(self.project_title).unwrap_or_else(|| fallback_title.to_string()),
            core_concept: non_empty(self.core_concept).unwrap_or_else(|| "General".to_string()),
            primary_sources_en: self
                .primary_sources_en
                .into_iter()
                .filter_map(|p| {
                    Some(SourcePrimary {
                        text: non_empty(p.text)?,
                        author: non_empty(p.author),
                        concept_focus: non_empty(p.concept_focus),
                        ..Default::default()
                    })
                })
                .collect(),
            secondary_sources: secondaries(self.secondary_sources),
            key_terms: self.key_terms,
            suggested_queries: self.suggested_queries,
        }
    }
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawConfiguration {
    #[serde(rename = "appName")]
    app_name: Option<String>,
    persona: Option<String>,
    syllabus: Option<RawKnowledge>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawVariations {
    variations: Vec<PersonaVariation>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Secondary sources without an author are dropped.
fn secondaries(raw: Vec<RawSecondary>) -> Vec<SourceSecondary> {
    raw.into_iter()
        .filter_map(|s| {
            Some(SourceSecondary {
                author: non_empty(s.author)?,
                focus: s.focus.unwrap_or_default(),
                ..Default::default()
            })
        })
        .collect()
}

fn parse_analysis(raw: &str) -> Result<SourceAnalysis, LlmError> {
    let parsed: RawAnalysis =
        serde_json::from_str(raw).map_err(|e| LlmError::Parse(format!("analysis: {e}")))?;
    Ok(SourceAnalysis {
        project_title: non_empty(parsed.project_title),
        core_concept: non_empty(parsed.core_concept),
        secondary_sources: secondaries(parsed.secondary_sources),
        key_terms: parsed.key_terms,
    })
}

fn parse_variations(raw: &str) -> Result<Vec<PersonaVariation>, LlmError> {
    let parsed: RawVariations =
        serde_json::from_str(raw).map_err(|e| LlmError::Parse(format!("persona variations: {e}")))?;
    Ok(parsed
        .variations
        .into_iter()
        .filter(|v| !v.content.trim().is_empty())
        .collect())
}

fn parse_configuration(raw: &str) -> Result<AgentConfiguration, LlmError> {
    let parsed: RawConfiguration =
        serde_json::from_str(raw).map_err(|e| LlmError::Parse(format!("agent configuration: {e}")))?;
    Ok(AgentConfiguration {
        app_name: non_empty(parsed.app_name).unwrap_or_else(|| "New Agent".to_string()),
        persona: non_empty(parsed.persona).unwrap_or_else(|| "You are a helpful assistant.".to_string()),
        knowledge_base: parsed.syllabus.unwrap_or_default().into_generated("New Project"),
    })
}

fn inline_parts(text: &str, attachments: Option<&[Attachment]>) -> Vec<Value> {
    let mut parts = vec![json!({ "text": text })];
    for att in attachments.unwrap_or_default() {
        parts.push(json!({
            "inlineData": { "mimeType": att.mime_type, "data": att.data }
        }));
    }
    parts
}

/// Model name and request body for a chat turn.
pub fn build_chat_body(request: &ChatRequest, config: &LlmConfig) -> (String, Value) {
    let opts = &request.options;

    let mut contents: Vec<Value> = recent_history(&request.history, config.history_limit)
        .iter()
        .map(|m| {
            json!({
                "role": m.role.as_str(),
                "parts": inline_parts(&m.text, m.attachments.as_deref()),
            })
        })
        .collect();
    contents.push(json!({
        "role": "user",
        "parts": inline_parts(&request.text, Some(request.attachments.as_slice())),
    }));

    let system = effective_system_instruction(
        &request.persona,
        &request.knowledge_base,
        opts.search_focus.as_deref(),
    );

    let temperature = if opts.use_thinking { 0.7 } else { 0.3 };
    let mut generation = json!({ "temperature": temperature });
    if opts.use_thinking {
        generation["thinkingConfig"] = json!({ "thinkingBudget": config.thinking_budget });
    }

    let mut body = json!({
        "contents": contents,
        "systemInstruction": { "parts": [{ "text": system }] },
        "generationConfig": generation,
    });
    if opts.use_search {
        body["tools"] = json!([{ "googleSearch": {} }]);
    }

    let model = if opts.use_thinking {
        &config.thinking_model
    } else {
        &config.model
    };
    (model.clone(), body)
}

/// Concatenated visible text of the first candidate. Thought parts are skipped.
pub fn chunk_text(value: &Value) -> Result<String, LlmError> {
    if let Some(err) = value.get("error") {
        return Err(LlmError::Api {
            status: err.get("code").and_then(Value::as_u64).unwrap_or(500) as u16,
            message: err
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string(),
        });
    }
    let parts = value
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array);
    let text = parts
        .into_iter()
        .flatten()
        .filter(|p| !p.get("thought").and_then(Value::as_bool).unwrap_or(false))
        .filter_map(|p| p.get("text").and_then(Value::as_str))
        .collect();
    Ok(text)
}

fn append_event(
    data: &str,
    full: &mut String,
    on_text: &mut (dyn for<'a> FnMut(&'a str) + Send),
) -> Result<(), LlmError> {
    if data == "[DONE]" {
        return Ok(());
    }
    let value: Value =
        serde_json::from_str(data).map_err(|e| LlmError::Parse(format!("stream chunk: {e}")))?;
    let text = chunk_text(&value)?;
    full.push_str(&text);
    on_text(full);
    Ok(())
}

/// Incremental server-sent-events decoder. Yields the `data` payload of each event.
#[derive(Debug, Default)]
pub struct SseBuffer {
    pending: Vec<u8>,
    data: Vec<String>,
}

impl SseBuffer {
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut events = Vec::new();

        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if let Some(event) = self.take_event() {
                    events.push(event);
                }
            } else if let Some(rest) = line.strip_prefix("data:") {
                self.data.push(rest.strip_prefix(' ').unwrap_or(rest).to_string());
            }
        }
        events
    }

    /// Flush an event left open when the stream ended without a blank line.
    pub fn finish(&mut self) -> Option<String> {
        if !self.pending.is_empty() {
            let rest: Vec<u8> = std::mem::take(&mut self.pending);
            let line = String::from_utf8_lossy(&rest);
            if let Some(data) = line.trim_end().strip_prefix("data:") {
                self.data.push(data.trim_start().to_string());
            }
        }
        self.take_event()
    }

    fn take_event(&mut self) -> Option<String> {
        if self.data.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.data).join("\n"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ChatOptions;
    use crate::session::types::{ChatMessage, KnowledgeBase, Role};

    fn request(options: ChatOptions) -> ChatRequest {
        ChatRequest {
            history: vec![ChatMessage::new(Role::User, "hello"), ChatMessage::new(Role::Model, "hi")],
            text: "What lives in the mangroves?".into(),
            attachments: vec![Attachment {
                mime_type: "image/png".into(),
                data: "iVBORw0KGgo=".into(),
                name: Some("tiger.png".into()),
            }],
            options,
            persona: "You are SUNDARI.".into(),
            knowledge_base: KnowledgeBase::default(),
        }
    }

    #[test]
    fn default_request_uses_fast_model() {
        let (model, body) = build_chat_body(&request(ChatOptions::default()), &LlmConfig::default());
        assert_eq!(model, "gemini-2.5-flash");
        assert_eq!(body["generationConfig"]["temperature"], 0.3);
        assert!(body["generationConfig"].get("thinkingConfig").is_none());
        assert!(body.get("tools").is_none());

        let contents = body["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[2]["parts"][1]["inlineData"]["mimeType"], "image/png");
    }

    #[test]
    fn thinking_and_search_switch_model_and_tools() {
        let options = ChatOptions {
            use_thinking: true,
            use_search: true,
            search_focus: None,
        };
        let (model, body) = build_chat_body(&request(options), &LlmConfig::default());
        assert_eq!(model, "gemini-3-pro-preview");
        assert_eq!(body["generationConfig"]["temperature"], 0.7);
        assert_eq!(body["generationConfig"]["thinkingConfig"]["thinkingBudget"], 32768);
        assert!(body["tools"][0].get("googleSearch").is_some());
    }

    #[test]
    fn sse_events_survive_split_chunks() {
        let mut sse = SseBuffer::default();
        assert!(sse.push(b"data: {\"a\":").is_empty());
        let events = sse.push(b"1}\r\n\r\ndata: {\"b\":2}\n\n");
        assert_eq!(events, vec!["{\"a\":1}".to_string(), "{\"b\":2}".to_string()]);

        sse.push(b"data: tail");
        assert_eq!(sse.finish().as_deref(), Some("tail"));
        assert!(sse.finish().is_none());
    }

    #[test]
    fn chunk_text_skips_thoughts() {
        let value = json!({
            "candidates": [{ "content": { "parts": [
                { "text": "pondering", "thought": true },
                { "text": "Royal " },
                { "text": "Bengal tiger" },
            ]}}]
        });
        assert_eq!(chunk_text(&value).unwrap(), "Royal Bengal tiger");
        assert_eq!(chunk_text(&json!({ "candidates": [] })).unwrap(), "");
    }

    #[test]
    fn error_payload_becomes_api_error() {
        let value = json!({ "error": { "code": 429, "message": "quota" } });
        match chunk_text(&value) {
            Err(LlmError::Api { status, message }) => {
                assert_eq!(status, 429);
                assert_eq!(message, "quota");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn analysis_drops_nameless_secondaries() {
        let raw = r#"{"project_title":"Mangrove Ecology","core_concept":"","secondary_sources":[{"author":"Annu Jalais","focus":"Forest"},{"focus":"orphan"}],"key_terms":["Bonbibi"]}"#;
        let analysis = parse_analysis(raw).unwrap();
        assert_eq!(analysis.project_title.as_deref(), Some("Mangrove Ecology"));
        assert!(analysis.core_concept.is_none());
        assert_eq!(analysis.secondary_sources.len(), 1);
        assert_eq!(analysis.key_terms, vec!["Bonbibi".to_string()]);
    }

    #[test]
    fn configuration_fills_missing_fields() {
        let raw = r#"{"persona":"","syllabus":{"primary_sources_en":[{"text":"The Hungry Tide","author":"Amitav Ghosh"},{"author":"untitled"}],"key_terms":["Bonbibi"]}}"#;
        let config = parse_configuration(raw).unwrap();
        assert_eq!(config.app_name, "New Agent");
        assert_eq!(config.persona, "You are a helpful assistant.");
        assert_eq!(config.knowledge_base.project_title, "New Project");
        assert_eq!(config.knowledge_base.core_concept, "General");
        assert_eq!(config.knowledge_base.primary_sources_en.len(), 1);
        assert_eq!(
            config.knowledge_base.primary_sources_en[0].author.as_deref(),
            Some("Amitav Ghosh")
        );

        let empty = parse_configuration("{}").unwrap();
        assert!(empty.knowledge_base.primary_sources_en.is_empty());
    }

    #[test]
    fn variations_without_content_are_dropped() {
        let raw = r#"{"variations":[{"title":"Guide","tone":"Warm","content":"You are a guide."},{"title":"Empty","tone":"","content":" "}]}"#;
        let variations = parse_variations(raw).unwrap();
        assert_eq!(variations.len(), 1);
        assert_eq!(variations[0].title, "Guide");
        assert!(parse_variations("{}").unwrap().is_empty());
        assert!(matches!(parse_variations("nope"), Err(LlmError::Parse(_))));
    }
}

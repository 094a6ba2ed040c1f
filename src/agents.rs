use std::fmt;

use handlebars::Handlebars;
use jsonschema::{Draft, JSONSchema};
use schemars::{gen::SchemaSettings, JsonSchema};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};

use crate::{
    types::{ChatMessage, CompletionRequest},
    LLMError, LLMProvider,
};

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("template render error: {0}")]
    TemplateRender(#[from] handlebars::RenderError),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("{agent} returned no JSON object")]
    MissingStructuredOutput { agent: String },
    #[error("invalid output schema: {0}")]
    InvalidSchema(String),
    #[error("{agent} output violated its schema: {}", .errors.join("; "))]
    SchemaViolation { agent: String, errors: Vec<String> },
    #[error(transparent)]
    Provider(#[from] LLMError),
}

/// Immutable role configuration for one model-backed participant: the
/// simulated patient, a subject assistant, the judge, or the extractor.
#[derive(Clone)]
pub struct Agent {
    name: String,
    instructions: String,
    temperature: Option<f32>,
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.name)
            .field("temperature", &self.temperature)
            .finish()
    }
}

impl Agent {
    pub fn from_string(name: impl Into<String>, instructions: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instructions: instructions.into(),
            temperature: None,
        }
    }

    /// Renders `template` with `data`. Values are inserted verbatim, without
    /// HTML escaping.
    pub fn from_handlebars_str<T: Serialize>(
        name: impl Into<String>,
        template: &str,
        data: &T,
    ) -> Result<Self, AgentError> {
        let mut hb = Handlebars::new();
        hb.register_escape_fn(handlebars::no_escape);
        let rendered = hb.render_template(template, data)?;

        Ok(Self::from_string(name, rendered))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    fn build_request(&self, model: &str, history: &[ChatMessage]) -> CompletionRequest {
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(ChatMessage::system(self.instructions.clone()));
        messages.extend(history.iter().cloned());

        let mut request = CompletionRequest::new(model.to_string(), messages);
        if let Some(temperature) = self.temperature {
            request = request.with_temperature(temperature);
        }

        request
    }

    /// One free-text completion. A reply without content becomes `""`.
    pub async fn complete(
        &self,
        provider: &dyn LLMProvider,
        model: &str,
        history: &[ChatMessage],
    ) -> Result<String, AgentError> {
        let request = self.build_request(model, history);
        let response = provider.complete(request).await?;
        Ok(response.message.text().unwrap_or_default().to_string())
    }

    /// One completion constrained to the JSON schema of `T`. The reply may be
    /// bare JSON, a fenced block, or JSON embedded in prose; it is validated
    /// against the schema before deserialization.
    pub async fn complete_structured<T>(
        &self,
        provider: &dyn LLMProvider,
        model: &str,
        history: &[ChatMessage],
    ) -> Result<T, AgentError>
    where
        T: JsonSchema + DeserializeOwned,
    {
        let schema = schema_value::<T>()?;
        let request = self
            .build_request(model, history)
            .with_response_format(json!({
                "type": "json_schema",
                "json_schema": {
                    "name": T::schema_name(),
                    "schema": schema.clone(),
                    "strict": false,
                }
            }));

        let response = provider.complete(request).await?;
        let content = response.message.text().unwrap_or_default();
        let value = extract_json(content).ok_or_else(|| AgentError::MissingStructuredOutput {
            agent: self.name.clone(),
        })?;

        let compiled = JSONSchema::options()
            .with_draft(Draft::Draft7)
            .compile(&schema)
            .map_err(|e| AgentError::InvalidSchema(e.to_string()))?;
        if let Err(errors) = compiled.validate(&value) {
            let errors = errors.take(5).map(|e| e.to_string()).collect();
            return Err(AgentError::SchemaViolation {
                agent: self.name.clone(),
                errors,
            });
        }

        Ok(serde_json::from_value(value)?)
    }
}

fn schema_value<T: JsonSchema>() -> Result<Value, AgentError> {
    let settings = SchemaSettings::draft07().with(|s| s.inline_subschemas = true);
    let schema = settings.into_generator().into_root_schema_for::<T>();
    Ok(serde_json::to_value(schema)?)
}

fn extract_json(content: &str) -> Option<Value> {
    let trimmed = content.trim();
    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }

    if let Some(fenced) = extract_json_from_fenced_block(content) {
        if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(&fenced) {
            return Some(value);
        }
    }

    last_embedded_object(content)
}

fn extract_json_from_fenced_block(content: &str) -> Option<String> {
    let start = content.find("```json").or_else(|| content.find("```"))?;
    let remainder = &content[start..];
    let after_language = remainder.find('\n')?;
    let body = &remainder[after_language + 1..];
    let end = body.find("```")?;
    Some(body[..end].trim().to_string())
}

/// Tries a streaming parse at every `{` outside an already parsed object and
/// keeps the last object that decodes. serde_json handles quoting, so braces
/// inside string values never split a candidate.
fn last_embedded_object(content: &str) -> Option<Value> {
    let mut found = None;
    let mut cursor = 0;

    while let Some(offset) = content[cursor..].find('{') {
        let start = cursor + offset;
        let mut stream = serde_json::Deserializer::from_str(&content[start..]).into_iter::<Value>();
        match stream.next() {
            Some(Ok(value @ Value::Object(_))) => {
                cursor = start + stream.byte_offset();
                found = Some(value);
            }
            _ => cursor = start + 1,
        }
    }

    found
}

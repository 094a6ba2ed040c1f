use std::{collections::VecDeque, fs, path::Path, sync::Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    providers::LLMProvider,
    types::{ChatMessage, CompletionRequest, CompletionResponse},
    LLMError,
};

/// One canned conversation partner. A route answers every request whose system
/// prompt contains `marker`; queued responses are consumed first, then the
/// fallback repeats.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptedRoute {
    pub marker: String,
    #[serde(default)]
    pub responses: Vec<String>,
    #[serde(default)]
    pub fallback: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScriptFile {
    pub routes: Vec<ScriptedRoute>,
}

struct RouteState {
    marker: String,
    queue: Mutex<VecDeque<String>>,
    fallback: Option<String>,
}

#[derive(Default)]
pub struct ScriptedProvider {
    routes: Vec<RouteState>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    pub fn from_routes(routes: impl IntoIterator<Item = ScriptedRoute>) -> Self {
        let mut provider = Self::new();
        for route in routes {
            provider = provider.with_route(route);
        }
        provider
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, LLMError> {
        let raw = fs::read_to_string(path.as_ref())
            .map_err(|e| LLMError::Provider(format!("cannot read script: {e}")))?;
        let script: ScriptFile = serde_yaml::from_str(&raw)
            .map_err(|e| LLMError::Provider(format!("invalid script: {e}")))?;
        Ok(Self::from_routes(script.routes))
    }

    pub fn with_route(mut self, route: ScriptedRoute) -> Self {
        self.routes.push(RouteState {
            marker: route.marker,
            queue: Mutex::new(route.responses.into()),
            fallback: route.fallback,
        });
        self
    }

    /// Route that always answers with the same text.
    pub fn with_fixed(self, marker: impl Into<String>, response: impl Into<String>) -> Self {
        self.with_route(ScriptedRoute {
            marker: marker.into(),
            responses: Vec::new(),
            fallback: Some(response.into()),
        })
    }

    fn next_response(&self, system_prompt: &str) -> Option<String> {
        let route = self
            .routes
            .iter()
            .find(|route| system_prompt.contains(&route.marker))?;
        let queued = route
            .queue
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front());
        queued.or_else(|| route.fallback.clone())
    }
}

#[async_trait]
impl LLMProvider for ScriptedProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LLMError> {
        let system_prompt = request.system_prompt().unwrap_or_default();
        match self.next_response(system_prompt) {
            Some(response) => Ok(CompletionResponse {
                message: ChatMessage::assistant(response),
                usage: None,
            }),
            None => Err(LLMError::Provider("no more scripted responses".to_string())),
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(system: &str) -> CompletionRequest {
        CompletionRequest::new(
            "scripted",
            vec![ChatMessage::system(system), ChatMessage::user("hello")],
        )
    }

    #[tokio::test]
    async fn queued_responses_then_fallback() {
        let provider = ScriptedProvider::new().with_route(ScriptedRoute {
            marker: "patient".to_string(),
            responses: vec!["first".to_string()],
            fallback: Some("again".to_string()),
        });

        let first = provider.complete(request("you are the patient")).await.unwrap();
        let second = provider.complete(request("you are the patient")).await.unwrap();
        assert_eq!(first.message.text(), Some("first"));
        assert_eq!(second.message.text(), Some("again"));
    }

    #[tokio::test]
    async fn unmatched_request_is_an_error() {
        let provider = ScriptedProvider::new().with_fixed("judge", "{}");
        let err = provider.complete(request("you are the patient")).await.unwrap_err();
        assert!(matches!(err, LLMError::Provider(_)));
    }

    #[test]
    fn parses_yaml_script() {
        let script: ScriptFile = serde_yaml::from_str(
            "routes:\n  - marker: PATIENT\n    responses: [\"hi\"]\n  - marker: JUDGE\n    fallback: \"{}\"\n",
        )
        .unwrap();
        assert_eq!(script.routes.len(), 2);
        assert_eq!(script.routes[1].fallback.as_deref(), Some("{}"));
    }
}

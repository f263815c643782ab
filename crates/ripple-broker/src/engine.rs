//! Query-engine boundary.
//!
//! The broker never executes query documents itself. A [`QueryEngine`]
//! resolves a `subscribe` payload to its root field and arguments, and
//! renders the `next` payload for an event. [`PassthroughEngine`] is the
//! built-in engine: it reads the root field of a single-field subscription
//! and returns the event payload verbatim under that field.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use ripple_core::{GraphqlError, PubSubEvent, SubscribePayload, Subscription};
use serde_json::{Map, Value, json};

/// Root field and arguments of a subscribe payload.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedOperation {
    /// Root subscription field.
    pub field: String,
    /// Field arguments with variables substituted.
    pub args: Map<String, Value>,
}

/// Resolves subscribe payloads and renders results.
#[async_trait]
pub trait QueryEngine: Send + Sync {
    /// Validate `payload` and extract its root field and arguments.
    fn resolve(&self, payload: &SubscribePayload) -> Result<ResolvedOperation, Vec<GraphqlError>>;

    /// Execution result (`{"data": ..., "errors": ...}`) for one event.
    async fn execute(&self, subscription: &Subscription, event: &PubSubEvent, context: &Value)
    -> Value;
}

static COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#[^\n]*").expect("comment pattern is a valid regex"));

static OPERATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?s)^\s*subscription\b\s*([_A-Za-z][_0-9A-Za-z]*)?\s*(?:\([^)]*\))?\s*\{\s*(?:[_A-Za-z][_0-9A-Za-z]*\s*:\s*)?([_A-Za-z][_0-9A-Za-z]*)\s*(?:\(([^)]*)\))?",
    )
    .expect("operation pattern is a valid regex")
});

/// Single-field subscription engine that forwards event payloads unchanged.
///
/// Arguments may be variables (`$name`) or scalar literals. When the root
/// field has no argument list, the request variables become the arguments.
#[derive(Clone, Copy, Debug, Default)]
pub struct PassthroughEngine;

impl PassthroughEngine {
    fn parse_args(
        raw: &str,
        variables: Option<&Map<String, Value>>,
    ) -> Result<Map<String, Value>, GraphqlError> {
        let mut args = Map::new();
        for part in split_top_level(raw) {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let (name, value) = part
                .split_once(':')
                .ok_or_else(|| GraphqlError::new(format!("Malformed argument \"{part}\"")))?;
            let name = name.trim().to_string();
            let value = value.trim();

            if let Some(var) = value.strip_prefix('$') {
                if let Some(v) = variables.and_then(|vars| vars.get(var)) {
                    let _ = args.insert(name, v.clone());
                }
                continue;
            }

            let parsed = match serde_json::from_str::<Value>(value) {
                Ok(v) => v,
                Err(_) if is_name(value) => Value::String(value.to_string()),
                Err(_) => {
                    return Err(GraphqlError::new(format!(
                        "Unsupported value for argument \"{name}\""
                    )));
                }
            };
            let _ = args.insert(name, parsed);
        }
        Ok(args)
    }
}

#[async_trait]
impl QueryEngine for PassthroughEngine {
    fn resolve(&self, payload: &SubscribePayload) -> Result<ResolvedOperation, Vec<GraphqlError>> {
        let query = COMMENT.replace_all(&payload.query, "");
        let caps = OPERATION.captures(&query).ok_or_else(|| {
            vec![GraphqlError::new(
                "Expected a subscription operation selecting one root field",
            )]
        })?;

        if let (Some(wanted), Some(found)) = (payload.operation_name.as_deref(), caps.get(1)) {
            if wanted != found.as_str() {
                return Err(vec![GraphqlError::new(format!(
                    "Unknown operation named \"{wanted}\""
                ))]);
            }
        }

        let field = caps[2].to_string();
        let args = match caps.get(3) {
            Some(raw) => Self::parse_args(raw.as_str(), payload.variables.as_ref())
                .map_err(|e| vec![e])?,
            None => payload.variables.clone().unwrap_or_default(),
        };
        Ok(ResolvedOperation { field, args })
    }

    async fn execute(
        &self,
        subscription: &Subscription,
        event: &PubSubEvent,
        _context: &Value,
    ) -> Value {
        let mut data = Map::new();
        let _ = data.insert(
            subscription.field.clone(),
            Value::Object(event.payload.clone()),
        );
        json!({ "data": data })
    }
}

fn is_name(s: &str) -> bool {
    let mut chars = s.chars();
    chars
        .next()
        .is_some_and(|c| c == '_' || c.is_ascii_alphabetic())
        && chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

/// Split on commas outside string literals and brackets.
fn split_top_level(raw: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    let mut start = 0;

    for (i, c) in raw.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '[' | '{' => depth += 1,
            ']' | '}' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&raw[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&raw[start..]);
    parts
}

//! Static subscription dispatch table.
//!
//! A [`SubscriptionTable`] maps a root subscription field to its
//! [`SubscriptionDefinition`]: the topic template, where the filter comes
//! from, and the per-subscription hooks.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use ripple_core::{ConnectionId, GraphqlError, OperationId, SubscribePayload, Subscription};
use serde_json::{Map, Value};

use crate::errors::HookError;
use crate::hooks::{HookFn, hook_fn};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder pattern is a valid regex")
});

/// Arguments for subscribe-time hooks and dynamic filters.
#[derive(Clone, Debug)]
pub struct SubscribeArgs {
    /// Subscribing connection.
    pub connection_id: ConnectionId,
    /// Client operation ID.
    pub operation_id: OperationId,
    /// Root field being subscribed to.
    pub field: String,
    /// Resolved field arguments.
    pub args: Map<String, Value>,
    /// Resolver context from the server's context factory.
    pub context: Value,
    /// The raw subscribe payload.
    pub payload: SubscribePayload,
}

/// Arguments for `on_complete`.
#[derive(Clone, Debug)]
pub struct CompleteArgs {
    /// The subscription that ended.
    pub subscription: Subscription,
    /// Resolver context rebuilt from the stored connection-init payload.
    pub context: Value,
}

/// Computes a filter from subscribe arguments.
pub type DynamicFilter = Arc<dyn Fn(&SubscribeArgs) -> Option<Value> + Send + Sync>;

/// Where a subscription's filter comes from.
#[derive(Clone, Default)]
pub enum FilterSource {
    /// Every event on the topic matches.
    #[default]
    None,
    /// Fixed filter object.
    Static(Value),
    /// Filter computed per subscribe call.
    Dynamic(DynamicFilter),
}

impl fmt::Debug for FilterSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Static(v) => f.debug_tuple("Static").field(v).finish(),
            Self::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

impl FilterSource {
    /// Filter that copies the named subscribe arguments when present.
    ///
    /// With no names, or when none of the names were supplied, the filter is
    /// empty and matches everything.
    pub fn from_args<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if names.is_empty() {
            return Self::None;
        }
        Self::Dynamic(Arc::new(move |args: &SubscribeArgs| {
            let filter: Map<String, Value> = names
                .iter()
                .filter_map(|name| args.args.get(name).map(|v| (name.clone(), v.clone())))
                .collect();
            (!filter.is_empty()).then_some(Value::Object(filter))
        }))
    }

    fn resolve(&self, args: &SubscribeArgs) -> Option<Value> {
        match self {
            Self::None => None,
            Self::Static(v) => Some(v.clone()),
            Self::Dynamic(f) => f(args),
        }
    }
}

/// One root subscription field.
#[derive(Clone)]
pub struct SubscriptionDefinition {
    topic: String,
    filter: FilterSource,
    on_subscribe: Option<HookFn<SubscribeArgs, Vec<GraphqlError>>>,
    on_after_subscribe: Option<HookFn<SubscribeArgs, ()>>,
    on_complete: Option<HookFn<CompleteArgs, ()>>,
}

impl fmt::Debug for SubscriptionDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionDefinition")
            .field("topic", &self.topic)
            .field("filter", &self.filter)
            .field("on_subscribe", &self.on_subscribe.is_some())
            .field("on_after_subscribe", &self.on_after_subscribe.is_some())
            .field("on_complete", &self.on_complete.is_some())
            .finish()
    }
}

impl SubscriptionDefinition {
    /// Definition listening on `topic` (may contain `{arg}` placeholders).
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            filter: FilterSource::None,
            on_subscribe: None,
            on_after_subscribe: None,
            on_complete: None,
        }
    }

    /// Set the filter source.
    #[must_use]
    pub fn filter(mut self, filter: FilterSource) -> Self {
        self.filter = filter;
        self
    }

    /// Veto hook: a non-empty error list rejects the subscription.
    #[must_use]
    pub fn on_subscribe<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(SubscribeArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<GraphqlError>, HookError>> + Send + 'static,
    {
        self.on_subscribe = Some(hook_fn(f));
        self
    }

    /// Run after the subscription is stored.
    #[must_use]
    pub fn on_after_subscribe<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(SubscribeArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HookError>> + Send + 'static,
    {
        self.on_after_subscribe = Some(hook_fn(f));
        self
    }

    /// Run when the subscription ends. May run more than once per subscription.
    #[must_use]
    pub fn on_complete<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(CompleteArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HookError>> + Send + 'static,
    {
        self.on_complete = Some(hook_fn(f));
        self
    }

    /// The raw topic template.
    pub fn topic_template(&self) -> &str {
        &self.topic
    }

    /// Substitute `{arg}` placeholders from `args`.
    ///
    /// String arguments are inserted verbatim; other JSON values use their
    /// compact JSON text.
    pub fn render_topic(&self, args: &Map<String, Value>) -> Result<String, GraphqlError> {
        let mut missing: Option<String> = None;
        let rendered = PLACEHOLDER.replace_all(&self.topic, |caps: &regex::Captures<'_>| {
            let name = &caps[1];
            match args.get(name) {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Null) | None => {
                    let _ = missing.get_or_insert_with(|| name.to_string());
                    String::new()
                }
                Some(other) => other.to_string(),
            }
        });
        match missing {
            Some(name) => Err(GraphqlError::new(format!(
                "Argument \"{name}\" is required to build the topic"
            ))),
            None => Ok(rendered.into_owned()),
        }
    }

    /// Filter for one subscribe call.
    pub fn resolve_filter(&self, args: &SubscribeArgs) -> Option<Value> {
        self.filter.resolve(args)
    }

    pub(crate) async fn subscribe_veto(
        &self,
        args: SubscribeArgs,
    ) -> Result<Vec<GraphqlError>, HookError> {
        match &self.on_subscribe {
            Some(hook) => hook(args).await,
            None => Ok(Vec::new()),
        }
    }

    pub(crate) async fn after_subscribe(&self, args: SubscribeArgs) -> Result<(), HookError> {
        match &self.on_after_subscribe {
            Some(hook) => hook(args).await,
            None => Ok(()),
        }
    }

    pub(crate) async fn complete(&self, args: CompleteArgs) -> Result<(), HookError> {
        match &self.on_complete {
            Some(hook) => hook(args).await,
            None => Ok(()),
        }
    }
}

/// Root field name to definition.
#[derive(Clone, Debug, Default)]
pub struct SubscriptionTable {
    definitions: HashMap<String, SubscriptionDefinition>,
}

impl SubscriptionTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the definition for `field`.
    #[must_use]
    pub fn define(mut self, field: impl Into<String>, definition: SubscriptionDefinition) -> Self {
        let _ = self.definitions.insert(field.into(), definition);
        self
    }

    /// Look up a field.
    pub fn get(&self, field: &str) -> Option<&SubscriptionDefinition> {
        self.definitions.get(field)
    }

    /// Defined field names.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.definitions.keys().map(String::as_str)
    }

    /// Number of definitions.
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Whether the table has no definitions.
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

use std::collections::HashMap;
use std::sync::Arc;

use crate::filter::QueryDescriptor;

/// Reusable fragment of a query, applied to a builder's descriptor
pub trait QueryScope: Send + Sync {
    fn apply(&self, query: &mut QueryDescriptor);
}

impl<F> QueryScope for F
where
    F: Fn(&mut QueryDescriptor) + Send + Sync,
{
    fn apply(&self, query: &mut QueryDescriptor) {
        self(query)
    }
}

/// A model the client can build queries for
#[derive(Clone)]
pub struct ModelDef {
    name: String,
    plural: String,
    scopes: HashMap<String, Arc<dyn QueryScope>>,
}

impl ModelDef {
    /// Plural alias defaults to the lower-camel name plus "s" ("BlogPost" -> "blogPosts")
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let plural = format!("{}s", delegate_name(&name));
        Self {
            name,
            plural,
            scopes: HashMap::new(),
        }
    }

    pub fn plural(mut self, plural: impl Into<String>) -> Self {
        self.plural = plural.into();
        self
    }

    /// Attach a named filter scope
    pub fn scope(mut self, name: impl Into<String>, scope: impl QueryScope + 'static) -> Self {
        self.scopes.insert(name.into(), Arc::new(scope));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn plural_name(&self) -> &str {
        &self.plural
    }

    pub fn get_scope(&self, name: &str) -> Option<Arc<dyn QueryScope>> {
        self.scopes.get(name).cloned()
    }

    pub fn scope_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.scopes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for ModelDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelDef")
            .field("name", &self.name)
            .field("plural", &self.plural)
            .field("scopes", &self.scope_names())
            .finish()
    }
}

/// Model lookup by name, delegate name or plural alias
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: HashMap<String, Arc<ModelDef>>,
    aliases: HashMap<String, String>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `model`, replacing any earlier definition with the same name
    pub fn register(&mut self, model: ModelDef) -> &mut Self {
        let name = model.name.clone();
        if self.models.contains_key(&name) {
            tracing::warn!("Model {} registered twice, replacing definition", name);
            self.aliases.retain(|_, target| target != &name);
        }

        for alias in [name.clone(), delegate_name(&name), model.plural.clone()] {
            if let Some(existing) = self.aliases.get(&alias) {
                if existing != &name {
                    tracing::warn!("Alias {} already points at {}, keeping it", alias, existing);
                    continue;
                }
            }
            self.aliases.insert(alias, name.clone());
        }

        tracing::debug!("Registered model {} (plural {})", name, model.plural);
        self.models.insert(name, Arc::new(model));
        self
    }

    /// Builder-style registration
    pub fn with(mut self, model: ModelDef) -> Self {
        self.register(model);
        self
    }

    pub fn resolve(&self, name: &str) -> Option<Arc<ModelDef>> {
        self.aliases
            .get(name)
            .and_then(|canonical| self.models.get(canonical))
            .cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.aliases.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.models.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Lower-camel form of a model name: "User" -> "user"
fn delegate_name(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

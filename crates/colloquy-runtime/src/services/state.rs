//! Per-request stores a plugin reads and writes through its services.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// String-keyed JSON store used for session state and user profiles.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyValueStore {
    values: BTreeMap<String, Value>,
}

impl KeyValueStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Returns the string value under `key`, if it is a string.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    /// Stores `value` under `key`, returning the previous value.
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.values.insert(key.into(), value.into())
    }

    /// Removes `key`.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Reports whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterates entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(key, value)| (key.as_str(), value))
    }
}

/// An entity known to the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Stable entity identifier.
    pub id: String,
    /// Ontology type name, for example `Place`.
    pub kind: String,
    /// Entity payload.
    #[serde(default)]
    pub data: Value,
}

impl Entity {
    /// Creates an entity with a null payload.
    #[must_use]
    pub fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            data: Value::Null,
        }
    }

    /// Attaches a payload.
    #[must_use]
    pub fn with_data(mut self, data: impl Into<Value>) -> Self {
        self.data = data.into();
        self
    }
}

/// Entities a plugin has put in play for later turns or other domains.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityContext {
    entities: Vec<Entity>,
}

impl EntityContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the entity with the same id.
    pub fn insert(&mut self, entity: Entity) {
        self.entities.retain(|existing| existing.id != entity.id);
        self.entities.push(entity);
    }

    /// Looks up an entity by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Entity> {
        self.entities.iter().find(|entity| entity.id == id)
    }

    /// Removes an entity by id.
    pub fn remove(&mut self, id: &str) -> Option<Entity> {
        let position = self.entities.iter().position(|entity| entity.id == id)?;
        Some(self.entities.remove(position))
    }

    /// Entities of a given kind, in insertion order.
    pub fn of_kind<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a Entity> {
        self.entities.iter().filter(move |entity| entity.kind == kind)
    }

    /// Number of entities.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.entities.len()
    }

    /// Reports whether the context is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// An entity the orchestrator considers relevant to the current turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextualEntity {
    /// The entity.
    pub entity: Entity,
    /// Relevance in `[0, 1]`.
    pub relevance: f32,
}

/// A client-side action a plugin can later receive back as a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogAction {
    /// Intent delivered when the client fires the action.
    pub intent: String,
    /// Domain of that intent.
    pub domain: String,
    /// Entry point to resume at, if any.
    #[serde(default)]
    pub continuation: Option<String>,
    /// Extra slot data.
    #[serde(default)]
    pub slots: BTreeMap<String, String>,
}

/// Data a plugin publishes for the client to fetch by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebData {
    /// Payload.
    pub data: Vec<u8>,
    /// MIME type.
    pub mime_type: String,
    /// Seconds the client may cache the payload.
    pub lifetime_seconds: u64,
}

/// Fresh-per-request map from generated ids to stored values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdCache<T> {
    entries: BTreeMap<String, T>,
}

impl<T> Default for IdCache<T> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<T> IdCache<T> {
    /// Stores `value` under a new random id and returns the id.
    pub fn store(&mut self, value: T) -> String {
        let id = Uuid::new_v4().to_string();
        self.entries.insert(id.clone(), value);
        id
    }

    /// Returns the value stored under `id`.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&T> {
        self.entries.get(id)
    }

    /// Number of stored values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Reports whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Cache of actions registered during one request.
pub type DialogActionCache = IdCache<DialogAction>;

/// Cache of web data published during one request.
pub type WebDataCache = IdCache<WebData>;

/// Snapshot of everything a plugin wrote through its services in one call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SideEffects {
    /// Conversation session state.
    pub session: KeyValueStore,
    /// Profile data scoped to the plugin.
    pub local_profile: KeyValueStore,
    /// Profile data shared across plugins.
    pub global_profile: KeyValueStore,
    /// Entities put in play.
    pub entity_context: EntityContext,
    /// Client actions registered.
    pub dialog_actions: DialogActionCache,
    /// Web data published.
    pub web_data: WebDataCache,
}

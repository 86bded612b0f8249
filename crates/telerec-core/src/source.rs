//! Data sources
//!
//! The live values the dashboard displays. Live producers publish into the
//! registry while it is connected; playback pushes recorded values in
//! regardless, after disconnecting the producers so the two never fight over
//! a source.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::codec::Value;

/// A single named stream of telemetry values
pub trait DataSource: Send + Sync {
    /// Unique source identifier, e.g. `/SmartDashboard/Battery`
    fn id(&self) -> &str;

    /// Data type name used to encode this source's values
    fn data_type(&self) -> &str;

    /// Latest value, if one has been received
    fn current_value(&self) -> Option<Value>;

    /// Replace the current value
    fn apply(&self, value: Value);
}

/// In-memory data source holding its latest value
#[derive(Debug)]
pub struct LiveSource {
    id: String,
    data_type: String,
    value: RwLock<Option<Value>>,
}

impl LiveSource {
    /// Create a source with no value yet
    pub fn new(id: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            data_type: data_type.into(),
            value: RwLock::new(None),
        }
    }

    /// Create a source holding `value`, typed by the value's built-in data type
    pub fn with_value(id: impl Into<String>, value: Value) -> Self {
        let data_type = value.default_data_type();
        Self {
            id: id.into(),
            data_type: data_type.to_string(),
            value: RwLock::new(Some(value)),
        }
    }
}

impl DataSource for LiveSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn data_type(&self) -> &str {
        &self.data_type
    }

    fn current_value(&self) -> Option<Value> {
        self.value.read().ok().and_then(|v| v.clone())
    }

    fn apply(&self, value: Value) {
        if let Ok(mut current) = self.value.write() {
            *current = Some(value);
        }
    }
}

/// Callback invoked for every published value: `(source_id, data_type, value)`
pub type SourceListener = Arc<dyn Fn(&str, &str, &Value) + Send + Sync>;

/// Registry of all known data sources
pub struct SourceRegistry {
    sources: RwLock<HashMap<String, Arc<dyn DataSource>>>,
    listeners: RwLock<Vec<(u64, SourceListener)>>,
    next_listener_id: AtomicU64,
    connected: AtomicBool,
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceRegistry {
    /// Create an empty, connected registry
    pub fn new() -> Self {
        Self {
            sources: RwLock::new(HashMap::new()),
            listeners: RwLock::new(Vec::new()),
            next_listener_id: AtomicU64::new(1),
            connected: AtomicBool::new(true),
        }
    }

    /// Add a source, replacing any existing source with the same ID
    pub fn register(&self, source: Arc<dyn DataSource>) {
        if let Ok(mut sources) = self.sources.write() {
            sources.insert(source.id().to_string(), source);
        }
    }

    /// Look up a source by ID
    pub fn get(&self, id: &str) -> Option<Arc<dyn DataSource>> {
        self.sources.read().ok()?.get(id).cloned()
    }

    /// All registered sources, sorted by ID
    pub fn all(&self) -> Vec<Arc<dyn DataSource>> {
        let mut all: Vec<Arc<dyn DataSource>> = self
            .sources
            .read()
            .map(|sources| sources.values().cloned().collect())
            .unwrap_or_default();
        all.sort_by(|a, b| a.id().cmp(b.id()));
        all
    }

    /// Number of registered sources
    pub fn len(&self) -> usize {
        self.sources.read().map(|s| s.len()).unwrap_or(0)
    }

    /// Check if no sources are registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Let live producers update sources again
    pub fn connect(&self) {
        if !self.connected.swap(true, Ordering::SeqCst) {
            tracing::debug!("Live data sources connected");
        }
    }

    /// Ignore live producers until [`connect`](Self::connect) is called
    pub fn disconnect(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            tracing::debug!("Live data sources disconnected");
        }
    }

    /// Whether live producers are currently connected
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Register a callback for published values, returning its handle
    pub fn subscribe(&self, listener: SourceListener) -> u64 {
        let id = self.next_listener_id.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut listeners) = self.listeners.write() {
            listeners.push((id, listener));
        }
        id
    }

    /// Remove a callback registered with [`subscribe`](Self::subscribe)
    pub fn unsubscribe(&self, handle: u64) {
        if let Ok(mut listeners) = self.listeners.write() {
            listeners.retain(|(id, _)| *id != handle);
        }
    }

    /// Publish a value from a live producer
    ///
    /// Unknown IDs register a new [`LiveSource`]. Returns false, dropping the
    /// value, while the registry is disconnected.
    pub fn publish(&self, id: &str, value: Value) -> bool {
        if !self.is_connected() {
            return false;
        }

        let source = match self.get(id) {
            Some(source) => source,
            None => {
                let source: Arc<dyn DataSource> =
                    Arc::new(LiveSource::new(id, value.default_data_type()));
                self.register(Arc::clone(&source));
                source
            }
        };
        source.apply(value.clone());

        // Call listeners without holding the lock so they may subscribe or publish
        let listeners: Vec<SourceListener> = self
            .listeners
            .read()
            .map(|l| l.iter().map(|(_, f)| Arc::clone(f)).collect())
            .unwrap_or_default();
        for listener in listeners {
            listener(source.id(), source.data_type(), &value);
        }
        true
    }

    /// Push a recorded value into a source, whether or not producers are connected
    ///
    /// Listeners are not notified. Returns false if no source has this ID.
    pub fn apply_recorded(&self, id: &str, value: Value) -> bool {
        match self.get(id) {
            Some(source) => {
                source.apply(value);
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceRegistry")
            .field("sources", &self.len())
            .field("connected", &self.is_connected())
            .finish()
    }
}

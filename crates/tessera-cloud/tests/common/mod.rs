use async_trait::async_trait;
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tessera_cloud::{
    AttributeClass, Created, Engine, EngineOptions, ProviderError, ProviderRegistry,
    ProviderResult, ResourceProvider, StateStore,
};
use tessera_core::{Attributes, Declaration, ResourceGraph};

pub const MEM_THING: &str = "mem_thing";

#[derive(Default)]
struct Inner {
    resources: BTreeMap<String, Attributes>,
    calls: Vec<String>,
    fail_names: BTreeSet<String>,
    delays: BTreeMap<String, u64>,
}

/// In-memory provider for `mem_thing` resources
///
/// `name` forces replacement, `zone` is immutable, everything else updates in
/// place. Every operation is logged as `<op>:<name>`.
#[derive(Default)]
pub struct MemoryProvider {
    inner: Mutex<Inner>,
    next_id: AtomicU64,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    create_before_destroy: bool,
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn name_of(attributes: &Attributes) -> String {
    attributes
        .get("name")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

impl MemoryProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn create_before_destroy() -> Arc<Self> {
        Arc::new(Self {
            create_before_destroy: true,
            ..Self::default()
        })
    }

    pub fn fail_on(&self, name: &str) {
        self.inner.lock().unwrap().fail_names.insert(name.to_string());
    }

    pub fn clear_failures(&self) {
        self.inner.lock().unwrap().fail_names.clear();
    }

    pub fn delay(&self, name: &str, millis: u64) {
        self.inner
            .lock()
            .unwrap()
            .delays
            .insert(name.to_string(), millis);
    }

    pub fn calls(&self) -> Vec<String> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn take_calls(&self) -> Vec<String> {
        std::mem::take(&mut self.inner.lock().unwrap().calls)
    }

    pub fn names(&self) -> Vec<String> {
        let inner = self.inner.lock().unwrap();
        let mut names: Vec<String> = inner.resources.values().map(name_of).collect();
        names.sort();
        names
    }

    /// Delete a resource behind the engine's back
    pub fn remove_out_of_band(&self, name: &str) {
        self.inner
            .lock()
            .unwrap()
            .resources
            .retain(|_, attrs| name_of(attrs) != name);
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Log the call, then wait and fail as configured for `name`
    async fn perform(&self, op: &str, name: &str) -> ProviderResult<()> {
        let _guard = {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);
            InFlight(&self.in_flight)
        };
        let (delay, fail) = {
            let mut inner = self.inner.lock().unwrap();
            inner.calls.push(format!("{}:{}", op, name));
            (
                inner.delays.get(name).copied().unwrap_or(0),
                inner.fail_names.contains(name),
            )
        };
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if fail {
            return Err(ProviderError::Failed(format!("{} {} refused", op, name)));
        }
        Ok(())
    }
}

#[async_trait]
impl ResourceProvider for MemoryProvider {
    fn name(&self) -> &str {
        "memory"
    }

    fn resource_types(&self) -> Vec<String> {
        vec![MEM_THING.to_string()]
    }

    fn classify_attribute(&self, _resource_type: &str, attribute: &str) -> AttributeClass {
        match attribute {
            "name" => AttributeClass::ForcesReplacement,
            "zone" | "id" => AttributeClass::Immutable,
            _ => AttributeClass::Updatable,
        }
    }

    fn create_before_destroy(&self, _resource_type: &str) -> bool {
        self.create_before_destroy
    }

    async fn create(
        &self,
        _resource_type: &str,
        attributes: &Attributes,
    ) -> ProviderResult<Created> {
        let name = name_of(attributes);
        self.perform("create", &name).await?;

        let id = format!("mem-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let mut stored = attributes.clone();
        stored.insert("id".to_string(), json!(id));
        self.inner
            .lock()
            .unwrap()
            .resources
            .insert(id.clone(), stored.clone());
        Ok(Created::new(id, stored))
    }

    async fn read(&self, resource_type: &str, id: &str) -> ProviderResult<Attributes> {
        self.inner
            .lock()
            .unwrap()
            .resources
            .get(id)
            .cloned()
            .ok_or_else(|| ProviderError::not_found(resource_type, id))
    }

    async fn update(
        &self,
        resource_type: &str,
        id: &str,
        attributes: &Attributes,
    ) -> ProviderResult<Attributes> {
        if !self.inner.lock().unwrap().resources.contains_key(id) {
            return Err(ProviderError::not_found(resource_type, id));
        }
        self.perform("update", &name_of(attributes)).await?;

        let mut stored = attributes.clone();
        stored.insert("id".to_string(), json!(id));
        self.inner
            .lock()
            .unwrap()
            .resources
            .insert(id.to_string(), stored.clone());
        Ok(stored)
    }

    async fn delete(&self, resource_type: &str, id: &str) -> ProviderResult<()> {
        let name = {
            let inner = self.inner.lock().unwrap();
            match inner.resources.get(id) {
                Some(attrs) => name_of(attrs),
                None => return Err(ProviderError::not_found(resource_type, id)),
            }
        };
        self.perform("delete", &name).await?;
        self.inner.lock().unwrap().resources.remove(id);
        Ok(())
    }
}

/// `mem_thing.<name>` with `name = <name>`
pub fn thing(name: &str) -> Declaration {
    Declaration::new(format!("{}.{}", MEM_THING, name), MEM_THING)
        .with_attribute("name", json!(name))
}

pub fn address(name: &str) -> String {
    format!("{}.{}", MEM_THING, name)
}

pub fn graph(declarations: Vec<Declaration>) -> ResourceGraph {
    ResourceGraph::build(declarations).unwrap()
}

pub fn engine(provider: &Arc<MemoryProvider>, root: &Path) -> Engine {
    engine_with(provider, root, EngineOptions::default())
}

pub fn engine_with(provider: &Arc<MemoryProvider>, root: &Path, options: EngineOptions) -> Engine {
    let provider: Arc<dyn ResourceProvider> = provider.clone();
    Engine::new(
        ProviderRegistry::new().with_provider(provider),
        StateStore::new(root),
        options,
    )
}

use async_trait::async_trait;
use infraflow_cloud::{CreateRequest, Outputs, ProviderError, ProvisioningAdapter};
use serde_json::{Map, Value, json};
use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Start(String),
    End(String),
}

/// In-memory adapter that logs call start/end and remembers what it created
///
/// Outputs are `id`, `name`, `location` plus every scalar config value.
/// A repeated call with unchanged configuration returns the stored outputs
/// without counting a remote create.
#[derive(Default)]
pub struct RecordingAdapter {
    pub events: Mutex<Vec<Event>>,
    pub requests: Mutex<Vec<CreateRequest>>,
    store: Mutex<HashMap<String, (Map<String, Value>, Outputs)>>,
    remote_creates: AtomicUsize,
    pub fail: BTreeSet<String>,
    pub delay: Option<Duration>,
}

#[allow(dead_code)]
impl RecordingAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn failing(mut self, id: &str) -> Self {
        self.fail.insert(id.to_string());
        self
    }

    pub fn remote_creates(&self) -> usize {
        self.remote_creates.load(Ordering::SeqCst)
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn request(&self, id: &str) -> Option<CreateRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == id)
            .cloned()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn position(&self, event: &Event) -> usize {
        self.events()
            .iter()
            .position(|e| e == event)
            .unwrap_or_else(|| panic!("{event:?} not recorded"))
    }

    pub fn started(&self, id: &str) -> usize {
        self.position(&Event::Start(id.to_string()))
    }

    pub fn ended(&self, id: &str) -> usize {
        self.position(&Event::End(id.to_string()))
    }
}

#[async_trait]
impl ProvisioningAdapter for RecordingAdapter {
    fn name(&self) -> &str {
        "recording"
    }

    async fn create(&self, request: &CreateRequest) -> Result<Outputs, ProviderError> {
        self.requests.lock().unwrap().push(request.clone());
        self.events
            .lock()
            .unwrap()
            .push(Event::Start(request.id.clone()));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let result = if self.fail.contains(&request.id) {
            Err(ProviderError::permanent(format!("{} rejected", request.id)))
        } else {
            let mut store = self.store.lock().unwrap();
            match store.get(&request.id) {
                Some((config, outputs)) if config == &request.config => Ok(outputs.clone()),
                _ => {
                    self.remote_creates.fetch_add(1, Ordering::SeqCst);
                    let mut outputs: Outputs = request
                        .config
                        .iter()
                        .filter(|(_, v)| !v.is_object() && !v.is_array())
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect();
                    outputs.insert("id".to_string(), json!(format!("/{}/{}", request.kind, request.id)));
                    outputs.insert("name".to_string(), json!(request.id));
                    outputs
                        .entry("location".to_string())
                        .or_insert_with(|| json!("westus"));
                    store.insert(request.id.clone(), (request.config.clone(), outputs.clone()));
                    Ok(outputs)
                }
            }
        };

        self.events
            .lock()
            .unwrap()
            .push(Event::End(request.id.clone()));
        result
    }
}

// ABOUTME: Test support utilities.
// ABOUTME: In-memory object store, stack service and hosted zones plus cluster fixtures.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Once};

use strata::config::{ClusterSpec, CompiledCluster, compile};
use strata::plugin::{Plugin, Value};
use strata::provision::{
    HostedZones, ObjectStore, ServiceError, ServiceResult, Services, StackDescription, StackEvent,
    StackRequest, StackService, StackStatus,
};
use strata::render::{Result as RenderResult, SkeletonRenderer, TemplateRenderer, UserdataPart};
use strata::types::{NodeRole, StackKind};

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests. Safe to call multiple times.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter = EnvFilter::from_default_env().add_directive("strata=debug".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// Cluster with two zone-ordered pools, staged to `s3://assets/clusters`.
pub const CLUSTER: &str = r#"
clusterName: prod
region: us-west-1
externalDNSName: k8s.example.com
s3URI: s3://assets/clusters
stackPolling:
  interval: 1ms
  timeout: 2s
  maxTransientRetries: 2
subnets:
  - name: a
    availabilityZone: us-west-1a
    instanceCIDR: 10.0.1.0/24
  - name: b
    availabilityZone: us-west-1b
    instanceCIDR: 10.0.2.0/24
worker:
  nodePools:
    - name: first
      rollingStrategy: AvailabilityZone
      subnets: [{name: a}]
    - name: second
      rollingStrategy: AvailabilityZone
      subnets: [{name: b}]
"#;

pub fn compile_yaml(yaml: &str, plugins: Vec<Plugin>) -> CompiledCluster {
    compile(&ClusterSpec::from_yaml(yaml).unwrap(), plugins).unwrap()
}

pub fn cluster() -> CompiledCluster {
    compile_yaml(CLUSTER, Vec::new())
}

#[derive(Default)]
pub struct FakeStore {
    objects: Mutex<BTreeMap<(String, String), Vec<u8>>>,
    transient_failures: Mutex<usize>,
    terminal: Mutex<Option<String>>,
}

impl FakeStore {
    /// Fail the next `n` puts with a transient error.
    pub fn fail_transiently(&self, n: usize) {
        *self.transient_failures.lock() = n;
    }

    /// Fail every put with a terminal error.
    pub fn fail_terminally(&self, message: &str) {
        *self.terminal.lock() = Some(message.to_string());
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().keys().map(|(_, k)| k.clone()).collect()
    }

    pub fn get(&self, bucket: &str, key: &str) -> Option<String> {
        self.objects
            .lock()
            .get(&(bucket.to_string(), key.to_string()))
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }

    /// Body of the object an `https://s3.../<bucket>/<key>` URL points at.
    pub fn body_for_url(&self, url: &str) -> Option<String> {
        self.objects
            .lock()
            .iter()
            .find(|((bucket, key), _)| url.ends_with(&format!("/{bucket}/{key}")))
            .map(|(_, b)| String::from_utf8_lossy(b).into_owned())
    }
}

#[async_trait]
impl ObjectStore for FakeStore {
    async fn put(&self, bucket: &str, key: &str, body: &[u8]) -> ServiceResult<()> {
        if let Some(message) = self.terminal.lock().clone() {
            return Err(ServiceError::Terminal(message));
        }
        {
            let mut remaining = self.transient_failures.lock();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ServiceError::Transient("slow down".into()));
            }
        }
        self.objects
            .lock()
            .insert((bucket.to_string(), key.to_string()), body.to_vec());
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct FakeStack {
    pub status: String,
    pub template_url: String,
    pub tags: BTreeMap<String, String>,
}

#[derive(Default)]
struct StackState {
    stacks: BTreeMap<String, FakeStack>,
    templates: BTreeMap<String, String>,
    events: Vec<StackEvent>,
    pending_events: Vec<(String, String, String)>,
    calls: Vec<String>,
    describe_script: VecDeque<ServiceResult<String>>,
    create_status: Option<String>,
}

/// Stack service that settles every operation immediately.
pub struct FakeStackService {
    store: Arc<FakeStore>,
    state: Mutex<StackState>,
}

impl FakeStackService {
    pub fn new(store: Arc<FakeStore>) -> Self {
        Self {
            store,
            state: Mutex::new(StackState::default()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    pub fn stack(&self, name: &str) -> Option<FakeStack> {
        self.state.lock().stacks.get(name).cloned()
    }

    /// Deployed template body of `name`.
    pub fn template(&self, name: &str) -> Option<String> {
        self.state.lock().templates.get(name).cloned()
    }

    pub fn set_template(&self, name: &str, body: &str) {
        self.state
            .lock()
            .templates
            .insert(name.to_string(), body.to_string());
    }

    /// Status the next create settles in, with failure events when it is not a success.
    pub fn create_ends_in(&self, status: &str) {
        self.state.lock().create_status = Some(status.to_string());
    }

    /// Answers returned by describe before it falls back to the recorded stacks.
    pub fn script_describe(&self, results: Vec<ServiceResult<&str>>) {
        self.state.lock().describe_script = results
            .into_iter()
            .map(|r| r.map(str::to_string))
            .collect();
    }

    /// Event logged by the next mutating call.
    pub fn push_event(&self, logical_id: &str, status: &str, reason: &str) {
        self.state.lock().pending_events.push((
            logical_id.to_string(),
            status.to_string(),
            reason.to_string(),
        ));
    }

    /// Event logged before any operation this test issues.
    pub fn push_old_event(&self, logical_id: &str, status: &str, reason: &str) {
        self.state.lock().events.push(StackEvent {
            timestamp: Utc::now() - chrono::Duration::hours(1),
            logical_id: logical_id.to_string(),
            resource_type: "AWS::CloudFormation::Stack".to_string(),
            status: status.to_string(),
            reason: Some(reason.to_string()),
        });
    }

    fn body(&self, url: &str) -> ServiceResult<String> {
        self.store
            .body_for_url(url)
            .ok_or_else(|| ServiceError::Terminal(format!("no template at {url}")))
    }
}

impl StackState {
    fn log_pending(&mut self) {
        let now = Utc::now();
        for (logical_id, status, reason) in std::mem::take(&mut self.pending_events) {
            self.events.push(StackEvent {
                timestamp: now,
                logical_id,
                resource_type: "AWS::CloudFormation::Stack".to_string(),
                status,
                reason: Some(reason),
            });
        }
    }
}

#[async_trait]
impl StackService for FakeStackService {
    async fn create_stack(&self, request: &StackRequest) -> ServiceResult<String> {
        let body = self.body(&request.template_url)?;
        let mut state = self.state.lock();
        state.calls.push(format!("create {}", request.name));
        state.log_pending();
        if state.stacks.contains_key(&request.name) {
            return Err(ServiceError::Terminal(format!(
                "stack {} already exists",
                request.name
            )));
        }
        let status = state
            .create_status
            .clone()
            .unwrap_or_else(|| StackStatus::CREATE_COMPLETE.to_string());
        state.stacks.insert(
            request.name.clone(),
            FakeStack {
                status,
                template_url: request.template_url.clone(),
                tags: request.tags.clone(),
            },
        );
        state.templates.insert(request.name.clone(), body);
        Ok(format!("arn:stack/{}", request.name))
    }

    async fn update_stack(&self, request: &StackRequest) -> ServiceResult<String> {
        let body = self.body(&request.template_url)?;
        let mut state = self.state.lock();
        state.calls.push(format!("update {}", request.name));
        state.log_pending();
        if !state.stacks.contains_key(&request.name) {
            return Err(ServiceError::NotFound(request.name.clone()));
        }
        if state.templates.get(&request.name) == Some(&body) {
            return Err(ServiceError::NoUpdates);
        }
        if let Some(stack) = state.stacks.get_mut(&request.name) {
            stack.status = StackStatus::UPDATE_COMPLETE.to_string();
            stack.template_url = request.template_url.clone();
        }
        state.templates.insert(request.name.clone(), body);
        Ok(format!("arn:stack/{}", request.name))
    }

    async fn delete_stack(&self, name: &str) -> ServiceResult<()> {
        let mut state = self.state.lock();
        state.calls.push(format!("delete {name}"));
        state.log_pending();
        if state.stacks.remove(name).is_none() {
            return Err(ServiceError::NotFound(name.to_string()));
        }
        state.templates.remove(name);
        Ok(())
    }

    async fn describe_stack(&self, name: &str) -> ServiceResult<StackDescription> {
        let mut state = self.state.lock();
        if let Some(scripted) = state.describe_script.pop_front() {
            return scripted.map(|status| StackDescription {
                name: name.to_string(),
                status: StackStatus::new(status),
                reason: None,
            });
        }
        state
            .stacks
            .get(name)
            .map(|stack| StackDescription {
                name: name.to_string(),
                status: StackStatus::new(stack.status.clone()),
                reason: None,
            })
            .ok_or_else(|| ServiceError::NotFound(name.to_string()))
    }

    async fn list_events(&self, _name: &str) -> ServiceResult<Vec<StackEvent>> {
        Ok(self.state.lock().events.clone())
    }

    async fn get_template(&self, name: &str) -> ServiceResult<String> {
        self.state
            .lock()
            .templates
            .get(name)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(name.to_string()))
    }

    async fn validate_template(&self, template_url: &str) -> ServiceResult<String> {
        let body = self.body(template_url)?;
        serde_json::from_str::<serde_json::Value>(&body)
            .map(|_| "Parameters: none".to_string())
            .map_err(|e| ServiceError::Terminal(e.to_string()))
    }

    async fn estimate_cost(&self, template_url: &str) -> ServiceResult<String> {
        self.body(template_url)?;
        Ok(format!("https://calculator.example/estimate?template={template_url}"))
    }
}

/// Renders the node pool settings into each stack so config changes show up in templates.
pub struct EchoRenderer;

impl TemplateRenderer for EchoRenderer {
    fn render_template(&self, kind: StackKind, context: &Value) -> RenderResult<String> {
        let pool = context
            .lookup(["nodePool"])
            .map(Value::to_json)
            .unwrap_or(serde_json::Value::Null);
        Ok(serde_json::json!({
            "AWSTemplateFormatVersion": "2010-09-09",
            "Description": format!("{kind} stack"),
            "Metadata": {"NodePool": pool},
            "Resources": {},
        })
        .to_string())
    }

    fn render_userdata(&self, role: NodeRole, context: &Value) -> RenderResult<Vec<UserdataPart>> {
        SkeletonRenderer.render_userdata(role, context)
    }
}

pub struct FakeZones {
    pub domain: String,
}

#[async_trait]
impl HostedZones for FakeZones {
    async fn zone_domain(&self, _id: &str) -> ServiceResult<String> {
        Ok(self.domain.clone())
    }
}

/// Fresh fakes wired into a `Services` bundle.
pub fn services() -> (Services, Arc<FakeStore>, Arc<FakeStackService>) {
    let store = Arc::new(FakeStore::default());
    let stacks = Arc::new(FakeStackService::new(store.clone()));
    let services = Services::new(store.clone(), stacks.clone());
    (services, store, stacks)
}

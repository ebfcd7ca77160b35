// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Node registry and fan-out router (§4.5). Holds the configured node
//! list, a signed [`NodeClient`] per node, and an eventually-consistent
//! task-id → node-id affinity cache. The record's `node_id` remains the
//! authoritative mapping; the cache only saves a broadcast on the
//! common path.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::Mutex;
use uuid::Uuid;
use webai_config::{NodeEntry, TaskDetail, TaskRecord, TaskSpec, TaskSummary};
use webai_crypto::HeadKeypair;
use webai_node_client::NodeClient;

use crate::error::HeadError;

#[derive(Debug, Default)]
struct NodeHealth {
    last_seen: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

pub struct NodeHandle {
    pub id: String,
    pub name: String,
    pub base_url: String,
    pub client: NodeClient,
    health: Mutex<NodeHealth>,
}

impl NodeHandle {
    async fn record_success(&self) {
        let mut h = self.health.lock().await;
        h.last_seen = Some(Utc::now());
        h.last_error = None;
    }

    async fn record_failure(&self, detail: String) {
        let mut h = self.health.lock().await;
        h.last_error = Some(detail);
    }
}

/// `GET /api/nodes` entry (§6), without the head-wide `public_key` /
/// `enroll_token` fields which are attached once at the response level.
#[derive(Debug, Clone, Serialize)]
pub struct NodeOverview {
    pub id: String,
    pub name: String,
    pub url: String,
    pub ready: bool,
    pub issues: Vec<String>,
    pub reachable: bool,
    pub enrollment: bool,
}

pub struct NodeRegistry {
    nodes: Vec<Arc<NodeHandle>>,
    affinity: DashMap<Uuid, String>,
    fanout_timeout: Duration,
}

impl NodeRegistry {
    pub fn new(entries: &[NodeEntry], keypair: Arc<HeadKeypair>, fanout_timeout: Duration) -> Self {
        let nodes = entries
            .iter()
            .map(|e| {
                Arc::new(NodeHandle {
                    id: e.id.clone(),
                    name: e.id.clone(),
                    base_url: e.url.clone(),
                    client: NodeClient::new(e.url.clone(), keypair.clone()),
                    health: Mutex::new(NodeHealth::default()),
                })
            })
            .collect();
        NodeRegistry {
            nodes,
            affinity: DashMap::new(),
            fanout_timeout,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn by_id(&self, id: &str) -> Option<Arc<NodeHandle>> {
        self.nodes.iter().find(|n| n.id == id).cloned()
    }

    /// The node a caller should be routed to when it does not name one
    /// explicitly: the configured node if there is exactly one, otherwise
    /// `None` (the caller must disambiguate).
    fn only_node(&self) -> Option<Arc<NodeHandle>> {
        if self.nodes.len() == 1 {
            Some(self.nodes[0].clone())
        } else {
            None
        }
    }

    fn node_for_create(&self, explicit: Option<&str>) -> Result<Arc<NodeHandle>, HeadError> {
        match explicit {
            Some(id) => self.by_id(id).ok_or(HeadError::NodeNotFound),
            None => self
                .only_node()
                .ok_or_else(|| HeadError::InvalidInput("node_id is required with more than one node".into())),
        }
    }

    pub async fn create_task(&self, spec: TaskSpec) -> Result<TaskRecord, HeadError> {
        let node = self.node_for_create(spec.node_id.as_deref())?;
        let result = node.client.create_task(&spec).await;
        match &result {
            Ok(_) => node.record_success().await,
            Err(e) => node.record_failure(e.to_string()).await,
        }
        let record = result?;
        self.affinity.insert(record.id, node.id.clone());
        Ok(record)
    }

    /// Fans out `list()` to every node concurrently, bounding each call to
    /// `fanout_timeout`. A hung or failing node contributes an entry to
    /// `errors` instead of failing the whole response (§4.5, E5).
    pub async fn list_tasks(&self) -> (Vec<TaskSummary>, Vec<webai_config::NodeFanoutError>) {
        let calls = self.nodes.iter().cloned().map(|node| async move {
            let outcome = tokio::time::timeout(self.fanout_timeout, node.client.list_tasks()).await;
            match outcome {
                Ok(Ok(summaries)) => {
                    node.record_success().await;
                    Ok(summaries)
                }
                Ok(Err(e)) => {
                    node.record_failure(e.to_string()).await;
                    Err(webai_config::NodeFanoutError {
                        node_id: node.id.clone(),
                        detail: e.to_string(),
                    })
                }
                Err(_) => {
                    node.record_failure("timeout".into()).await;
                    Err(webai_config::NodeFanoutError {
                        node_id: node.id.clone(),
                        detail: "timeout".into(),
                    })
                }
            }
        });

        let results = futures::future::join_all(calls).await;
        let mut tasks = Vec::new();
        let mut errors = Vec::new();
        for r in results {
            match r {
                Ok(summaries) => tasks.extend(summaries),
                Err(e) => errors.push(e),
            }
        }
        (tasks, errors)
    }

    /// Resolves which node owns `id`: the affinity cache if populated,
    /// the explicit `node_id` if the caller supplied one, or a bounded
    /// broadcast that takes the first node claiming the task (§4.5).
    async fn resolve(&self, id: Uuid, explicit: Option<&str>) -> Result<Arc<NodeHandle>, HeadError> {
        if let Some(node_id) = explicit {
            return self.by_id(node_id).ok_or(HeadError::NodeNotFound);
        }
        if let Some(cached) = self.affinity.get(&id).map(|e| e.clone()) {
            if let Some(node) = self.by_id(&cached) {
                return Ok(node);
            }
        }

        let calls = self.nodes.iter().cloned().map(|node| async move {
            let outcome = tokio::time::timeout(self.fanout_timeout, node.client.get_task(id)).await;
            match outcome {
                Ok(Ok(detail)) => {
                    node.record_success().await;
                    Some((node, detail))
                }
                Ok(Err(e)) => {
                    node.record_failure(e.to_string()).await;
                    None
                }
                Err(_) => {
                    node.record_failure("timeout".into()).await;
                    None
                }
            }
        });
        let results = futures::future::join_all(calls).await;
        for hit in results.into_iter().flatten() {
            let (node, _detail) = hit;
            self.affinity.insert(id, node.id.clone());
            return Ok(node);
        }
        Err(HeadError::NotFound)
    }

    pub async fn get_task(&self, id: Uuid, explicit: Option<&str>) -> Result<TaskDetail, HeadError> {
        let node = self.resolve(id, explicit).await?;
        let result = node.client.get_task(id).await;
        Self::settle(&node, &result).await;
        Ok(result?)
    }

    pub async fn delete_task(&self, id: Uuid, explicit: Option<&str>) -> Result<(), HeadError> {
        let node = self.resolve(id, explicit).await?;
        let result = node.client.delete_task(id).await;
        Self::settle(&node, &result).await;
        result?;
        self.affinity.remove(&id);
        Ok(())
    }

    pub async fn assist_task(
        &self,
        id: Uuid,
        explicit: Option<&str>,
        message: String,
    ) -> Result<TaskRecord, HeadError> {
        let node = self.resolve(id, explicit).await?;
        let result = node.client.assist_task(id, message).await;
        Self::settle(&node, &result).await;
        Ok(result?)
    }

    pub async fn continue_task(
        &self,
        id: Uuid,
        explicit: Option<&str>,
        instructions: String,
    ) -> Result<TaskRecord, HeadError> {
        let node = self.resolve(id, explicit).await?;
        let result = node.client.continue_task(id, instructions).await;
        Self::settle(&node, &result).await;
        Ok(result?)
    }

    pub async fn stop_task(&self, id: Uuid, explicit: Option<&str>) -> Result<(), HeadError> {
        let node = self.resolve(id, explicit).await?;
        let result = node.client.stop_task(id).await;
        Self::settle(&node, &result).await;
        Ok(result?)
    }

    pub async fn run_now(&self, id: Uuid, explicit: Option<&str>) -> Result<(), HeadError> {
        let node = self.resolve(id, explicit).await?;
        let result = node.client.run_now(id).await;
        Self::settle(&node, &result).await;
        Ok(result?)
    }

    pub async fn reschedule(
        &self,
        id: Uuid,
        explicit: Option<&str>,
        when: DateTime<Utc>,
    ) -> Result<TaskRecord, HeadError> {
        let node = self.resolve(id, explicit).await?;
        let result = node.client.reschedule(id, when).await;
        Self::settle(&node, &result).await;
        Ok(result?)
    }

    pub async fn open_browser(&self, id: Uuid, explicit: Option<&str>) -> Result<TaskRecord, HeadError> {
        let node = self.resolve(id, explicit).await?;
        let result = node.client.open_browser(id).await;
        Self::settle(&node, &result).await;
        Ok(result?)
    }

    pub async fn close_browser(&self, id: Uuid, explicit: Option<&str>) -> Result<TaskRecord, HeadError> {
        let node = self.resolve(id, explicit).await?;
        let result = node.client.close_browser(id).await;
        Self::settle(&node, &result).await;
        Ok(result?)
    }

    /// Convenience endpoint for operators: ensures the browser is open and
    /// returns a fully-qualified VNC launch URL pointing directly at the
    /// owning node (the head does not proxy VNC traffic itself).
    pub async fn admin_vnc(&self, id: Uuid, explicit: Option<&str>) -> Result<String, HeadError> {
        let node = self.resolve(id, explicit).await?;
        let opened = node.client.open_browser(id).await;
        Self::settle(&node, &opened).await;
        opened?;

        let detail = node.client.get_task(id).await;
        Self::settle(&node, &detail).await;
        let detail = detail?;
        let path = detail
            .vnc_launch_url
            .ok_or_else(|| HeadError::Internal("node reports browser_open but no vnc_launch_url".into()))?;
        Ok(format!("{}{}", node.base_url, path))
    }

    async fn settle<T>(node: &NodeHandle, result: &Result<T, webai_node_client::NodeClientError>) {
        match result {
            Ok(_) => node.record_success().await,
            Err(e) => node.record_failure(e.to_string()).await,
        }
    }

    /// Cheap liveness probe for `GET /api/nodes`: a successful
    /// `config_defaults` call is enough to call a node reachable and ready.
    pub async fn overview(&self) -> Vec<NodeOverview> {
        let calls = self.nodes.iter().cloned().map(|node| async move {
            let probe = tokio::time::timeout(self.fanout_timeout, node.client.config_defaults()).await;
            let mut issues = Vec::new();
            let reachable = match probe {
                Ok(Ok(_)) => {
                    node.record_success().await;
                    true
                }
                Ok(Err(e)) => {
                    issues.push(e.to_string());
                    node.record_failure(e.to_string()).await;
                    false
                }
                Err(_) => {
                    issues.push("timeout".to_string());
                    node.record_failure("timeout".into()).await;
                    false
                }
            };
            NodeOverview {
                id: node.id.clone(),
                name: node.name.clone(),
                url: node.base_url.clone(),
                ready: reachable,
                issues,
                reachable,
                enrollment: false,
            }
        });
        futures::future::join_all(calls).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path as AxPath, State as AxState};
    use axum::routing::get;
    use axum::{Json, Router};
    use std::collections::HashMap;
    use std::net::SocketAddr;
    use tokio::sync::Mutex as TokioMutex;
    use webai_config::{NodeEntry, Step};

    #[derive(Clone)]
    struct FakeNodeState {
        node_id: String,
        tasks: Arc<TokioMutex<HashMap<Uuid, TaskRecord>>>,
        delay: Option<Duration>,
    }

    async fn fake_list(AxState(s): AxState<FakeNodeState>) -> Json<Vec<TaskSummary>> {
        if let Some(d) = s.delay {
            tokio::time::sleep(d).await;
        }
        let tasks = s.tasks.lock().await;
        Json(tasks.values().map(TaskRecord::summary).collect())
    }

    async fn fake_create(
        AxState(s): AxState<FakeNodeState>,
        Json(spec): Json<TaskSpec>,
    ) -> Json<TaskRecord> {
        let record = TaskRecord::new(Uuid::new_v4(), s.node_id.clone(), &spec);
        s.tasks.lock().await.insert(record.id, record.clone());
        Json(record)
    }

    async fn fake_get(
        AxState(s): AxState<FakeNodeState>,
        AxPath(id): AxPath<Uuid>,
    ) -> Result<Json<TaskDetail>, axum::http::StatusCode> {
        let tasks = s.tasks.lock().await;
        let record = tasks.get(&id).cloned().ok_or(axum::http::StatusCode::NOT_FOUND)?;
        Ok(Json(TaskDetail {
            record,
            steps: Vec::<Step>::new(),
            chat_history: Vec::new(),
            vnc_launch_url: None,
        }))
    }

    #[derive(Serialize)]
    struct FakeDefaults {
        node_id: String,
        node_name: String,
        max_steps_default: u32,
    }

    async fn fake_defaults(AxState(s): AxState<FakeNodeState>) -> Json<FakeDefaults> {
        Json(FakeDefaults {
            node_id: s.node_id.clone(),
            node_name: s.node_id.clone(),
            max_steps_default: 50,
        })
    }

    async fn spawn_fake_node(node_id: &str, delay: Option<Duration>) -> (SocketAddr, FakeNodeState) {
        let state = FakeNodeState {
            node_id: node_id.to_string(),
            tasks: Arc::new(TokioMutex::new(HashMap::new())),
            delay,
        };
        let app = Router::new()
            .route("/api/tasks", get(fake_list).post(fake_create))
            .route("/api/tasks/:id", get(fake_get))
            .route("/api/config/defaults", get(fake_defaults))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (addr, state)
    }

    fn make_spec(node_id: Option<&str>) -> TaskSpec {
        TaskSpec {
            title: "check the homepage".into(),
            instructions: "open example.com".into(),
            model_name: "gpt-5".into(),
            reasoning_effort: None,
            max_steps: 10,
            leave_browser_open: false,
            scheduled_for: None,
            node_id: node_id.map(str::to_string),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn single_node_create_and_get_round_trip_via_affinity() {
        let (addr, _) = spawn_fake_node("node-a", None).await;
        let keypair = Arc::new(HeadKeypair::generate());
        let entries = vec![NodeEntry {
            id: "node-a".into(),
            url: format!("http://{addr}"),
        }];
        let registry = NodeRegistry::new(&entries, keypair, Duration::from_secs(5));

        let record = registry.create_task(make_spec(None)).await.unwrap();
        let detail = registry.get_task(record.id, None).await.unwrap();
        assert_eq!(detail.record.id, record.id);
    }

    #[tokio::test]
    async fn create_without_node_id_requires_disambiguation_with_multiple_nodes() {
        let (addr_a, _) = spawn_fake_node("node-a", None).await;
        let (addr_b, _) = spawn_fake_node("node-b", None).await;
        let keypair = Arc::new(HeadKeypair::generate());
        let entries = vec![
            NodeEntry { id: "node-a".into(), url: format!("http://{addr_a}") },
            NodeEntry { id: "node-b".into(), url: format!("http://{addr_b}") },
        ];
        let registry = NodeRegistry::new(&entries, keypair, Duration::from_secs(5));

        let err = registry.create_task(make_spec(None)).await.unwrap_err();
        assert!(matches!(err, HeadError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn fan_out_isolates_a_hung_node() {
        let (addr_a, _) = spawn_fake_node("node-a", None).await;
        let (addr_b, state_b) = spawn_fake_node("node-b", Some(Duration::from_secs(5))).await;
        let keypair = Arc::new(HeadKeypair::generate());
        let entries = vec![
            NodeEntry { id: "node-a".into(), url: format!("http://{addr_a}") },
            NodeEntry { id: "node-b".into(), url: format!("http://{addr_b}") },
        ];
        let registry = NodeRegistry::new(&entries, keypair, Duration::from_millis(200));

        // Seed node-a with a task directly through the registry.
        registry.create_task(make_spec(Some("node-a"))).await.unwrap();
        // Seed node-b's map directly (bypassing its artificial list-delay).
        let spec = make_spec(Some("node-b"));
        let record = TaskRecord::new(Uuid::new_v4(), "node-b", &spec);
        state_b.tasks.lock().await.insert(record.id, record);

        let start = std::time::Instant::now();
        let (tasks, errors) = registry.list_tasks().await;
        let elapsed = start.elapsed();

        assert!(elapsed < Duration::from_secs(1), "fan-out must bound on the per-node timeout");
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].node_id, "node-a");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].node_id, "node-b");
        assert_eq!(errors[0].detail, "timeout");
    }

    #[tokio::test]
    async fn resolve_by_broadcast_finds_the_owning_node_and_caches_affinity() {
        let (addr_a, state_a) = spawn_fake_node("node-a", None).await;
        let (addr_b, _) = spawn_fake_node("node-b", None).await;
        let keypair = Arc::new(HeadKeypair::generate());
        let entries = vec![
            NodeEntry { id: "node-a".into(), url: format!("http://{addr_a}") },
            NodeEntry { id: "node-b".into(), url: format!("http://{addr_b}") },
        ];
        let registry = NodeRegistry::new(&entries, keypair, Duration::from_secs(5));

        // Task exists only on node-a, and the registry has no affinity entry
        // for it yet — resolution must broadcast to find it.
        let spec = make_spec(Some("node-a"));
        let record = TaskRecord::new(Uuid::new_v4(), "node-a", &spec);
        state_a.tasks.lock().await.insert(record.id, record.clone());

        let detail = registry.get_task(record.id, None).await.unwrap();
        assert_eq!(detail.record.id, record.id);
        assert_eq!(registry.affinity.get(&record.id).map(|e| e.clone()), Some("node-a".to_string()));
    }

    #[tokio::test]
    async fn explicit_node_id_is_not_found_for_an_unknown_node() {
        let (addr_a, _) = spawn_fake_node("node-a", None).await;
        let keypair = Arc::new(HeadKeypair::generate());
        let entries = vec![NodeEntry { id: "node-a".into(), url: format!("http://{addr_a}") }];
        let registry = NodeRegistry::new(&entries, keypair, Duration::from_secs(5));

        let err = registry.get_task(Uuid::new_v4(), Some("node-z")).await.unwrap_err();
        assert!(matches!(err, HeadError::NodeNotFound));
    }
}

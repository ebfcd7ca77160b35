// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! End-to-end smoke test: a real node and a real head, wired together over
//! loopback HTTP exactly as `webai combined` would, driven entirely through
//! the public API a browser-based UI would use.

use std::time::Duration;

use tempfile::tempdir;
use webai_config::{HeadConfig, HeadHttpConfig, NodeConfig, NodeEntry, NodeHttpConfig};

const NODE_ADDR: &str = "127.0.0.1:18797";
const HEAD_ADDR: &str = "127.0.0.1:18798";

async fn wait_until_up(url: &str) {
    for _ in 0..100 {
        if reqwest::get(url).await.is_ok() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("{url} never came up");
}

#[tokio::test]
async fn head_creates_and_fetches_a_task_through_its_node() {
    let data_dir = tempdir().unwrap();
    let key_dir = tempdir().unwrap();

    let node_config = NodeConfig {
        http: NodeHttpConfig {
            bind: NODE_ADDR.to_string(),
            tls_cert_dir: None,
        },
        node_id: Some("it-node".to_string()),
        data_root: data_dir.path().to_path_buf(),
        // Envelope signing is exercised directly in webai-node-client's and
        // webai-head's own test suites; this test is about the HTTP plumbing
        // between the two real binaries, so auth is switched off here.
        require_auth: false,
        ..NodeConfig::default()
    };
    tokio::spawn(webai_node::run(node_config));
    wait_until_up(&format!("http://{NODE_ADDR}/api/config/defaults")).await;

    let head_config = HeadConfig {
        http: HeadHttpConfig {
            bind: HEAD_ADDR.to_string(),
        },
        key_dir: key_dir.path().to_path_buf(),
        nodes: vec![NodeEntry {
            id: "it-node".to_string(),
            url: format!("http://{NODE_ADDR}"),
        }],
        ..HeadConfig::default()
    };
    tokio::spawn(webai_head::run(head_config));
    wait_until_up(&format!("http://{HEAD_ADDR}/api/nodes")).await;

    let client = reqwest::Client::new();

    let created: serde_json::Value = client
        .post(format!("http://{HEAD_ADDR}/api/tasks"))
        .json(&serde_json::json!({
            "title": "say hello",
            "instructions": "say hello and stop",
            "model_name": "gpt-5",
            "max_steps": 5,
            "node_id": "it-node",
        }))
        .send()
        .await
        .expect("create request must reach the head")
        .json()
        .await
        .expect("create response must be JSON");
    let id = created["id"]
        .as_str()
        .expect("created task carries an id")
        .to_string();
    assert_eq!(created["node_id"].as_str(), Some("it-node"));

    let fetched: serde_json::Value = client
        .get(format!("http://{HEAD_ADDR}/api/tasks/{id}"))
        .send()
        .await
        .expect("get request must reach the head")
        .json()
        .await
        .expect("get response must be JSON");
    assert_eq!(fetched["id"].as_str(), Some(id.as_str()));

    let listed: serde_json::Value = client
        .get(format!("http://{HEAD_ADDR}/api/tasks"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(
        listed["tasks"]
            .as_array()
            .unwrap()
            .iter()
            .any(|t| t["id"].as_str() == Some(id.as_str())),
        "the fanned-out task list must include the task we just created"
    );
    assert!(listed["errors"].is_null(), "the single healthy node must not report a fan-out error");

    let nodes: serde_json::Value = client
        .get(format!("http://{HEAD_ADDR}/api/nodes"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(nodes["nodes"][0]["id"].as_str(), Some("it-node"));
    assert_eq!(nodes["nodes"][0]["reachable"].as_bool(), Some(true));
}

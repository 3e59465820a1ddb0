//! End-to-end fleet tests.
//!
//! Runs a controller (agent endpoint, admin API and control loop) in process
//! and connects real agents backed by the mock workload runtime, verifying:
//!
//! 1. Convergence to the desired count across late-joining agents
//! 2. Replacement of a crashed workload
//! 3. Replacement of every instance of a lost agent
//! 4. Scaling through the admin API
//!
//! ## Running
//!
//! ```bash
//! cargo test -p fleet-e2e --test fleet
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use fleet_agent::{backoff::BackoffPolicy, Agent, Config, MockRuntime};
use fleet_controller::{api, controller::ControllerActor, state::AppState, transport};
use fleet_id::ServiceId;
use fleet_reconcile::DesiredReplicas;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;

const RECONCILE_INTERVAL: Duration = Duration::from_millis(200);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

struct Fleet {
    api_url: String,
    agent_url: String,
    client: reqwest::Client,
    _controller_shutdown: watch::Sender<bool>,
}

struct RunningAgent {
    runtime: Arc<MockRuntime>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

async fn serve(app: axum::Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr.to_string()
}

impl Fleet {
    async fn start(desired: u32) -> Self {
        Self::start_with_interval(desired, RECONCILE_INTERVAL).await
    }

    async fn start_with_interval(desired: u32, interval: Duration) -> Self {
        init_tracing();

        let (actor, handle) = ControllerActor::new(DesiredReplicas::new(desired), interval);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(actor.run(shutdown_rx));

        let state = AppState::new(handle);
        let agent_addr = serve(transport::create_router(state.clone())).await;
        let api_addr = serve(api::create_router(state)).await;

        Self {
            api_url: format!("http://{api_addr}"),
            agent_url: format!("ws://{agent_addr}"),
            client: reqwest::Client::new(),
            _controller_shutdown: shutdown_tx,
        }
    }

    fn spawn_agent(&self, id: &str) -> RunningAgent {
        let runtime = Arc::new(MockRuntime::new());
        let mut config = Config::new(id.parse().unwrap(), self.agent_url.clone());
        config.report_interval = Duration::from_millis(200);

        let agent = Agent::new(config, runtime.clone()).with_backoff(BackoffPolicy {
            base: Duration::from_millis(10),
            max: Duration::from_millis(100),
            jitter: 0.0,
        });
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(agent.run(shutdown_rx));

        RunningAgent {
            runtime,
            shutdown,
            task,
        }
    }

    async fn status(&self) -> serde_json::Value {
        self.client
            .get(format!("{}/status", self.api_url))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap()
    }

    async fn scale(&self, path: &str, count: u32) -> serde_json::Value {
        let resp = self
            .client
            .post(format!("{}/{path}", self.api_url))
            .json(&serde_json::json!({ "count": count }))
            .send()
            .await
            .unwrap();
        assert!(resp.status().is_success(), "{path} failed");
        resp.json().await.unwrap()
    }

    /// Poll until the registry holds `total` instances and `check` holds.
    async fn converge(
        &self,
        total: usize,
        check: impl Fn(&serde_json::Value) -> bool,
    ) -> serde_json::Value {
        for _ in 0..150 {
            let status = self.status().await;
            if services(&status).len() == total && check(&status) {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!(
            "fleet did not converge to {total}; last status: {}",
            self.status().await
        );
    }
}

impl RunningAgent {
    async fn stop(self) {
        self.shutdown.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), self.task)
            .await
            .unwrap()
            .unwrap();
    }
}

async fn wait_until(what: &str, check: impl Fn() -> bool) {
    for _ in 0..150 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("timed out waiting for {what}");
}

fn services(status: &serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
    status["services"].as_object().cloned().unwrap_or_default()
}

/// Instance count per agent, from `/status`.
fn loads(status: &serde_json::Value) -> BTreeMap<String, u64> {
    status["agents"]
        .as_array()
        .into_iter()
        .flatten()
        .map(|a| {
            (
                a["id"].as_str().unwrap_or_default().to_string(),
                a["load"].as_u64().unwrap_or_default(),
            )
        })
        .collect()
}

#[tokio::test]
async fn test_agents_join_late_and_fleet_converges() {
    let interval = Duration::from_secs(1);
    let fleet = Fleet::start_with_interval(3, interval).await;

    // One pass with nothing to place on; the agents join between ticks.
    tokio::time::sleep(interval + interval / 2).await;
    assert!(services(&fleet.status().await).is_empty());

    let a = fleet.spawn_agent("A");
    let b = fleet.spawn_agent("B");

    let status = fleet.converge(3, |s| loads(s).len() == 2).await;
    let mut counts: Vec<u64> = loads(&status).into_values().collect();
    counts.sort_unstable();
    assert_eq!(counts, vec![1, 2]);
    wait_until("three workloads", || {
        a.runtime.running().len() + b.runtime.running().len() == 3
    })
    .await;
}

#[tokio::test]
async fn test_crashed_workload_is_replaced() {
    let fleet = Fleet::start(2).await;
    let a = fleet.spawn_agent("A");
    fleet.converge(2, |_| true).await;

    let victim: ServiceId = "A-service-1".parse().unwrap();
    assert!(a.runtime.exit(&victim, 137));

    let status = fleet
        .converge(2, |s| !services(s).contains_key(victim.as_str()))
        .await;
    assert!(services(&status).contains_key("A-service-3"));
    assert_eq!(a.runtime.started(), 3);
}

#[tokio::test]
async fn test_lost_agent_instances_move_to_survivor() {
    let fleet = Fleet::start(4).await;
    let a = fleet.spawn_agent("A");
    let b = fleet.spawn_agent("B");
    fleet.converge(4, |s| loads(s).len() == 2).await;

    a.stop().await;

    let status = fleet.converge(4, |s| loads(s).len() == 1).await;
    assert_eq!(loads(&status).get("B"), Some(&4));
    wait_until("four workloads on B", || b.runtime.running().len() == 4).await;
}

#[tokio::test]
async fn test_scale_through_admin_api() {
    let fleet = Fleet::start(1).await;
    let a = fleet.spawn_agent("A");
    fleet.converge(1, |_| true).await;

    let body = fleet.scale("scale-up", 3).await;
    assert_eq!(body["desiredReplicaCount"], 4);
    fleet.converge(4, |_| true).await;

    let body = fleet.scale("scale-down", 10).await;
    assert_eq!(body["desiredReplicaCount"], 0);
    fleet.converge(0, |_| true).await;
    wait_until("all workloads stopped", || a.runtime.running().is_empty()).await;
}

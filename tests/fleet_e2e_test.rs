use fleetdeck::executor::{InMemoryRuntime, MANAGED_CONTAINERS};
use fleetdeck::topology::model::{Artifact, Cluster, Server};
use fleetdeck::{
    AgentConfig, AgentRuntime, Configuration, DispatcherConfig, DispatcherRuntime, RuntimeKind,
};
use serde_json::{json, Value};
use slog::{o, Drain, Logger};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const TOKEN: &str = "e2e-token";

fn create_test_logger() -> Logger {
    let decorator = slog_term::PlainDecorator::new(std::io::stdout());
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    Logger::root(drain, o!())
}

struct Agent {
    runtime: InMemoryRuntime,
    handle: AgentRuntime,
    workdir: TempDir,
}

async fn start_agent(logger: &Logger) -> Agent {
    let workdir = tempfile::tempdir().unwrap();
    let runtime = InMemoryRuntime::with_stack(&MANAGED_CONTAINERS);
    let config = AgentConfig::new("127.0.0.1:0".parse().unwrap(), workdir.path());
    let handle = AgentRuntime::start_with_runtime(config, Arc::new(runtime.clone()), logger.clone())
        .await
        .expect("agent should start");

    Agent {
        runtime,
        handle,
        workdir,
    }
}

fn http_client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

/// A port nothing listens on
async fn dead_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

fn local_server(name: &str, port: u16) -> Server {
    Server {
        name: name.into(),
        ip: "127.0.0.1".into(),
        control_port: Some(port),
        ..Default::default()
    }
}

fn python_artifact() -> Artifact {
    let mut artifact = Artifact::default();
    artifact.application.language = "python".into();
    artifact.application.docker_image = "python:3.12-slim".into();
    artifact.application.ports.internal_docker = 8000;
    artifact.application.ports.external_docker = 80;
    artifact.database.name = "shop".into();
    artifact.database.driver = "mysql:8".into();
    artifact.database.ports.internal_docker = 3306;
    artifact.database.ports.external_docker = 3306;
    artifact
}

async fn start_dispatcher(logger: &Logger, dir: &TempDir) -> DispatcherRuntime {
    let config = DispatcherConfig::new("127.0.0.1:0".parse().unwrap(), dir.path().join("config.json"))
        .with_token(TOKEN)
        .with_node_timeout(Duration::from_secs(5));
    DispatcherRuntime::start(config, logger.clone())
        .await
        .expect("dispatcher should start")
}

async fn get(client: &reqwest::Client, dispatcher: &DispatcherRuntime, path: &str) -> (u16, Value) {
    let response = client
        .get(format!("http://{}{}", dispatcher.local_addr(), path))
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap();
    let status = response.status().as_u16();
    (status, response.json().await.unwrap())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_fleet_lifecycle_through_dispatcher() {
    let logger = create_test_logger();
    let agent_a = start_agent(&logger).await;
    let agent_b = start_agent(&logger).await;
    let unreachable = dead_port().await;

    let fleet = Configuration {
        clusters: vec![
            Cluster {
                name: "eu".into(),
                servers: vec![
                    local_server("a", agent_a.handle.local_addr().port()),
                    local_server("b", agent_b.handle.local_addr().port()),
                ],
            },
            Cluster {
                name: "us".into(),
                servers: vec![local_server("c", unreachable)],
            },
        ],
        artifact: python_artifact(),
        ..Default::default()
    };

    let dir = tempfile::tempdir().unwrap();
    let dispatcher = start_dispatcher(&logger, &dir).await;
    let client = http_client();

    // configure seeds the topology and reaches every node but the dead one
    let response = client
        .post(format!("http://{}/configure", dispatcher.local_addr()))
        .bearer_auth(TOKEN)
        .json(&fleet)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();

    assert_eq!(body["all-succeeded"], json!(false));
    assert_eq!(body["aggregated-responses"][0]["eu"][0]["a"]["status"], "configured");
    assert_eq!(body["aggregated-responses"][0]["eu"][1]["b"]["status"], "configured");
    let failure = body["aggregated-responses"][1]["us"][0]["c"]["error"]
        .as_str()
        .unwrap();
    assert!(failure.starts_with("unreachable"), "got {}", failure);

    assert!(dir.path().join("config.json").exists());
    for agent in [&agent_a, &agent_b] {
        assert!(agent.workdir.path().join("docker-compose.yml").exists());
        assert!(agent.workdir.path().join("init.sql").exists());
    }

    // whole-stack start of one cluster
    let (status, body) = get(&client, &dispatcher, "/start/eu").await;
    assert_eq!(status, 200);
    assert_eq!(
        body,
        json!({
            "aggregated-responses": [
                {"eu": [{"a": {"status": "launched"}}, {"b": {"status": "launched"}}]}
            ],
            "all-succeeded": true
        })
    );
    assert_eq!(agent_a.runtime.launches().len(), 1);

    let (_, body) = get(&client, &dispatcher, "/check-alive/eu").await;
    assert_eq!(body["aggregated-responses"][0]["eu"][0]["a"]["app"]["status"], json!(true));
    assert_eq!(body["aggregated-responses"][0]["eu"][1]["b"]["database"]["status"], json!(true));

    // stop one container, then the observed state follows
    let (_, body) = get(&client, &dispatcher, "/stop/eu/a/app").await;
    assert_eq!(body["aggregated-responses"][0]["eu"][0]["a"]["state"], "stopped");

    let (_, body) = get(&client, &dispatcher, "/check-alive/eu/a").await;
    let node = &body["aggregated-responses"][0]["eu"][0]["a"];
    assert_eq!(node["app"]["status"], json!(false));
    assert_eq!(node["app"]["state"], "stopped");
    assert_eq!(node["database"]["status"], json!(true));

    // unknown containers surface the runtime error
    let (_, body) = get(&client, &dispatcher, "/restart/eu/a/ghost").await;
    assert_eq!(body["all-succeeded"], json!(false));
    let error = body["aggregated-responses"][0]["eu"][0]["a"]["error"]
        .as_str()
        .unwrap();
    assert!(error.contains("no such container: ghost"), "got {}", error);

    // whole-stack restart brings the stopped app back
    let (_, body) = get(&client, &dispatcher, "/restart/eu/a").await;
    assert_eq!(body["all-succeeded"], json!(true));
    assert_eq!(
        body["aggregated-responses"][0]["eu"][0]["a"]["containers"][0]["state"],
        "running"
    );

    let (_, body) = get(&client, &dispatcher, "/inspect/eu/b").await;
    let node = &body["aggregated-responses"][0]["eu"][0]["b"];
    assert_eq!(node["config"]["artifact"]["application"]["language"], "python");
    assert_eq!(node["docker"]["app"]["state"], "running");

    let (_, body) = get(&client, &dispatcher, "/clean/eu").await;
    assert_eq!(body["all-succeeded"], json!(true));
    assert_eq!(body["aggregated-responses"][0]["eu"][0]["a"]["status"], "cleaned");
    assert_eq!(
        body["aggregated-responses"][0]["eu"][0]["a"]["containers"]["app"]["state"],
        "absent"
    );

    // addresses that match nothing are empty, not errors
    let (status, body) = get(&client, &dispatcher, "/stop/ap").await;
    assert_eq!(status, 200);
    assert_eq!(body, json!({"aggregated-responses": [], "all-succeeded": true}));

    dispatcher.shutdown();
    agent_a.handle.shutdown();
    agent_b.handle.shutdown();
}

#[tokio::test]
async fn test_protected_routes_require_token() {
    let logger = create_test_logger();
    let dir = tempfile::tempdir().unwrap();
    let dispatcher = start_dispatcher(&logger, &dir).await;
    let client = http_client();
    let base = format!("http://{}", dispatcher.local_addr());

    let response = client.get(format!("{}/check-alive", base)).send().await.unwrap();
    assert_eq!(response.status().as_u16(), 401);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "error");

    let response = client
        .get(format!("{}/check-alive", base))
        .bearer_auth("wrong")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 403);

    let response = client.get(format!("{}/health", base)).send().await.unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"status": "ok", "role": "dispatcher"}));

    let response = client.get(format!("{}/help", base)).send().await.unwrap();
    let body: Value = response.json().await.unwrap();
    assert!(body["routes"].as_array().unwrap().len() >= 7);

    dispatcher.shutdown();
}

#[tokio::test]
async fn test_commands_before_configure_are_unavailable() {
    let logger = create_test_logger();
    let dir = tempfile::tempdir().unwrap();
    let dispatcher = start_dispatcher(&logger, &dir).await;
    let client = http_client();

    let (status, body) = get(&client, &dispatcher, "/check-alive").await;
    assert_eq!(status, 503);
    assert_eq!(body["status"], "error");
    assert!(body["error"].as_str().unwrap().contains("configuration missing"));

    // configure without a body has nothing to persist either
    let response = client
        .post(format!("http://{}/configure", dispatcher.local_addr()))
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 503);

    // wrong method for the command
    let (status, _) = get(&client, &dispatcher, "/configure").await;
    assert_eq!(status, 405);

    dispatcher.shutdown();
}

#[tokio::test]
async fn test_unsupported_language_is_rejected() {
    let logger = create_test_logger();
    let agent = start_agent(&logger).await;
    let client = http_client();

    let mut config = Configuration {
        artifact: python_artifact(),
        ..Default::default()
    };
    config.artifact.application.language = "cobol".into();

    // straight to the agent: nothing is written
    let response = client
        .post(format!("http://{}/configure", agent.handle.local_addr()))
        .json(&config)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("cobol"));
    assert!(!agent.workdir.path().join("config.json").exists());

    // through the dispatcher: the topology is not persisted
    let dir = tempfile::tempdir().unwrap();
    let dispatcher = start_dispatcher(&logger, &dir).await;
    let response = client
        .post(format!("http://{}/configure", dispatcher.local_addr()))
        .bearer_auth(TOKEN)
        .json(&config)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);
    assert!(!dir.path().join("config.json").exists());

    let response = client
        .get(format!("http://{}/health", agent.handle.local_addr()))
        .send()
        .await
        .unwrap();
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"status": "ok", "role": "agent"}));

    dispatcher.shutdown();
    agent.handle.shutdown();
}

#[tokio::test]
async fn test_memory_agent_launches_managed_stack() {
    let logger = create_test_logger();
    let workdir = tempfile::tempdir().unwrap();
    let config = AgentConfig::new("127.0.0.1:0".parse().unwrap(), workdir.path())
        .with_runtime(RuntimeKind::Memory);
    let agent = AgentRuntime::start(config, logger.clone())
        .await
        .expect("agent should start");
    let base = format!("http://{}", agent.local_addr());
    let client = http_client();

    let fleet = Configuration {
        artifact: python_artifact(),
        ..Default::default()
    };
    let response = client
        .post(format!("{}/configure", base))
        .json(&fleet)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let response = client.get(format!("{}/start", base)).send().await.unwrap();
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"status": "launched"}));

    let response = client.get(format!("{}/check-alive", base)).send().await.unwrap();
    let body: Value = response.json().await.unwrap();
    for name in MANAGED_CONTAINERS {
        assert_eq!(body[name]["status"], json!(true), "{} should be running", name);
    }

    let response = client.get(format!("{}/stop/app", base)).send().await.unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["state"], "stopped");

    agent.shutdown();
}

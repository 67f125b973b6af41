//! End-to-end lifecycle tests
//!
//! Drive `Lifecycle` with a fixed topology, an in-memory connector and a
//! test module catalog. No network access.

use async_trait::async_trait;
use hearth_gateway::config::Unconfigured;
use hearth_gateway::error::HandlerError;
use hearth_gateway::events::CommandInvocation;
use hearth_gateway::health;
use hearth_gateway::lifecycle::{ShutdownTrigger, StartupPhase};
use hearth_gateway::metrics::GatewayMetrics;
use hearth_gateway::modules::{Module, ModuleCatalog, ModuleContext, ModuleResult, ModuleState};
use hearth_gateway::registry::{CommandOutcome, Dispatch};
use hearth_gateway::shard::{GatewayConnection, GatewayConnector, ShardState};
use hearth_gateway::topology::{ConnectionParams, StaticTopology, TopologySource};
use hearth_gateway::{
    Collaborators, ContractViolation, GatewayError, Lifecycle, LifecycleError, LifecycleOptions,
    StartOutcome,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio_test::{assert_ok, assert_pending, assert_ready_eq, task};

#[derive(Default)]
struct Connections {
    opened: AtomicUsize,
    closed: AtomicUsize,
    last: Mutex<Option<(ConnectionParams, Dispatch)>>,
}

#[derive(Clone, Default)]
struct FakeConnector {
    connections: Arc<Connections>,
}

#[async_trait]
impl GatewayConnector for FakeConnector {
    async fn connect(
        &self,
        params: ConnectionParams,
        dispatch: Dispatch,
    ) -> Result<Box<dyn GatewayConnection>, GatewayError> {
        self.connections.opened.fetch_add(1, Ordering::SeqCst);
        *self.connections.last.lock().unwrap() = Some((params, dispatch));
        Ok(Box::new(FakeConnection {
            connections: Arc::clone(&self.connections),
        }))
    }
}

struct FakeConnection {
    connections: Arc<Connections>,
}

#[async_trait]
impl GatewayConnection for FakeConnection {
    fn shard_state(&self) -> Option<ShardState> {
        None
    }

    async fn close(self: Box<Self>) -> Result<(), GatewayError> {
        self.connections.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Connector whose handshake always fails, after a handler slipped in
#[derive(Default)]
struct RefusingConnector {
    seen: Mutex<Option<Dispatch>>,
}

#[async_trait]
impl GatewayConnector for RefusingConnector {
    async fn connect(
        &self,
        _params: ConnectionParams,
        dispatch: Dispatch,
    ) -> Result<Box<dyn GatewayConnection>, GatewayError> {
        dispatch.commands.register(
            "early",
            "echo",
            Arc::new(|_: &CommandInvocation| -> Result<Option<String>, HandlerError> { Ok(None) }),
        );
        *self.seen.lock().unwrap() = Some(dispatch);
        Err(GatewayError::ConnectionFailed(Box::new(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "handshake rejected",
        ))))
    }
}

struct UnreachableTopology;

#[async_trait]
impl TopologySource for UnreachableTopology {
    async fn recommended_shards(&self, _token: &str) -> Result<u32, GatewayError> {
        Err(GatewayError::TopologyQuery(Box::new(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "discord unreachable",
        ))))
    }
}

struct PingModule {
    fail: bool,
}

#[async_trait]
impl Module for PingModule {
    async fn enable(&self, ctx: &ModuleContext) -> ModuleResult {
        if self.fail {
            return Err("refusing to start".into());
        }
        ctx.register_command(
            "ping",
            Arc::new(|_: &CommandInvocation| -> Result<Option<String>, HandlerError> {
                Ok(Some("pong".to_string()))
            }),
        );
        Ok(())
    }

    async fn disable(&self, _ctx: &ModuleContext) -> ModuleResult {
        Ok(())
    }
}

fn catalog() -> ModuleCatalog {
    let mut catalog = ModuleCatalog::with_builtins();
    catalog.register("ping", || -> Arc<dyn Module> { Arc::new(PingModule { fail: false }) });
    catalog.register("broken", || -> Arc<dyn Module> { Arc::new(PingModule { fail: true }) });
    catalog
}

struct Fixture {
    dir: TempDir,
    connector: FakeConnector,
}

impl Fixture {
    fn new() -> Self {
        let fixture = Self {
            dir: TempDir::new().unwrap(),
            connector: FakeConnector::default(),
        };
        std::fs::create_dir(fixture.module_dir()).unwrap();
        fixture
    }

    fn configured() -> Self {
        let fixture = Self::new();
        fixture.write_config(
            "[client]\ntoken = \"test-token\"\nshard_total = 2\nshard_max = 50\ngateway_intents = [\"GUILDS\"]\n",
        );
        fixture
    }

    fn config_path(&self) -> PathBuf {
        self.dir.path().join("hearth.toml")
    }

    fn module_dir(&self) -> PathBuf {
        self.dir.path().join("modules")
    }

    fn write_config(&self, body: &str) {
        std::fs::write(self.config_path(), body).unwrap();
    }

    fn add_module(&self, file: &str, body: &str) {
        std::fs::write(self.module_dir().join(file), body).unwrap();
    }

    fn lifecycle(&self) -> Lifecycle {
        self.lifecycle_with(Arc::new(StaticTopology(4)))
    }

    fn lifecycle_with(&self, topology: Arc<dyn TopologySource>) -> Lifecycle {
        self.lifecycle_in(topology, &self.module_dir())
    }

    fn lifecycle_in(&self, topology: Arc<dyn TopologySource>, module_dir: &Path) -> Lifecycle {
        self.lifecycle_using(topology, Arc::new(self.connector.clone()), module_dir)
    }

    fn lifecycle_using(
        &self,
        topology: Arc<dyn TopologySource>,
        connector: Arc<dyn GatewayConnector>,
        module_dir: &Path,
    ) -> Lifecycle {
        let options = LifecycleOptions {
            config_path: self.config_path(),
            module_dir: Some(module_dir.to_path_buf()),
            handle_signals: false,
        };
        let collaborators = Collaborators {
            topology,
            connector,
            catalog: catalog(),
        };
        Lifecycle::new(options, collaborators, GatewayMetrics::detached())
    }

    fn opened(&self) -> usize {
        self.connector.connections.opened.load(Ordering::SeqCst)
    }

    fn closed(&self) -> usize {
        self.connector.connections.closed.load(Ordering::SeqCst)
    }
}

#[tokio::test]
async fn startup_reaches_running_and_resolves_topology() {
    let fixture = Fixture::configured();
    let mut lifecycle = fixture.lifecycle();

    let outcome = lifecycle.start().await.unwrap();

    assert_eq!(outcome, StartOutcome::Running);
    assert!(lifecycle.is_running());
    assert_eq!(lifecycle.status().borrow().phase, StartupPhase::Running);
    assert_eq!(fixture.opened(), 1);

    let last = fixture.connector.connections.last.lock().unwrap();
    let (params, _) = last.as_ref().unwrap();
    // Configured total 2 is raised to the recommended 4, shard_max 50 is clamped
    assert_eq!(params.topology.connection_total(), 4);
    assert_eq!(params.topology.connection_range().to_string(), "[0, 3]");
}

#[tokio::test]
async fn failing_module_does_not_block_startup() {
    let fixture = Fixture::configured();
    fixture.add_module("a-broken.toml", "entry = \"broken\"\n");
    fixture.add_module("b-ping.toml", "entry = \"ping\"\n");
    let mut lifecycle = fixture.lifecycle();

    assert_eq!(lifecycle.start().await.unwrap(), StartOutcome::Running);

    let modules = lifecycle.modules().unwrap();
    assert_eq!(modules.get("a-broken").unwrap().state(), ModuleState::Failed);
    assert_eq!(modules.get("b-ping").unwrap().state(), ModuleState::Enabled);

    let status = lifecycle.status().borrow().clone();
    assert_eq!(status.modules.enabled, 1);
    assert_eq!(status.modules.failed, 1);

    let dispatch = fixture.connector.connections.last.lock().unwrap().as_ref().unwrap().1.clone();
    let outcome = dispatch
        .commands
        .dispatch(&CommandInvocation::new("ping", 0));
    assert_eq!(outcome, CommandOutcome::Replied(Some("pong".to_string())));
}

#[tokio::test]
async fn shutdown_tears_down_in_reverse_and_allows_restart() {
    let fixture = Fixture::configured();
    fixture.add_module("ping.toml", "");
    let mut lifecycle = fixture.lifecycle();
    lifecycle.start().await.unwrap();
    let dispatch = fixture.connector.connections.last.lock().unwrap().as_ref().unwrap().1.clone();

    let report = lifecycle.shutdown(ShutdownTrigger::Operator).await.unwrap();

    assert_eq!(
        report.order(),
        vec![
            "modules",
            "gateway connection",
            "event registry",
            "command registry",
            "scheduler",
            "execution pools",
        ]
    );
    assert!(report.is_clean());
    assert!(!lifecycle.is_running());
    assert_eq!(lifecycle.status().borrow().phase, StartupPhase::Idle);
    assert_eq!(fixture.closed(), 1);
    assert!(dispatch.commands.is_empty());

    assert_eq!(lifecycle.start().await.unwrap(), StartOutcome::Running);
    assert_eq!(fixture.opened(), 2);
}

#[tokio::test]
async fn second_start_is_a_contract_violation() {
    let fixture = Fixture::configured();
    let mut lifecycle = fixture.lifecycle();
    lifecycle.start().await.unwrap();

    let err = lifecycle.start().await.unwrap_err();

    assert!(err.is_contract_violation());
    assert!(matches!(err, LifecycleError::Contract(ContractViolation::AlreadyRunning)));
    assert!(lifecycle.is_running());
    assert_eq!(fixture.opened(), 1);
}

#[tokio::test]
async fn shutdown_while_stopped_is_a_contract_violation() {
    let fixture = Fixture::configured();
    let mut lifecycle = fixture.lifecycle();

    assert_eq!(
        lifecycle.shutdown(ShutdownTrigger::Operator).await.unwrap_err(),
        ContractViolation::NotRunning
    );

    lifecycle.start().await.unwrap();
    lifecycle.shutdown(ShutdownTrigger::Signal).await.unwrap();
    assert_eq!(
        lifecycle.shutdown(ShutdownTrigger::Signal).await.unwrap_err(),
        ContractViolation::NotRunning
    );
}

#[tokio::test]
async fn missing_config_writes_template_then_reports_missing_token() {
    let fixture = Fixture::new();
    let mut lifecycle = fixture.lifecycle();

    let first = lifecycle.start().await.unwrap();
    assert_eq!(
        first,
        StartOutcome::Unconfigured(Unconfigured::TemplateCreated {
            path: fixture.config_path()
        })
    );
    assert!(fixture.config_path().is_file());

    let second = lifecycle.start().await.unwrap();
    assert_eq!(
        second,
        StartOutcome::Unconfigured(Unconfigured::MissingToken {
            path: fixture.config_path()
        })
    );
    assert!(!lifecycle.is_running());
    assert_eq!(lifecycle.status().borrow().phase, StartupPhase::Unconfigured);
    assert_eq!(fixture.opened(), 0);
}

#[tokio::test]
async fn malformed_config_fails_while_loading() {
    let fixture = Fixture::new();
    fixture.write_config("[client\ntoken = ");
    let mut lifecycle = fixture.lifecycle();

    let err = lifecycle.start().await.unwrap_err();

    assert!(matches!(
        err,
        LifecycleError::Startup {
            phase: StartupPhase::ConfigLoading,
            source: GatewayError::ConfigParse { .. },
        }
    ));
    assert!(!lifecycle.is_running());
}

#[tokio::test]
async fn topology_failure_aborts_startup_distinctly() {
    let fixture = Fixture::configured();
    let mut lifecycle = fixture.lifecycle_with(Arc::new(UnreachableTopology));

    let err = lifecycle.start().await.unwrap_err();

    assert!(!err.is_contract_violation());
    assert!(matches!(
        err,
        LifecycleError::Startup {
            phase: StartupPhase::ConnectionBuilding,
            source: GatewayError::TopologyQuery(_),
        }
    ));
    assert!(!lifecycle.is_running());
    assert_eq!(lifecycle.status().borrow().phase, StartupPhase::FailedStartup);
    assert_eq!(fixture.opened(), 0);

    // A failed start leaves the lifecycle stopped, not half running
    assert_eq!(
        lifecycle.shutdown(ShutdownTrigger::Operator).await.unwrap_err(),
        ContractViolation::NotRunning
    );
}

#[tokio::test]
async fn connection_failure_tears_down_registries_and_pools() {
    let fixture = Fixture::configured();
    let connector = Arc::new(RefusingConnector::default());
    let mut lifecycle = fixture.lifecycle_using(
        Arc::new(StaticTopology(1)),
        connector.clone(),
        &fixture.module_dir(),
    );

    let err = lifecycle.start().await.unwrap_err();

    assert!(matches!(
        err,
        LifecycleError::Startup {
            phase: StartupPhase::Connecting,
            source: GatewayError::ConnectionFailed(_),
        }
    ));
    assert!(!lifecycle.is_running());
    assert_eq!(lifecycle.status().borrow().phase, StartupPhase::FailedStartup);

    let report = lifecycle.last_teardown().unwrap();
    assert_eq!(report.trigger, ShutdownTrigger::StartupFailure);
    assert_eq!(
        report.order(),
        vec!["event registry", "command registry", "scheduler", "execution pools"]
    );
    assert!(report.is_clean());

    let dispatch = connector.seen.lock().unwrap().clone().unwrap();
    assert!(!dispatch.commands.contains("echo"));
    assert!(dispatch.commands.is_empty());
}

#[tokio::test]
async fn late_failure_closes_the_open_connection() {
    let fixture = Fixture::configured();
    let not_a_dir = fixture.dir.path().join("modules.txt");
    std::fs::write(&not_a_dir, "").unwrap();
    let mut lifecycle = fixture.lifecycle_in(Arc::new(StaticTopology(1)), &not_a_dir);

    let err = lifecycle.start().await.unwrap_err();

    assert!(matches!(
        err,
        LifecycleError::Startup {
            phase: StartupPhase::ModuleLoading,
            source: GatewayError::ModuleDiscovery { .. },
        }
    ));
    assert_eq!(fixture.opened(), 1);
    assert_eq!(fixture.closed(), 1);
    assert!(!lifecycle.is_running());
}

#[tokio::test]
async fn operator_request_wakes_shutdown_waiter() {
    let fixture = Fixture::configured();
    let mut lifecycle = fixture.lifecycle();
    lifecycle.start().await.unwrap();
    let handle = lifecycle.shutdown_handle();

    {
        let mut waiter = task::spawn(lifecycle.shutdown_requested());
        assert_pending!(waiter.poll());

        assert!(handle.request());
        assert!(waiter.is_woken());
        assert_ready_eq!(waiter.poll(), ShutdownTrigger::Operator);
    }

    assert_ok!(lifecycle.shutdown(ShutdownTrigger::Operator).await);
    assert!(!lifecycle.is_running());
}

#[tokio::test]
async fn health_bind_failure_shuts_the_gateway_down() {
    let fixture = Fixture::configured();
    fixture.add_module("ping.toml", "");
    let mut lifecycle = fixture.lifecycle();
    lifecycle.start().await.unwrap();

    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = taken.local_addr().unwrap();

    let err = health::serve(&mut lifecycle, GatewayMetrics::detached(), addr)
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::HealthBind { addr: a, .. } if a == addr));
    assert!(!lifecycle.is_running());
    assert_eq!(fixture.closed(), 1);

    let report = lifecycle.last_teardown().unwrap();
    assert_eq!(report.order().first(), Some(&"modules"));
    assert_eq!(report.order().last(), Some(&"execution pools"));
}

#[tokio::test]
async fn health_server_answers_while_running() {
    let fixture = Fixture::configured();
    let mut lifecycle = fixture.lifecycle();
    lifecycle.start().await.unwrap();

    let free = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = free.local_addr().unwrap();
    drop(free);

    let server = assert_ok!(health::serve(&mut lifecycle, GatewayMetrics::detached(), addr).await);
    assert!(lifecycle.is_running());
    assert!(tokio::net::TcpStream::connect(addr).await.is_ok());

    server.abort();
    assert_ok!(lifecycle.shutdown(ShutdownTrigger::Operator).await);
}

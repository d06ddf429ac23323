// Test doubles: in-memory service manager, scripted sc.exe, local HTTP stub

use super::command::CommandRunner;
use super::models::{ServiceDefinition, ServiceState};
use super::ServiceManager;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::process::{ExitStatus, Output};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Build an `ExitStatus` from a logical exit code
#[cfg(unix)]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::unix::process::ExitStatusExt;
    ExitStatus::from_raw(code << 8)
}

#[cfg(windows)]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::windows::process::ExitStatusExt;
    #[allow(clippy::cast_sign_loss)]
    ExitStatus::from_raw(code as u32)
}

pub fn ok_output(stdout: &str) -> Output {
    Output {
        status: exit_status(0),
        stdout: stdout.as_bytes().to_vec(),
        stderr: Vec::new(),
    }
}

pub fn fail_output(stdout: &str) -> Output {
    Output {
        status: exit_status(1),
        stdout: stdout.as_bytes().to_vec(),
        stderr: Vec::new(),
    }
}

#[derive(Default)]
struct FakeState {
    states: HashMap<String, ServiceState>,
    definitions: HashMap<String, ServiceDefinition>,
    calls: Vec<String>,
}

/// Service manager that keeps units in memory and records every mutation
#[derive(Default)]
pub struct FakeServiceManager {
    inner: Mutex<FakeState>,
    locks_binaries: bool,
    never_starts: bool,
}

impl FakeServiceManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_service(self, unit: &str, state: ServiceState) -> Self {
        self.inner
            .lock()
            .unwrap()
            .states
            .insert(unit.to_string(), state);
        self
    }

    pub fn locking_binaries(mut self) -> Self {
        self.locks_binaries = true;
        self
    }

    /// Units accept start requests but never become active
    pub fn never_starting(mut self) -> Self {
        self.never_starts = true;
        self
    }

    pub fn state(&self, unit: &str) -> ServiceState {
        self.inner
            .lock()
            .unwrap()
            .states
            .get(unit)
            .copied()
            .unwrap_or(ServiceState::Absent)
    }

    pub fn definition(&self, unit: &str) -> Option<ServiceDefinition> {
        self.inner.lock().unwrap().definitions.get(unit).cloned()
    }

    pub fn calls(&self) -> Vec<String> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.inner.lock().unwrap().calls.clear();
    }

    fn record(&self, call: String) {
        self.inner.lock().unwrap().calls.push(call);
    }
}

#[async_trait]
impl ServiceManager for FakeServiceManager {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn query(&self, unit: &str) -> Result<ServiceState> {
        Ok(self.state(unit))
    }

    async fn stop(&self, unit: &str) -> Result<()> {
        self.record(format!("stop {}", unit));
        let mut inner = self.inner.lock().unwrap();
        if let Some(state) = inner.states.get_mut(unit) {
            *state = ServiceState::Stopped;
        }
        Ok(())
    }

    async fn install_definition(&self, definition: &ServiceDefinition) -> Result<()> {
        self.record(format!("install {}", definition.unit_name));
        let mut inner = self.inner.lock().unwrap();
        inner
            .states
            .entry(definition.unit_name.clone())
            .or_insert(ServiceState::Stopped);
        inner
            .definitions
            .insert(definition.unit_name.clone(), definition.clone());
        Ok(())
    }

    async fn reload(&self) -> Result<()> {
        self.record("reload".to_string());
        Ok(())
    }

    async fn enable(&self, unit: &str) -> Result<()> {
        self.record(format!("enable {}", unit));
        Ok(())
    }

    async fn start(&self, unit: &str) -> Result<()> {
        self.record(format!("start {}", unit));
        let mut inner = self.inner.lock().unwrap();
        match inner.states.get_mut(unit) {
            None | Some(ServiceState::Absent) => anyhow::bail!("Unit {} not found", unit),
            Some(state) => {
                *state = if self.never_starts {
                    ServiceState::Transitioning
                } else {
                    ServiceState::Running
                };
            }
        }
        Ok(())
    }

    fn log_hint(&self, unit: &str) -> String {
        format!("fake-logs {}", unit)
    }

    fn locks_running_binaries(&self) -> bool {
        self.locks_binaries
    }
}

/// Answers sc.exe invocations for a single service the way SCM does
#[derive(Default)]
pub struct ScriptedScm {
    state: Mutex<Option<u32>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedScm {
    /// Start with an existing service in the given SCM state code
    pub fn with_existing(code: u32) -> Self {
        Self {
            state: Mutex::new(Some(code)),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Calls other than `query`, one string per invocation
    pub fn mutations(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| !call.starts_with("query"))
            .cloned()
            .collect()
    }

    pub fn verbs(&self) -> Vec<String> {
        self.mutations()
            .iter()
            .filter_map(|call| call.split_whitespace().next().map(str::to_string))
            .collect()
    }
}

#[async_trait]
impl CommandRunner for ScriptedScm {
    async fn run(&self, program: &str, args: &[String]) -> Result<Output> {
        assert_eq!(program, "sc.exe");
        self.calls.lock().unwrap().push(args.join(" "));

        let unit = args.get(1).cloned().unwrap_or_default();
        let mut state = self.state.lock().unwrap();
        let output = match (args[0].as_str(), *state) {
            ("query", None) => fail_output(
                "[SC] EnumQueryServicesStatus:OpenService FAILED 1060:\r\n\r\nThe specified service does not exist as an installed service.\r\n",
            ),
            ("query", Some(code)) => ok_output(&format!(
                "\r\nSERVICE_NAME: {}\r\n        TYPE               : 10  WIN32_OWN_PROCESS\r\n        STATE              : {}  {}\r\n",
                unit,
                code,
                if code == 4 { "RUNNING" } else { "STOPPED" }
            )),
            ("stop", Some(4)) => {
                *state = Some(1);
                ok_output("STATE              : 3  STOP_PENDING")
            }
            ("stop", _) => fail_output("[SC] ControlService FAILED 1062:\r\n\r\nThe service has not been started.\r\n"),
            ("delete", Some(_)) => {
                *state = None;
                ok_output("[SC] DeleteService SUCCESS")
            }
            ("create", None) => {
                *state = Some(1);
                ok_output("[SC] CreateService SUCCESS")
            }
            ("create", Some(_)) => fail_output("[SC] CreateService FAILED 1073:\r\n\r\nThe specified service already exists.\r\n"),
            ("start", Some(1)) => {
                *state = Some(4);
                ok_output("STATE              : 2  START_PENDING")
            }
            ("start", Some(_)) => fail_output("[SC] StartService FAILED 1056:\r\n\r\nAn instance of the service is already running.\r\n"),
            ("description" | "failure" | "config", Some(_)) => ok_output("[SC] SUCCESS"),
            (_, None) => fail_output("[SC] OpenService FAILED 1060:\r\n"),
            (verb, _) => panic!("unexpected sc verb {}", verb),
        };
        Ok(output)
    }
}

/// Minimal HTTP/1.1 server answering fixed routes on 127.0.0.1
pub struct HttpStub {
    addr: SocketAddr,
    hits: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl HttpStub {
    pub async fn start(routes: Vec<(&'static str, u16, Vec<u8>)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let routes = Arc::new(routes);
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = hits.clone();
        let task = tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let routes = routes.clone();
                let counter = counter.clone();
                tokio::spawn(async move {
                    let mut request = Vec::new();
                    let mut chunk = [0u8; 1024];
                    loop {
                        let n = socket.read(&mut chunk).await.unwrap_or(0);
                        if n == 0 {
                            break;
                        }
                        request.extend_from_slice(&chunk[..n]);
                        if request.windows(4).any(|w| w == b"\r\n\r\n") {
                            break;
                        }
                    }

                    let text = String::from_utf8_lossy(&request);
                    let path = text.split_whitespace().nth(1).unwrap_or("/").to_string();
                    counter.fetch_add(1, Ordering::SeqCst);

                    let (status, body) = routes
                        .iter()
                        .find(|(route, _, _)| *route == path)
                        .map(|(_, status, body)| (*status, body.clone()))
                        .unwrap_or((404, Vec::new()));
                    let head = format!(
                        "HTTP/1.1 {} Stub\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                        status,
                        body.len()
                    );
                    let _ = socket.write_all(head.as_bytes()).await;
                    let _ = socket.write_all(&body).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        Self { addr, hits, task }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

impl Drop for HttpStub {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// A local port with nothing listening on it
pub fn unused_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

//! Scripted in-memory runtime for tests

use std::collections::{BTreeSet, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;

use super::{ContainerRuntime, EngineVersion, OutputChunk, OutputStream, SandboxSpec};
use crate::error::{Error, Result};

/// Lifecycle step a test can force to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    Pull,
    Create,
    Start,
    Attach,
    Wait,
    Stop,
    Remove,
}

/// Shared ordered log of everything that happened, runtime calls and emitted events alike
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn record(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    /// Position of the first entry starting with `prefix`
    pub fn position(&self, prefix: &str) -> Option<usize> {
        self.entries().iter().position(|e| e.starts_with(prefix))
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.entries().iter().filter(|e| e.starts_with(prefix)).count()
    }
}

#[derive(Debug, Default)]
struct State {
    failing: HashSet<Step>,
    live: BTreeSet<String>,
    specs: Vec<SandboxSpec>,
    pulled: Vec<String>,
    ping: Option<String>,
    ping_fails: bool,
    version: Option<EngineVersion>,
    exit_code: i64,
    hang: bool,
    output: Vec<OutputChunk>,
    output_breaks: bool,
    pull_failures_left: u32,
}

/// Fake container runtime
#[derive(Debug, Clone)]
pub struct FakeRuntime {
    state: Arc<Mutex<State>>,
    journal: Journal,
}

impl Default for FakeRuntime {
    fn default() -> Self {
        Self::new(Journal::default())
    }
}

impl FakeRuntime {
    pub fn new(journal: Journal) -> Self {
        let state = State {
            ping: Some("OK".to_string()),
            version: Some(EngineVersion {
                version: Some("24.0.7".to_string()),
                api_version: Some("1.43".to_string()),
                os: Some("linux".to_string()),
                arch: Some("amd64".to_string()),
            }),
            output: vec![OutputChunk::Stdout(b"/usr/local/bin/python\n".to_vec())],
            ..Default::default()
        };
        FakeRuntime {
            state: Arc::new(Mutex::new(state)),
            journal,
        }
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    pub fn fail(&self, step: Step) -> &Self {
        self.state.lock().unwrap().failing.insert(step);
        self
    }

    /// Fail the first `n` pulls, then succeed
    pub fn fail_pulls(&self, n: u32) -> &Self {
        self.state.lock().unwrap().pull_failures_left = n;
        self
    }

    pub fn set_ping(&self, response: Option<&str>) -> &Self {
        let mut state = self.state.lock().unwrap();
        state.ping_fails = response.is_none();
        state.ping = response.map(str::to_string);
        self
    }

    pub fn set_version(&self, version: Option<EngineVersion>) -> &Self {
        self.state.lock().unwrap().version = version;
        self
    }

    pub fn set_exit_code(&self, code: i64) -> &Self {
        self.state.lock().unwrap().exit_code = code;
        self
    }

    /// End the attached output stream with an error after the scripted chunks
    pub fn break_output(&self) -> &Self {
        self.state.lock().unwrap().output_breaks = true;
        self
    }

    /// Make `wait` never return, as a runaway command would
    pub fn hang(&self) -> &Self {
        self.state.lock().unwrap().hang = true;
        self
    }

    pub fn live(&self) -> Vec<String> {
        self.state.lock().unwrap().live.iter().cloned().collect()
    }

    pub fn specs(&self) -> Vec<SandboxSpec> {
        self.state.lock().unwrap().specs.clone()
    }

    pub fn pulled(&self) -> Vec<String> {
        self.state.lock().unwrap().pulled.clone()
    }

    fn check(&self, step: Step, name: &str) -> Result<()> {
        if self.state.lock().unwrap().failing.contains(&step) {
            self.journal.record(format!("{:?}-failed:{}", step, name).to_lowercase());
            return Err(Error::Container(format!("{:?} refused for {}", step, name)));
        }
        Ok(())
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    fn name(&self) -> &str {
        "fake"
    }

    async fn ping(&self) -> Result<String> {
        let state = self.state.lock().unwrap();
        if state.ping_fails {
            return Err(Error::Container("engine unreachable".to_string()));
        }
        Ok(state.ping.clone().unwrap_or_default())
    }

    async fn version(&self) -> Result<EngineVersion> {
        self.state
            .lock()
            .unwrap()
            .version
            .clone()
            .ok_or_else(|| Error::Container("engine unreachable".to_string()))
    }

    async fn pull(&self, tag: &str) -> Result<()> {
        {
            let mut state = self.state.lock().unwrap();
            if state.pull_failures_left > 0 {
                state.pull_failures_left -= 1;
                return Err(Error::Container(format!("pull of {} interrupted", tag)));
            }
        }
        self.check(Step::Pull, tag)?;
        self.journal.record(format!("pull:{}", tag));
        self.state.lock().unwrap().pulled.push(tag.to_string());
        Ok(())
    }

    async fn create(&self, spec: &SandboxSpec) -> Result<()> {
        self.check(Step::Create, &spec.name)?;
        let mut state = self.state.lock().unwrap();
        if !state.live.insert(spec.name.clone()) {
            return Err(Error::Container(format!("name {} already in use", spec.name)));
        }
        state.specs.push(spec.clone());
        self.journal.record(format!("create:{}", spec.name));
        Ok(())
    }

    async fn start(&self, name: &str) -> Result<()> {
        self.check(Step::Start, name)?;
        self.journal.record(format!("start:{}", name));
        Ok(())
    }

    async fn attach(&self, name: &str) -> Result<OutputStream> {
        self.check(Step::Attach, name)?;
        self.journal.record(format!("attach:{}", name));
        let (chunks, breaks) = {
            let state = self.state.lock().unwrap();
            (state.output.clone(), state.output_breaks)
        };
        let mut items: Vec<Result<OutputChunk>> = chunks.into_iter().map(Ok).collect();
        if breaks {
            items.push(Err(Error::Container(format!("output of {} reset", name))));
        }
        Ok(futures::stream::iter(items).boxed())
    }

    async fn wait(&self, name: &str) -> Result<i64> {
        self.check(Step::Wait, name)?;
        let (hang, code) = {
            let state = self.state.lock().unwrap();
            (state.hang, state.exit_code)
        };
        if hang {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        self.journal.record(format!("wait:{}", name));
        Ok(code)
    }

    async fn stop(&self, name: &str) -> Result<()> {
        self.check(Step::Stop, name)?;
        self.journal.record(format!("stop:{}", name));
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<()> {
        self.check(Step::Remove, name)?;
        self.state.lock().unwrap().live.remove(name);
        self.journal.record(format!("remove:{}", name));
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .live
            .iter()
            .filter(|n| n.starts_with(prefix))
            .cloned()
            .collect())
    }
}

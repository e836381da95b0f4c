use anyhow::{anyhow, bail, Context, Result};
use log::info;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::AgentConfig;
use crate::delivery::Transport;
use crate::lifecycle::Orchestrator;
use crate::session::SessionId;

use super::loop_worker::agent_loop;
use super::{PageEvent, RuntimeClock};

const EVENT_QUEUE_DEPTH: usize = 256;

pub struct AgentController {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
    events_tx: Option<mpsc::Sender<PageEvent>>,
}

impl AgentController {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel_token: None,
            events_tx: None,
        }
    }

    /// Spawns the agent loop for a fresh page view and returns its session id.
    pub fn start<T>(&mut self, config: AgentConfig, transport: T) -> Result<SessionId>
    where
        T: Transport + Send + 'static,
    {
        if self.handle.is_some() {
            bail!("agent already running");
        }
        config.validate().context("invalid agent configuration")?;

        let orchestrator = Orchestrator::new(&config, transport, RuntimeClock::new());
        let session_id = orchestrator.session_id().clone();

        let cancel_token = CancellationToken::new();
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_DEPTH);

        let handle = tokio::spawn(agent_loop(
            orchestrator,
            config.flush_interval(),
            config.init_fallback(),
            events_rx,
            cancel_token.clone(),
        ));

        info!("agent started for session {session_id}");
        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        self.events_tx = Some(events_tx);
        Ok(session_id)
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Handle for event sources living on other tasks.
    pub fn sender(&self) -> Option<mpsc::Sender<PageEvent>> {
        self.events_tx.clone()
    }

    pub async fn send(&self, event: PageEvent) -> Result<()> {
        let tx = self
            .events_tx
            .as_ref()
            .ok_or_else(|| anyhow!("agent not started"))?;
        let name = event.name();
        tx.send(event)
            .await
            .map_err(|_| anyhow!("agent loop has exited, dropped {name} event"))
    }

    /// Tears the page view down. Sends the exit payload if the loop has not
    /// already done so.
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
        self.events_tx = None;

        if let Some(handle) = self.handle.take() {
            handle
                .await
                .context("agent loop task failed to join")
                .map(|_| ())
        } else {
            Ok(())
        }
    }
}

impl Default for AgentController {
    fn default() -> Self {
        Self::new()
    }
}

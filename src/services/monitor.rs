//! Process lifecycle coordination
//!
//! Runs one monitoring session: the interception layer and the monitored
//! child process start together, and whichever finishes first tears the
//! other down. The child is supervised by coarse polling rather than
//! blocking on exit, so interception failures and operator interrupts
//! are observed promptly.

use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio_stream::{wrappers::ReceiverStream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::settings::MonitorSettings;
use crate::intercept::{InterceptEvent, InterceptLayer};
use crate::models::session::Conversation;
use crate::services::beam::BeamClient;
use crate::services::correlator::FlowCorrelator;
use crate::services::cost::CostCalculator;
use crate::services::history::HistoryStore;
use crate::utils::error::MonitorResult;

/// Size of the intercept event channel
const EVENT_BUFFER: usize = 64;

/// Session lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NotStarted,
    Running,
    Stopped,
}

/// The program invocation being monitored
#[derive(Debug, Clone)]
pub struct MonitoredCommand {
    /// Program name or path
    pub program: String,
    /// Arguments passed through verbatim
    pub args: Vec<String>,
}

impl MonitoredCommand {
    /// Human-readable invocation string for reports and logs
    pub fn invocation(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

/// One monitoring session tying the interception layer, the flow
/// correlator, the history store, and the monitored child together
pub struct MonitorSession<I: InterceptLayer> {
    settings: MonitorSettings,
    intercept: I,
    correlator: FlowCorrelator,
    history: HistoryStore,
    calculator: CostCalculator,
    beam: Option<BeamClient>,
    cancel: CancellationToken,
    state: SessionState,
}

impl<I: InterceptLayer> MonitorSession<I> {
    /// Assemble a session; nothing starts until [`run`](Self::run)
    pub fn new(
        settings: MonitorSettings,
        intercept: I,
        calculator: CostCalculator,
        beam: Option<BeamClient>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            settings,
            intercept,
            correlator: FlowCorrelator::new(),
            history: HistoryStore::new(),
            calculator,
            beam,
            cancel,
            state: SessionState::NotStarted,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Handle to the accumulating history
    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    /// Run the session to completion.
    ///
    /// Finishes as soon as the child exits, the interception layer
    /// terminates, or the cancellation token fires. Teardown
    /// of both resources is unconditional and idempotent. Always returns
    /// the conversation collected so far; partial histories are valid.
    pub async fn run(mut self, command: &MonitoredCommand) -> MonitorResult<Conversation> {
        self.transition(SessionState::Running);

        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        self.intercept.start(events_tx).await?;

        let mut child = self.spawn_monitored(command);
        if child.is_some() {
            self.supervise(events_rx, child.as_mut()).await;
        }

        self.transition(SessionState::Stopped);

        // Both teardown paths tolerate the resource being gone already
        if let Some(mut child) = child.take() {
            if let Err(e) = child.start_kill() {
                debug!("Child already gone at teardown: {}", e);
            }
            match child.wait().await {
                Ok(status) => debug!("Child reaped with status {}", status),
                Err(e) => warn!("Failed to reap child: {}", e),
            }
        }
        self.intercept.shutdown().await;

        Ok(self.history.into_conversation())
    }

    /// Supervision loop: interleaves intercept events with child
    /// liveness polls until either side reaches a terminal state
    async fn supervise(
        &mut self,
        events_rx: mpsc::Receiver<InterceptEvent>,
        mut child: Option<&mut Child>,
    ) {
        let cancel = self.cancel.clone();
        let mut events = ReceiverStream::new(events_rx);
        let mut poll =
            tokio::time::interval(Duration::from_millis(self.settings.supervision.poll_interval_ms));
        // The first tick fires immediately; consume it so polling starts
        // one interval from now
        poll.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Session interrupted, finishing with partial history");
                    break;
                }
                event = events.next() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => {
                        warn!("Interception layer terminated, shutting session down");
                        break;
                    }
                },
                _ = poll.tick() => {
                    let Some(running) = child.as_deref_mut() else { break };
                    match running.try_wait() {
                        Ok(Some(status)) => {
                            info!("Monitored program exited with {}", status);
                            break;
                        }
                        Ok(None) => {}
                        Err(e) => {
                            warn!("Failed to poll monitored program: {}", e);
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Feed one intercept event through the correlator
    async fn handle_event(&mut self, event: InterceptEvent) {
        match event {
            InterceptEvent::Request { flow, body } => {
                self.correlator.on_request_body(flow, &body);
            }
            InterceptEvent::Response {
                flow,
                body,
                content_type,
            } => match self.correlator.on_response_body(flow, &body, &content_type) {
                Ok(round_trip) => {
                    self.history.append(round_trip.clone());
                    self.deliver_round_trip(&round_trip).await;
                }
                Err(e) if e.is_recoverable() => {
                    warn!("Skipping response on flow {}: {}", flow, e);
                }
                Err(e) => {
                    error!("Dropping round trip on flow {}: {}", flow, e);
                }
            },
        }
    }

    /// Beam the round trip with the summary so far, if a sink is
    /// configured; failures are logged, never fatal
    async fn deliver_round_trip(&self, round_trip: &crate::models::session::RoundTrip) {
        let Some(beam) = &self.beam else { return };

        let summary = match self
            .calculator
            .summarize(self.history.conversation_id(), &self.history.snapshot())
        {
            Ok(Some(summary)) => summary,
            Ok(None) => return,
            Err(e) => {
                warn!("Cannot beam round trip, summary so far failed: {}", e);
                return;
            }
        };

        if let Err(e) = beam
            .send_round_trip(self.history.conversation_id(), round_trip, &summary)
            .await
        {
            warn!("{}", e);
        }
    }

    /// Launch the monitored program with its traffic routed through the
    /// interception layer. A missing binary is not fatal: the failure is
    /// logged and the session proceeds toward Stopped.
    fn spawn_monitored(&self, command: &MonitoredCommand) -> Option<Child> {
        let proxy_url = format!("http://{}", self.intercept.proxy_addr());
        let ca_cert = self.intercept.ca_cert_path();

        let result = Command::new(&command.program)
            .args(&command.args)
            .env("HTTP_PROXY", &proxy_url)
            .env("HTTPS_PROXY", &proxy_url)
            // CA bundle variables honored by the common client ecosystems
            .env("REQUESTS_CA_BUNDLE", ca_cert)
            .env("SSL_CERT_FILE", ca_cert)
            .env("CURL_CA_BUNDLE", ca_cert)
            .env("NODE_EXTRA_CA_CERTS", ca_cert)
            // Generic variable for programs that need manual configuration
            .env("TOKMETER_CA_CERT", ca_cert)
            .spawn();

        match result {
            Ok(child) => {
                info!("Launched monitored program: {}", command.invocation());
                Some(child)
            }
            Err(e) => {
                error!(
                    "Failed to launch monitored program '{}': {}",
                    command.program, e
                );
                None
            }
        }
    }

    fn transition(&mut self, to: SessionState) {
        debug!("Session state {:?} -> {:?}", self.state, to);
        self.state = to;
    }
}

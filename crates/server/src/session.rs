//! Call session actor
//!
//! One task per call owns every piece of per-call state: converters, pacing
//! queue, turn coordinator, tool call assembly and the AI link. A single
//! `select!` loop is the only place that state changes. Slow work (AI
//! connects, instruction lookups, tool runs) happens in spawned tasks that
//! report back over the command channel.

use serde_json::Value;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::MissedTickBehavior;
use tracing::Instrument;

use call_bridge_config::{DisconnectPolicy, ReconnectConfig, Settings};
use call_bridge_core::audio::telephony::{FRAME_BYTES, FRAME_MS};
use call_bridge_core::{confidence_tone, AudioFrame, Direction, InboundConverter, OutboundConverter};
use call_bridge_pipeline::{CoordinatorConfig, DeadlineOutcome, PacingQueue, TickOutcome, TurnCoordinator};
use call_bridge_tools::{compose_instructions, InstructionResolver, ToolError, ToolRunner};
use call_bridge_transport::realtime::{decode_audio, ToolDeclaration};
use call_bridge_transport::{
    clear_message, media_message, parse_event, AiConnector, AiEvent, AiLink, ClientEvent,
    CompletedToolCall, ServerEvent, SessionConfig, StreamStart, TelephonyEvent,
    ToolCallAccumulator, TransportError,
};

use crate::metrics;
use crate::state::{AppState, CallRegistry};
use crate::ServerError;

/// Per-call totals, logged at teardown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub frames_in: u64,
    pub frames_dropped: u64,
    pub frames_forwarded: u64,
    pub frames_echoed: u64,
    pub frames_out: u64,
    pub malformed: u64,
    pub commits: u64,
    pub interrupts: u64,
    pub safety_clears: u64,
    pub tool_calls: u64,
    pub ai_connects: u64,
}

/// Results posted back to the actor by spawned work
enum Command {
    InstructionsResolved(String),
    AiConnected(AiLink),
    AiConnectFailed(TransportError),
    ToolFinished {
        call_id: String,
        name: String,
        result: Result<Value, ToolError>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AiStatus {
    /// Waiting for the start event and instructions
    Idle,
    Connecting,
    Ready,
    /// Reconnect attempts exhausted; the call continues without AI
    Failed,
}

pub struct CallSession {
    id: String,
    settings: Arc<Settings>,
    calls: CallRegistry,
    tools: Arc<dyn ToolRunner>,
    instructions: Arc<dyn InstructionResolver>,
    connector: Arc<dyn AiConnector>,

    outbound: mpsc::Sender<String>,
    commands_tx: mpsc::Sender<Command>,
    commands_rx: Option<mpsc::Receiver<Command>>,

    stream: Option<StreamStart>,
    inbound_audio: InboundConverter,
    outbound_audio: OutboundConverter,
    pacing: PacingQueue,
    turn: TurnCoordinator,
    tool_calls: ToolCallAccumulator,

    ai: Option<AiLink>,
    ai_status: AiStatus,
    session_config: Option<SessionConfig>,
    reconnect_attempts: u32,
    greeted: bool,
    /// Spawned lookups, connects and tool runs, aborted at teardown
    tasks: Vec<AbortHandle>,

    stats: SessionStats,
}

fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await,
        None => std::future::pending().await,
    }
}

async fn next_ai_event(link: &mut Option<AiLink>) -> AiEvent {
    match link {
        Some(link) => link.recv().await.unwrap_or_else(|| AiEvent::Closed {
            reason: "event channel closed".to_string(),
        }),
        None => std::future::pending().await,
    }
}

/// Delay before reconnect attempt `attempt` (0-based), doubling up to the cap
pub fn backoff_delay(config: &ReconnectConfig, attempt: u32) -> Duration {
    let factor = 1u64 << attempt.min(20);
    Duration::from_millis(
        config
            .initial_delay_ms
            .saturating_mul(factor)
            .min(config.max_delay_ms),
    )
}

impl CallSession {
    pub fn new(state: &AppState, outbound: mpsc::Sender<String>) -> Result<Self, ServerError> {
        let settings = state.settings.clone();
        let inbound_audio = InboundConverter::new(settings.realtime.input_audio()?);
        let outbound_audio = OutboundConverter::new(settings.realtime.output_audio()?)?;
        let turn = TurnCoordinator::new(CoordinatorConfig::from(&settings.turn));
        let (commands_tx, commands_rx) = mpsc::channel(32);

        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            calls: state.calls.clone(),
            tools: state.tools.clone(),
            instructions: state.instructions.clone(),
            connector: state.connector.clone(),
            settings,
            outbound,
            commands_tx,
            commands_rx: Some(commands_rx),
            stream: None,
            inbound_audio,
            outbound_audio,
            pacing: PacingQueue::new(FRAME_BYTES),
            turn,
            tool_calls: ToolCallAccumulator::new(),
            ai: None,
            ai_status: AiStatus::Idle,
            session_config: None,
            reconnect_attempts: 0,
            greeted: false,
            tasks: Vec::new(),
            stats: SessionStats::default(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Drive the call until the telephony side stops or closes
    pub async fn run(self, inbound: mpsc::Receiver<String>) -> SessionStats {
        let span = tracing::info_span!("call", call_id = %self.id);
        self.run_loop(inbound).instrument(span).await
    }

    async fn run_loop(mut self, mut inbound: mpsc::Receiver<String>) -> SessionStats {
        let Some(mut commands) = self.commands_rx.take() else {
            return self.stats;
        };

        self.calls.register(&self.id);
        metrics::record_call_started();
        metrics::record_active_calls(self.calls.count());
        tracing::info!("Call connected");

        let mut ticker = tokio::time::interval(Duration::from_millis(FRAME_MS as u64));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let deadline = self.turn.deadline();
            let flow = tokio::select! {
                message = inbound.recv() => match message {
                    Some(text) => self.on_telephony_message(&text),
                    None => {
                        tracing::info!("Telephony socket closed");
                        ControlFlow::Break(())
                    },
                },
                event = next_ai_event(&mut self.ai) => self.on_ai_event(event),
                Some(command) = commands.recv() => {
                    self.on_command(command);
                    ControlFlow::Continue(())
                },
                _ = ticker.tick() => {
                    self.on_tick();
                    ControlFlow::Continue(())
                },
                _ = sleep_until(deadline) => {
                    self.on_deadline();
                    ControlFlow::Continue(())
                },
            };
            if flow.is_break() {
                break;
            }
        }

        self.teardown()
    }

    // ---- telephony ----

    fn on_telephony_message(&mut self, text: &str) -> ControlFlow<()> {
        match parse_event(text) {
            Ok(TelephonyEvent::Start(start)) => self.on_start(start),
            Ok(TelephonyEvent::Media(frame)) => self.on_caller_frame(frame),
            Ok(TelephonyEvent::Stop) => {
                tracing::info!("Telephony stream stopped");
                return ControlFlow::Break(());
            },
            Ok(TelephonyEvent::Connected) => tracing::debug!("Telephony stream connected"),
            Ok(TelephonyEvent::Mark(name)) => tracing::debug!(mark = %name, "Playback mark reached"),
            Ok(TelephonyEvent::Dtmf(digit)) => tracing::info!(digit = %digit, "DTMF received"),
            Ok(TelephonyEvent::Ignored) => tracing::trace!("Ignoring telephony event"),
            Err(TransportError::InvalidFrame(reason)) => {
                self.stats.frames_dropped += 1;
                metrics::record_frame_dropped();
                tracing::debug!(reason = %reason, "Dropping caller frame");
            },
            Err(e) => {
                self.stats.malformed += 1;
                tracing::warn!(error = %e, "Dropping malformed telephony message");
            },
        }
        ControlFlow::Continue(())
    }

    fn on_start(&mut self, start: StreamStart) {
        if let Some(current) = &self.stream {
            tracing::warn!(
                stream_sid = %current.stream_sid,
                duplicate = %start.stream_sid,
                "Ignoring duplicate start event"
            );
            return;
        }

        tracing::info!(
            stream_sid = %start.stream_sid,
            call_sid = start.call_sid.as_deref().unwrap_or("-"),
            parameters = start.parameters.len(),
            "Media stream started"
        );
        self.calls.update(&self.id, |info| {
            info.stream_sid = Some(start.stream_sid.clone());
            info.call_sid = start.call_sid.clone();
        });

        let telephony = &self.settings.telephony;
        if telephony.confidence_tone {
            let frames = confidence_tone(
                telephony.tone_duration_ms,
                telephony.tone_frequency_hz,
                telephony.tone_amplitude,
            );
            let queued = self.pacing.extend(frames);
            tracing::debug!(frames = queued, "Queued confidence tone");
        }

        let key = start
            .parameters
            .get(&self.settings.instructions.key_parameter)
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());
        self.stream = Some(start);
        self.resolve_instructions(key);
    }

    fn resolve_instructions(&mut self, key: Option<String>) {
        let default = self.settings.instructions.default.clone();
        let language = self.settings.realtime.language.clone();

        let Some(key) = key else {
            let text = compose_instructions(None, &default, language.as_deref());
            self.on_instructions(text);
            return;
        };

        let resolver = self.instructions.clone();
        let timeout = Duration::from_millis(self.settings.instructions.lookup_timeout_ms);
        let tx = self.commands_tx.clone();
        self.ai_status = AiStatus::Connecting;

        let task = tokio::spawn(
            async move {
                let resolved = match tokio::time::timeout(timeout, resolver.resolve(&key)).await {
                    Ok(Ok(found)) => {
                        if found.is_none() {
                            tracing::info!(key = %key, "No instructions for key, using default");
                        }
                        found
                    },
                    Ok(Err(e)) => {
                        tracing::warn!(key = %key, error = %e, "Instruction lookup failed, using default");
                        None
                    },
                    Err(_) => {
                        tracing::warn!(key = %key, "Instruction lookup timed out, using default");
                        None
                    },
                };
                let text = compose_instructions(resolved.as_deref(), &default, language.as_deref());
                if tx.send(Command::InstructionsResolved(text)).await.is_err() {
                    tracing::debug!("Call ended before instructions resolved");
                }
            }
            .in_current_span(),
        );
        self.track(task);
    }

    fn track(&mut self, task: JoinHandle<()>) {
        self.tasks.retain(|t| !t.is_finished());
        self.tasks.push(task.abort_handle());
    }

    fn on_caller_frame(&mut self, frame: AudioFrame) {
        self.stats.frames_in += 1;
        metrics::record_frame_in();

        let audio = self.inbound_audio.convert(frame.payload());
        let decision = self.turn.on_caller_frame(audio.peak, now());

        if decision.echo && self.pacing.push(frame.payload().clone()) {
            self.stats.frames_echoed += 1;
        }

        if decision.forward && self.ai_status == AiStatus::Ready {
            if let Some(ai) = &self.ai {
                match ai.send(ClientEvent::append_audio(&audio.payload)) {
                    Ok(()) => self.stats.frames_forwarded += 1,
                    Err(e) => {
                        self.stats.frames_dropped += 1;
                        metrics::record_frame_dropped();
                        tracing::debug!(error = %e, "Caller frame not forwarded");
                    },
                }
            }
        }

        if decision.commit {
            self.commit();
        }
    }

    fn commit(&mut self) {
        let Some(ai) = self.ai.as_ref().filter(|_| self.ai_status == AiStatus::Ready) else {
            tracing::debug!("Commit skipped, AI not connected");
            return;
        };
        for event in [ClientEvent::CommitAudio, ClientEvent::create_response()] {
            if let Err(e) = ai.send(event) {
                tracing::warn!(error = %e, "Failed to send commit");
                return;
            }
        }
        self.stats.commits += 1;
        metrics::record_commit();
    }

    fn on_tick(&mut self) {
        let stream_sid = self.stream.as_ref().map(|s| s.stream_sid.as_str());
        let outbound = &self.outbound;
        let sequence = self.stats.frames_out;

        let outcome = self.pacing.tick(stream_sid.is_some(), |frame| {
            let Some(sid) = stream_sid else {
                return Err(frame);
            };
            let message = AudioFrame::telephony(frame.clone(), Direction::ToTelephony, sequence)
                .map_err(TransportError::from)
                .and_then(|audio| media_message(sid, &audio));
            match message {
                Ok(message) => outbound.try_send(message).map_err(|_| frame),
                Err(e) => {
                    tracing::warn!(error = %e, "Discarding unsendable frame");
                    Ok(())
                },
            }
        });

        match outcome {
            TickOutcome::Sent => {
                self.stats.frames_out += 1;
                metrics::record_frame_out();
            },
            TickOutcome::WouldBlock => tracing::trace!(queued = self.pacing.len(), "Telephony writer busy"),
            TickOutcome::Empty | TickOutcome::NotReady => {},
        }
    }

    /// Drop queued assistant audio and tell the provider to flush its buffer
    fn interrupt_playback(&mut self) {
        let dropped = self.pacing.clear();
        self.outbound_audio.reset();
        self.stats.interrupts += 1;

        if let Some(stream) = &self.stream {
            match clear_message(&stream.stream_sid) {
                Ok(message) => {
                    if self.outbound.try_send(message).is_err() {
                        tracing::warn!("Telephony writer full, clear not sent");
                    }
                },
                Err(e) => tracing::warn!(error = %e, "Failed to build clear message"),
            }
        }
        tracing::info!(dropped_frames = dropped, "Caller interrupted assistant playback");
    }

    // ---- AI ----

    fn on_instructions(&mut self, instructions: String) {
        let declarations = self
            .tools
            .declarations()
            .into_iter()
            .map(|t| ToolDeclaration::function(t.name, t.description, t.parameters))
            .collect();

        match SessionConfig::from_settings(&self.settings.realtime, instructions, declarations) {
            Ok(config) => {
                self.session_config = Some(config);
                self.spawn_connect(Duration::ZERO);
            },
            Err(e) => {
                tracing::error!(error = %e, "Cannot build AI session, continuing without AI");
                self.ai_status = AiStatus::Failed;
            },
        }
    }

    fn spawn_connect(&mut self, delay: Duration) {
        let Some(config) = self.session_config.clone() else {
            return;
        };
        let connector = self.connector.clone();
        let tx = self.commands_tx.clone();
        self.ai_status = AiStatus::Connecting;

        let task = tokio::spawn(
            async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                    if tx.is_closed() {
                        return;
                    }
                }
                let command = match connector.connect(config).await {
                    Ok(link) => Command::AiConnected(link),
                    Err(e) => Command::AiConnectFailed(e),
                };
                if tx.send(command).await.is_err() {
                    tracing::debug!("Call ended before AI connect finished");
                }
            }
            .in_current_span(),
        );
        self.track(task);
    }

    fn schedule_reconnect(&mut self) {
        let policy = self.settings.realtime.reconnect.clone();
        if self.reconnect_attempts >= policy.max_attempts {
            tracing::error!(
                attempts = self.reconnect_attempts,
                "Giving up on realtime AI, call continues without it"
            );
            self.ai_status = AiStatus::Failed;
            return;
        }
        let delay = backoff_delay(&policy, self.reconnect_attempts);
        self.reconnect_attempts += 1;
        tracing::info!(
            attempt = self.reconnect_attempts,
            delay_ms = delay.as_millis() as u64,
            "Reconnecting to realtime AI"
        );
        self.spawn_connect(delay);
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::InstructionsResolved(text) => self.on_instructions(text),
            Command::AiConnected(link) => self.on_ai_connected(link),
            Command::AiConnectFailed(e) => {
                tracing::warn!(error = %e, "Realtime AI connect failed");
                self.schedule_reconnect();
            },
            Command::ToolFinished {
                call_id,
                name,
                result,
            } => self.on_tool_finished(call_id, name, result),
        }
    }

    fn on_ai_connected(&mut self, link: AiLink) {
        self.ai = Some(link);
        self.ai_status = AiStatus::Ready;
        self.reconnect_attempts = 0;
        self.stats.ai_connects += 1;
        self.calls.update(&self.id, |info| info.ai_connected = true);
        tracing::info!("Realtime AI session ready");

        if !self.greeted {
            self.greeted = true;
            if let Some(greeting) = self.settings.realtime.greeting.clone() {
                if let Some(ai) = &self.ai {
                    if let Err(e) = ai.send(ClientEvent::create_response_with(greeting)) {
                        tracing::warn!(error = %e, "Failed to request greeting");
                    }
                }
            }
        }
    }

    fn on_ai_event(&mut self, event: AiEvent) -> ControlFlow<()> {
        match event {
            AiEvent::Message(event) => {
                self.on_server_event(event);
                ControlFlow::Continue(())
            },
            AiEvent::Closed { reason } => self.on_ai_closed(reason),
        }
    }

    fn on_server_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::SessionCreated {} | ServerEvent::SessionUpdated {} => {
                tracing::debug!("Realtime session acknowledged")
            },
            ServerEvent::ResponseCreated { response } => {
                tracing::debug!(response_id = response.id.as_deref().unwrap_or("-"), "Response started");
                self.turn.on_response_started(now());
            },
            ServerEvent::AudioDelta { delta } => self.on_audio_delta(&delta),
            ServerEvent::AudioDone {} => tracing::trace!("Response audio complete"),
            ServerEvent::ResponseDone { response } => {
                tracing::debug!(status = response.status.as_deref().unwrap_or("-"), "Response done");
                self.turn.on_response_ended();
                self.outbound_audio.reset();
            },
            ServerEvent::OutputItemAdded { item } => {
                if item.kind == "function_call" {
                    if let Some(call_id) = item.call_id.as_deref() {
                        self.tool_calls.on_item_added(call_id, item.name.as_deref());
                    }
                }
            },
            ServerEvent::FunctionCallArgumentsDelta { call_id, delta } => {
                self.tool_calls.push_delta(&call_id, &delta)
            },
            ServerEvent::FunctionCallArgumentsDone {
                call_id,
                name,
                arguments,
            } => match self
                .tool_calls
                .complete(&call_id, name.as_deref(), arguments.as_deref())
            {
                Ok(call) => self.spawn_tool(call),
                Err(e) => {
                    tracing::warn!(error = %e, "Unusable tool call");
                    metrics::record_tool_call("invalid");
                    let output = ToolError::invalid_params(e.to_string()).to_json();
                    self.send_tool_output(e.call_id(), &output);
                },
            },
            ServerEvent::SpeechStarted {} => {
                let interrupts = self.turn.on_server_speech_started();
                if interrupts
                    && self.settings.realtime.vad.interrupt_response
                    && self.settings.telephony.clear_on_interrupt
                {
                    self.interrupt_playback();
                }
            },
            ServerEvent::SpeechStopped {} => tracing::trace!("Server VAD speech stopped"),
            ServerEvent::InputCommitted {} => self.turn.on_server_committed(now()),
            ServerEvent::Error { error } => {
                tracing::warn!(
                    code = error.code.as_deref().unwrap_or("-"),
                    message = %error.message,
                    "Realtime AI reported an error"
                );
                self.turn.on_response_error();
            },
            ServerEvent::Other => {},
        }
    }

    fn on_audio_delta(&mut self, delta: &str) {
        let bytes = match decode_audio(delta) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(error = %e, "Dropping undecodable audio delta");
                return;
            },
        };
        if self.turn.on_audio_delta(now()) {
            tracing::debug!("Assistant took the floor");
        }
        let frames = self.outbound_audio.push(&bytes);
        self.pacing.extend(frames);
    }

    fn on_ai_closed(&mut self, reason: String) -> ControlFlow<()> {
        tracing::warn!(reason = %reason, "Realtime AI connection lost");
        self.ai = None;
        self.ai_status = AiStatus::Idle;
        self.turn.reset();
        self.tool_calls.clear();
        self.outbound_audio.reset();
        self.calls.update(&self.id, |info| info.ai_connected = false);

        match self.settings.realtime.on_disconnect {
            DisconnectPolicy::HangUp => {
                tracing::info!("Hanging up after AI loss");
                ControlFlow::Break(())
            },
            DisconnectPolicy::KeepOpen => {
                self.schedule_reconnect();
                ControlFlow::Continue(())
            },
        }
    }

    // ---- tools ----

    fn spawn_tool(&mut self, call: CompletedToolCall) {
        self.stats.tool_calls += 1;
        tracing::info!(tool = %call.name, call_id = %call.call_id, "Running tool");

        let tools = self.tools.clone();
        let tx = self.commands_tx.clone();
        let task = tokio::spawn(
            async move {
                let result = tools.run(&call.name, call.arguments).await;
                let command = Command::ToolFinished {
                    call_id: call.call_id,
                    name: call.name,
                    result,
                };
                if tx.send(command).await.is_err() {
                    tracing::debug!("Call ended before tool finished");
                }
            }
            .in_current_span(),
        );
        self.track(task);
    }

    fn on_tool_finished(&mut self, call_id: String, name: String, result: Result<Value, ToolError>) {
        let output = match result {
            Ok(value) => {
                metrics::record_tool_call("ok");
                tracing::debug!(tool = %name, call_id = %call_id, "Tool finished");
                value
            },
            Err(e) => {
                metrics::record_tool_call(e.kind());
                tracing::warn!(tool = %name, call_id = %call_id, error = %e, "Tool failed");
                e.to_json()
            },
        };
        self.send_tool_output(&call_id, &output);
    }

    fn send_tool_output(&self, call_id: &str, output: &Value) {
        let Some(ai) = &self.ai else {
            tracing::debug!(call_id = %call_id, "AI gone, discarding tool output");
            return;
        };
        for event in [
            ClientEvent::function_output(call_id, output),
            ClientEvent::create_response(),
        ] {
            if let Err(e) = ai.send(event) {
                tracing::warn!(call_id = %call_id, error = %e, "Failed to return tool output");
                return;
            }
        }
    }

    // ---- timers and teardown ----

    fn on_deadline(&mut self) {
        match self.turn.on_deadline(now()) {
            Some(DeadlineOutcome::SafetyCleared) => {
                self.stats.safety_clears += 1;
                metrics::record_safety_clear();
            },
            Some(DeadlineOutcome::CommitExpired) | None => {},
        }
    }

    fn teardown(mut self) -> SessionStats {
        let discarded = self.pacing.clear();
        for task in self.tasks.drain(..) {
            task.abort();
        }
        if let Some(ai) = self.ai.take() {
            ai.close();
        }
        self.calls.remove(&self.id);
        metrics::record_active_calls(self.calls.count());

        let turns = self.turn.counters();
        tracing::info!(
            frames_in = self.stats.frames_in,
            frames_out = self.stats.frames_out,
            frames_dropped = self.stats.frames_dropped,
            commits = self.stats.commits,
            responses = turns.responses,
            barge_ins = turns.barge_ins,
            tool_calls = self.stats.tool_calls,
            discarded_frames = discarded,
            "Call ended"
        );
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_delay() {
        let config = ReconnectConfig {
            max_attempts: 5,
            initial_delay_ms: 500,
            max_delay_ms: 3000,
        };
        assert_eq!(backoff_delay(&config, 0), Duration::from_millis(500));
        assert_eq!(backoff_delay(&config, 1), Duration::from_millis(1000));
        assert_eq!(backoff_delay(&config, 2), Duration::from_millis(2000));
        assert_eq!(backoff_delay(&config, 3), Duration::from_millis(3000));
        assert_eq!(backoff_delay(&config, 40), Duration::from_millis(3000));
    }
}

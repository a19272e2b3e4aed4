//! The relay session event loop.
//!
//! One [`RelaySession`] bridges a browser WebSocket to one upstream Realtime
//! connection. All traffic for a session flows through a single task that
//! selects over the two directions, so dispatch within a session is strictly
//! sequential and no per-message locking is needed.
//!
//! Client to upstream: audio fragments are validated, accounted and forwarded
//! with their original base64 payload; commit and cancel become the matching
//! upstream control events. Upstream to client: audio deltas are intercepted
//! and handed to the playback scheduler, which delivers them to the client
//! on a gapless timeline; every other recognized or unrecognized event,
//! upstream error events included, is forwarded verbatim as an
//! `openai_event`.
//!
//! Barge-in: when the upstream detects user speech while a response is being
//! generated, the session halts playback and sends exactly one cancellation.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

use super::account::SpeakerRole;
use super::registry::SessionRecord;
use crate::core::audio;
use crate::core::playback::{AudioSink, PlaybackScheduler, PlaybackUnit};
use crate::core::upstream::{
    ClientEvent, UpstreamConfig, UpstreamEvent, UpstreamLink, UpstreamLinkEvent,
    VoiceConfiguration,
};
use crate::errors::{RelayError, RelayResult};
use crate::handlers::relay::messages::{
    RelayIncomingMessage, RelayMessageRoute, RelayOutgoingMessage,
};

/// Status line sent with `connection_established`.
pub const CONNECTION_READY_MESSAGE: &str = "Connected to voice relay server";

/// Reason sent with `connection_closed` when the upstream link ends.
pub const UPSTREAM_CLOSED_REASON: &str = "OpenAI connection closed";

// =============================================================================
// Client audio sink
// =============================================================================

/// Delivers scheduled playback units to the client as `audio_delta` frames.
struct ClientAudioSink {
    client_tx: mpsc::UnboundedSender<RelayMessageRoute>,
}

impl AudioSink for ClientAudioSink {
    fn play(&self, unit: PlaybackUnit) {
        let audio = audio::encode_transport(&unit.audio);
        // A send failure means the client socket is gone; the session loop
        // ends on its own channel, so nothing to do here.
        let _ = self
            .client_tx
            .send(RelayMessageRoute::Outgoing(RelayOutgoingMessage::AudioDelta { audio }));
    }

    fn halt(&self) {
        // Queued units are dropped by the scheduler; audio the client is
        // already sounding is stopped client-side when the forwarded speech
        // event arrives.
        trace!("playback halt requested");
    }
}

// =============================================================================
// Relay session
// =============================================================================

/// One live bridge between a browser client and the upstream Realtime API.
pub struct RelaySession {
    record: Arc<SessionRecord>,
    link: UpstreamLink,
    scheduler: PlaybackScheduler,
    client_tx: mpsc::UnboundedSender<RelayMessageRoute>,
    /// Whether the upstream is currently generating a response
    responding: bool,
    /// Set on speech onset, consumed when the response audio completes
    speech_started_at: Option<Instant>,
    /// Assistant transcript deltas accumulated for the current response
    assistant_transcript: String,
}

impl RelaySession {
    /// Dial the upstream and prepare the session for relaying.
    ///
    /// The upstream handshake and the initial session configuration dispatch
    /// are bounded by the configured handshake timeout. On success the
    /// session record moves to `Active`.
    ///
    /// # Errors
    /// Returns `HandshakeFailure` when the upstream cannot be reached in
    /// time; the record is left for the caller to close and deregister.
    pub async fn connect(
        record: Arc<SessionRecord>,
        config: &UpstreamConfig,
        client_tx: mpsc::UnboundedSender<RelayMessageRoute>,
    ) -> RelayResult<(Self, mpsc::Receiver<UpstreamLinkEvent>)> {
        let session_config = VoiceConfiguration::default().resolve();
        let (link, upstream_rx) = UpstreamLink::connect(config, session_config).await?;
        record.mark_active();
        info!(session_id = %record.id, "relay session active");

        let sink = Arc::new(ClientAudioSink {
            client_tx: client_tx.clone(),
        });
        let session = Self {
            record,
            link,
            scheduler: PlaybackScheduler::new(sink),
            client_tx,
            responding: false,
            speech_started_at: None,
            assistant_transcript: String::new(),
        };
        Ok((session, upstream_rx))
    }

    /// Relay until either side disconnects.
    ///
    /// Consumes the session; when this returns the record is closed and the
    /// client socket has been told to shut down.
    pub async fn run(
        mut self,
        mut client_rx: mpsc::UnboundedReceiver<String>,
        mut upstream_rx: mpsc::Receiver<UpstreamLinkEvent>,
    ) {
        self.send_to_client(RelayOutgoingMessage::ConnectionEstablished {
            session_id: self.record.id.clone(),
            message: CONNECTION_READY_MESSAGE.to_string(),
        });

        loop {
            tokio::select! {
                client_msg = client_rx.recv() => {
                    match client_msg {
                        Some(text) => self.handle_client_text(&text).await,
                        None => {
                            info!(session_id = %self.record.id, "client disconnected");
                            break;
                        }
                    }
                }

                upstream_event = upstream_rx.recv() => {
                    match upstream_event {
                        Some(UpstreamLinkEvent::Message(text)) => {
                            self.handle_upstream_text(&text).await;
                        }
                        Some(UpstreamLinkEvent::Failed { message }) => {
                            self.surface_error(RelayError::LinkFailure(message));
                        }
                        Some(UpstreamLinkEvent::Closed { reason }) => {
                            info!(session_id = %self.record.id, reason = %reason, "upstream link closed");
                            self.send_to_client(RelayOutgoingMessage::ConnectionClosed {
                                reason: UPSTREAM_CLOSED_REASON.to_string(),
                            });
                            break;
                        }
                        None => {
                            self.send_to_client(RelayOutgoingMessage::ConnectionClosed {
                                reason: UPSTREAM_CLOSED_REASON.to_string(),
                            });
                            break;
                        }
                    }
                }
            }
        }

        self.close();
    }

    // =========================================================================
    // Client -> upstream
    // =========================================================================

    async fn handle_client_text(&mut self, text: &str) {
        let message: RelayIncomingMessage = match serde_json::from_str(text) {
            Ok(message) => message,
            Err(e) => {
                self.surface_error(RelayError::MalformedMessage(e.to_string()));
                return;
            }
        };

        if let Err(e) = message.validate_size() {
            warn!(session_id = %self.record.id, "rejected client message: {}", e);
            self.send_to_client(RelayOutgoingMessage::Error {
                message: e.to_string(),
            });
            return;
        }

        match message {
            RelayIncomingMessage::AudioData { audio } => {
                self.relay_input_audio(audio).await;
            }
            RelayIncomingMessage::CommitAudio => {
                debug!(session_id = %self.record.id, "committing input audio buffer");
                self.send_upstream(ClientEvent::InputAudioBufferCommit).await;
            }
            RelayIncomingMessage::CancelResponse => {
                self.cancel_response().await;
            }
            RelayIncomingMessage::UpdateSession { session } => {
                self.apply_voice_configuration(session).await;
            }
        }
    }

    /// Validate one microphone fragment and pass it along.
    ///
    /// The payload is decoded to verify it is well-formed PCM16 and to
    /// account its duration; the upstream receives the client's original
    /// base64 string untouched.
    async fn relay_input_audio(&mut self, audio: String) {
        let pcm = match audio::decode_transport(&audio) {
            Ok(pcm) => pcm,
            Err(e) => {
                warn!(session_id = %self.record.id, "dropped client audio fragment: {}", e);
                return;
            }
        };
        if pcm.len() % audio::BYTES_PER_SAMPLE != 0 {
            warn!(session_id = %self.record.id, "dropped client audio fragment: odd byte count");
            return;
        }

        self.record.account.write().record_input_audio(pcm.len());
        self.send_upstream(ClientEvent::InputAudioBufferAppend { audio })
            .await;
    }

    /// Stop playback and cancel the in-flight response.
    ///
    /// Always sends exactly one cancellation, whether or not the upstream
    /// has announced a response yet; the upstream treats a cancel with
    /// nothing to cancel as a no-op.
    async fn cancel_response(&mut self) {
        self.scheduler.stop_all();
        self.send_upstream(ClientEvent::ResponseCancel).await;
        self.responding = false;
        debug!(session_id = %self.record.id, "client cancelled response");
    }

    /// Apply a mid-session voice configuration update.
    ///
    /// Only valid while the session is active; otherwise the update is
    /// logged and ignored. The resolved configuration is a complete
    /// replacement, so defaults fill every field the client omitted.
    async fn apply_voice_configuration(&mut self, config: VoiceConfiguration) {
        if !self.record.is_active() {
            warn!(
                session_id = %self.record.id,
                state = %self.record.lifecycle(),
                "ignoring session update outside active state"
            );
            return;
        }

        let resolved = config.resolve();
        info!(
            session_id = %self.record.id,
            voice = %resolved.voice,
            temperature = resolved.temperature,
            "applying voice configuration"
        );
        self.send_upstream(ClientEvent::SessionUpdate { session: resolved })
            .await;
    }

    // =========================================================================
    // Upstream -> client
    // =========================================================================

    async fn handle_upstream_text(&mut self, text: &str) {
        let event: UpstreamEvent = match serde_json::from_str(text) {
            Ok(event) => event,
            Err(e) => {
                warn!(session_id = %self.record.id, "malformed upstream message dropped: {}", e);
                return;
            }
        };

        match event {
            UpstreamEvent::SessionCreated { session } => {
                info!(
                    session_id = %self.record.id,
                    upstream_session = %session.id,
                    "upstream session created"
                );
            }

            // Upstream errors are recoverable notices: logged here, then
            // passed through like any other event. The session stays active
            // unless the link itself drops.
            UpstreamEvent::Error { error } => {
                warn!(
                    session_id = %self.record.id,
                    "{}",
                    RelayError::UpstreamReportedError(error.message)
                );
            }

            UpstreamEvent::SpeechStarted {} => {
                debug!(session_id = %self.record.id, "user speech started");
                self.speech_started_at = Some(Instant::now());
                if self.responding {
                    self.scheduler.stop_all();
                    self.send_upstream(ClientEvent::ResponseCancel).await;
                    self.responding = false;
                    info!(session_id = %self.record.id, "barge-in, cancelled active response");
                }
            }

            UpstreamEvent::SpeechStopped {} => {
                debug!(session_id = %self.record.id, "user speech stopped");
            }

            UpstreamEvent::TranscriptionCompleted { transcript } => {
                if !transcript.trim().is_empty() {
                    debug!(session_id = %self.record.id, "user transcript: {}", transcript);
                    // Any assistant speech accumulated so far came before
                    // this user turn; close it out first so the transcript
                    // log keeps utterance order.
                    self.flush_assistant_transcript();
                    self.record
                        .account
                        .write()
                        .add_transcript(SpeakerRole::User, transcript);
                }
            }

            UpstreamEvent::ResponseCreated {} => {
                self.responding = true;
            }

            // Audio is intercepted and scheduled, never forwarded raw.
            UpstreamEvent::AudioDelta { delta } => {
                self.relay_output_audio(&delta);
                return;
            }

            UpstreamEvent::AudioDone {} => {
                self.responding = false;
                if let Some(started) = self.speech_started_at.take() {
                    let latency_ms = started.elapsed().as_millis() as u64;
                    self.record.account.write().record_latency_ms(latency_ms);
                    info!(session_id = %self.record.id, latency_ms, "response audio complete");
                }
            }

            UpstreamEvent::AudioTranscriptDelta { delta } => {
                self.assistant_transcript.push_str(&delta);
            }

            UpstreamEvent::ResponseDone { response } => {
                if let Some(usage) = response.usage {
                    self.record.account.write().record_token_usage(
                        u64::from(usage.input_tokens),
                        u64::from(usage.output_tokens),
                        u64::from(usage.total_tokens),
                    );
                }
                self.flush_assistant_transcript();
                self.responding = false;
            }

            UpstreamEvent::Unrecognized => {
                debug!(session_id = %self.record.id, "forwarding unrecognized upstream event");
            }
        }

        self.forward_upstream_event(text);
    }

    /// Schedule one assistant audio fragment for delivery.
    fn relay_output_audio(&mut self, delta: &str) {
        let pcm = match audio::decode_transport(delta) {
            Ok(pcm) => pcm,
            Err(e) => {
                warn!(session_id = %self.record.id, "dropped assistant audio fragment: {}", e);
                return;
            }
        };

        match self.scheduler.schedule(pcm) {
            Ok(unit) => {
                self.record
                    .account
                    .write()
                    .record_output_audio(unit.audio.len());
            }
            Err(e) => {
                warn!(session_id = %self.record.id, "dropped assistant audio fragment: {}", e);
            }
        }
    }

    /// Close out the accumulated assistant transcript, if any.
    fn flush_assistant_transcript(&mut self) {
        let text = std::mem::take(&mut self.assistant_transcript);
        if !text.trim().is_empty() {
            self.record
                .account
                .write()
                .add_transcript(SpeakerRole::Assistant, text);
        }
    }

    /// Forward an upstream event to the client exactly as received.
    fn forward_upstream_event(&self, text: &str) {
        match serde_json::from_str::<serde_json::Value>(text) {
            Ok(event) => {
                self.send_to_client(RelayOutgoingMessage::OpenAiEvent { event });
            }
            Err(e) => {
                warn!(session_id = %self.record.id, "cannot forward upstream event: {}", e);
            }
        }
    }

    // =========================================================================
    // Plumbing
    // =========================================================================

    async fn send_upstream(&self, event: ClientEvent) {
        if let Err(e) = self.link.send(event).await {
            warn!(session_id = %self.record.id, "cannot reach upstream: {}", e);
        }
    }

    fn send_to_client(&self, message: RelayOutgoingMessage) {
        if self
            .client_tx
            .send(RelayMessageRoute::Outgoing(message))
            .is_err()
        {
            debug!(session_id = %self.record.id, "client channel closed");
        }
    }

    /// Log a failure and mirror it to the client as an `error` message.
    ///
    /// The session keeps running; only a closed link or client ends the loop.
    fn surface_error(&self, err: RelayError) {
        match err {
            RelayError::MalformedMessage(detail) => {
                warn!(session_id = %self.record.id, "malformed client message: {}", detail);
                self.send_to_client(RelayOutgoingMessage::Error {
                    message: format!("Invalid message format: {detail}"),
                });
            }
            RelayError::LinkFailure(message) => {
                error!(session_id = %self.record.id, "upstream link failed: {}", message);
                self.send_to_client(RelayOutgoingMessage::Error { message });
            }
            other => {
                error!(session_id = %self.record.id, "{}", other);
                self.send_to_client(RelayOutgoingMessage::Error {
                    message: other.to_string(),
                });
            }
        }
    }

    /// Final teardown: halt playback, close the record and the client socket.
    fn close(&mut self) {
        self.scheduler.stop_all();
        self.record.mark_closed();
        let _ = self.client_tx.send(RelayMessageRoute::Close);
        info!(session_id = %self.record.id, "relay session closed");
    }
}

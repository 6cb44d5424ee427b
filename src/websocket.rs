//! # Interview WebSocket
//!
//! One connection carries one interview. Clients connect to `/api/ws`, send
//! `session_init`, then answer each question by typing (`user_text`) or by
//! streaming audio (`audio_fragment` / binary frames, closed by `audio_end`
//! or two seconds of silence). Camera features arrive as `affect_features`.
//!
//! ## Actor Model:
//! - Frames are handled in order on the actor
//! - Anything that calls an external service runs in a spawned task and
//!   reports back with a `Deliver` message, so `ping` is answered at once
//! - Frames other than `ping` that arrive while `session_init` is still
//!   running are queued and replayed once the greeting has been sent
//! - A `session_end` event closes the socket with a normal close code

use crate::audio::{AudioIncrementalBuffer, BufferAction};
use crate::conversation::{AudioFragment, ConversationOrchestrator, InboundEvent, OutboundEvent, SessionInit};
use crate::error::{AppError, AppResult};
use crate::state::AppState;

use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use actix_web_actors::ws;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::collections::VecDeque;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Upper bound on frames held back while a session is being created.
const MAX_QUEUED_FRAMES: usize = 256;

/// A frame received before the connection was bound to its session.
#[derive(Debug, Clone, PartialEq)]
enum QueuedFrame {
    Event(InboundEvent),
    Audio { data: Vec<u8>, is_speaking: bool },
}

#[derive(Debug, Default)]
struct FrameQueue {
    frames: VecDeque<QueuedFrame>,
}

impl FrameQueue {
    fn push(&mut self, frame: QueuedFrame) -> AppResult<()> {
        if self.frames.len() >= MAX_QUEUED_FRAMES {
            return Err(AppError::BadRequest(
                "Too many frames sent before the session was ready".to_string(),
            ));
        }
        self.frames.push_back(frame);
        Ok(())
    }

    /// Removes every queued frame, oldest first.
    fn drain(&mut self) -> Vec<QueuedFrame> {
        self.frames.drain(..).collect()
    }

    fn len(&self) -> usize {
        self.frames.len()
    }

    fn clear(&mut self) {
        self.frames.clear();
    }
}

/// WebSocket actor for a single interview connection.
pub struct InterviewWebSocket {
    state: web::Data<AppState>,
    session_id: Option<String>,
    /// Set while a `session_init` is being processed
    init_in_flight: bool,
    queued: FrameQueue,
    buffer: AudioIncrementalBuffer,
    heartbeat_interval: Duration,
    client_timeout: Duration,
    flush_check_interval: Duration,
    last_heartbeat: Instant,
}

impl InterviewWebSocket {
    pub fn new(state: web::Data<AppState>) -> Self {
        let config = state.get_config();
        Self {
            state,
            session_id: None,
            init_in_flight: false,
            queued: FrameQueue::default(),
            buffer: AudioIncrementalBuffer::new(config.audio.buffer_config()),
            heartbeat_interval: config.performance.heartbeat_interval(),
            client_timeout: config.performance.client_timeout(),
            flush_check_interval: config.audio.flush_check_interval(),
            last_heartbeat: Instant::now(),
        }
    }

    fn handle_text(&mut self, text: &str, ctx: &mut ws::WebsocketContext<Self>) {
        let result = InboundEvent::parse(text).and_then(|event| self.dispatch(event, ctx));
        if let Err(err) = result {
            self.send_error(&err, ctx);
        }
    }

    fn dispatch(&mut self, event: InboundEvent, ctx: &mut ws::WebsocketContext<Self>) -> AppResult<()> {
        match event {
            InboundEvent::SessionInit(init) => self.start_session(init, ctx),
            InboundEvent::Ping { timestamp } => {
                self.send_event(&OutboundEvent::Pong { timestamp }, ctx);
                Ok(())
            }
            event if self.awaiting_session() => self.queued.push(QueuedFrame::Event(event)),
            InboundEvent::UserText { content } => {
                let session_id = self.bound_session()?;
                let conversation = self.state.conversation.clone();
                self.spawn_delivery(ctx, async move {
                    conversation.handle_user_text(&session_id, &content).await
                });
                Ok(())
            }
            InboundEvent::AudioFragment(fragment) => {
                let data = decode_fragment(&fragment)?;
                self.accept_audio(data, fragment.is_speaking, ctx)
            }
            InboundEvent::AudioEnd {} => {
                self.bound_session()?;
                self.flush_final(ctx);
                Ok(())
            }
            InboundEvent::AffectFeatures(features) => {
                let session_id = self.bound_session()?;
                let conversation = self.state.conversation.clone();
                self.spawn_delivery(ctx, async move {
                    conversation.handle_affect_features(&session_id, features).await
                });
                Ok(())
            }
        }
    }

    fn start_session(&mut self, init: SessionInit, ctx: &mut ws::WebsocketContext<Self>) -> AppResult<()> {
        if self.session_id.is_some() || self.init_in_flight {
            return Err(AppError::BadRequest(
                "Session already initialized on this connection".to_string(),
            ));
        }
        self.init_in_flight = true;

        let conversation = self.state.conversation.clone();
        let addr = ctx.address();
        tokio::spawn(async move {
            let bind_addr = addr.clone();
            let result = init_and_bind(&conversation, init, |session_id, greeting| async move {
                bind_addr.send(SessionBound { session_id, greeting }).await.is_ok()
            })
            .await;

            if let Err(err) = result {
                addr.do_send(InitFailed(err));
            }
        });
        Ok(())
    }

    fn awaiting_session(&self) -> bool {
        self.init_in_flight && self.session_id.is_none()
    }

    fn bound_session(&self) -> AppResult<String> {
        self.session_id
            .clone()
            .ok_or_else(|| AppError::BadRequest("Session not initialized".to_string()))
    }

    fn accept_audio(&mut self, data: Vec<u8>, is_speaking: bool, ctx: &mut ws::WebsocketContext<Self>) -> AppResult<()> {
        if self.awaiting_session() {
            return self.queued.push(QueuedFrame::Audio { data, is_speaking });
        }
        self.bound_session()?;
        let action = self.buffer.push(data, is_speaking);
        self.run_buffer_action(action, ctx);
        Ok(())
    }

    fn flush_if_silent(&mut self, ctx: &mut ws::WebsocketContext<Self>) {
        if self.session_id.is_none() {
            return;
        }
        let action = self.buffer.poll();
        if action != BufferAction::Nothing {
            debug!(session_id = ?self.session_id, "Silence timeout reached, flushing final audio");
        }
        self.run_buffer_action(action, ctx);
    }

    fn flush_final(&mut self, ctx: &mut ws::WebsocketContext<Self>) {
        let action = self.buffer.flush();
        if action == BufferAction::Nothing {
            debug!(session_id = ?self.session_id, "Nothing buffered to flush");
        }
        self.run_buffer_action(action, ctx);
    }

    /// Partials report back through `PartialTranscript` so a result that
    /// lands after its utterance was flushed can be dropped. The final
    /// transcript is submitted as the answer.
    fn run_buffer_action(&mut self, action: BufferAction, ctx: &mut ws::WebsocketContext<Self>) {
        let Some(session_id) = self.session_id.clone() else {
            return;
        };

        match action {
            BufferAction::Nothing => {}
            BufferAction::Partial { audio, utterance } => {
                let transcription = self.state.transcription.clone();
                let addr = ctx.address();
                tokio::spawn(async move {
                    if let Some(text) = transcription.transcribe_partial(&audio).await {
                        addr.do_send(PartialTranscript { utterance, text });
                    }
                });
            }
            BufferAction::Final { audio } => {
                let transcription = self.state.transcription.clone();
                let conversation = self.state.conversation.clone();
                self.spawn_delivery(ctx, async move {
                    let text = transcription.transcribe_final(&audio).await;
                    conversation.handle_transcript(&session_id, &text).await
                });
            }
        }
    }

    /// Replays frames held back during `session_init`.
    fn replay_queued(&mut self, ctx: &mut ws::WebsocketContext<Self>) {
        for frame in self.queued.drain() {
            let result = match frame {
                QueuedFrame::Event(event) => self.dispatch(event, ctx),
                QueuedFrame::Audio { data, is_speaking } => self.accept_audio(data, is_speaking, ctx),
            };
            if let Err(err) = result {
                self.send_error(&err, ctx);
            }
        }
    }

    /// Runs `work` off the actor and delivers its events back to the client.
    fn spawn_delivery<F>(&self, ctx: &mut ws::WebsocketContext<Self>, work: F)
    where
        F: Future<Output = AppResult<Vec<OutboundEvent>>> + Send + 'static,
    {
        let addr = ctx.address();
        tokio::spawn(async move {
            let events = match work.await {
                Ok(events) => events,
                Err(err) => vec![OutboundEvent::from_error(&err)],
            };
            if !events.is_empty() {
                addr.do_send(Deliver(events));
            }
        });
    }

    fn send_event(&self, event: &OutboundEvent, ctx: &mut ws::WebsocketContext<Self>) {
        match serde_json::to_string(event) {
            Ok(json) => ctx.text(json),
            Err(e) => error!("Failed to serialize {} event: {}", event.kind(), e),
        }
    }

    fn send_error(&self, err: &AppError, ctx: &mut ws::WebsocketContext<Self>) {
        if err.is_server_error() {
            error!(session_id = ?self.session_id, "WebSocket error: {}", err);
        } else {
            warn!(session_id = ?self.session_id, "WebSocket client error: {}", err);
        }
        self.send_event(&OutboundEvent::from_error(err), ctx);
    }
}

/// Creates the session and hands it to the connection through `bind`. When
/// `bind` reports that the connection is gone, the session is evicted again.
async fn init_and_bind<F, Fut>(conversation: &ConversationOrchestrator, init: SessionInit, bind: F) -> AppResult<()>
where
    F: FnOnce(String, OutboundEvent) -> Fut,
    Fut: Future<Output = bool>,
{
    let (session_id, greeting) = conversation.init_session(init).await?;

    if !bind(session_id.clone(), greeting).await {
        warn!(session_id = %session_id, "Connection closed during session init, evicting session");
        conversation.end_session(&session_id);
    }
    Ok(())
}

/// The caption for a partial result, or `None` once its utterance has been
/// flushed.
fn partial_caption(buffer: &AudioIncrementalBuffer, utterance: u64, text: String) -> Option<OutboundEvent> {
    (buffer.utterance() == utterance).then_some(OutboundEvent::IncrementalTranscript { text })
}

/// Decodes the base64 payload of an `audio_fragment` event.
pub fn decode_fragment(fragment: &AudioFragment) -> AppResult<Vec<u8>> {
    STANDARD
        .decode(fragment.data.trim())
        .map_err(|e| AppError::BadRequest(format!("Invalid audio fragment encoding: {}", e)))
}

/// Events produced by a spawned task, delivered in order.
#[derive(Message)]
#[rtype(result = "()")]
struct Deliver(Vec<OutboundEvent>);

/// A `session_init` succeeded and the connection now carries this session.
#[derive(Message)]
#[rtype(result = "()")]
struct SessionBound {
    session_id: String,
    greeting: OutboundEvent,
}

#[derive(Message)]
#[rtype(result = "()")]
struct InitFailed(AppError);

#[derive(Message)]
#[rtype(result = "()")]
struct PartialTranscript {
    utterance: u64,
    text: String,
}

impl Actor for InterviewWebSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!("Interview WebSocket connection started");
        self.state.connection_opened();

        ctx.run_interval(self.heartbeat_interval, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > act.client_timeout {
                warn!(session_id = ?act.session_id, "WebSocket heartbeat timeout, closing connection");
                ctx.stop();
            } else {
                ctx.ping(b"");
            }
        });

        ctx.run_interval(self.flush_check_interval, |act, ctx| act.flush_if_silent(ctx));
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        if let Some(session_id) = &self.session_id {
            self.state.conversation.end_session(session_id);
        }
        self.state.connection_closed();
        info!(session_id = ?self.session_id, "Interview WebSocket connection stopped");
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for InterviewWebSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => self.handle_text(&text, ctx),
            Ok(ws::Message::Binary(data)) => {
                if let Err(err) = self.accept_audio(data.to_vec(), true, ctx) {
                    self.send_error(&err, ctx);
                }
            }
            Ok(ws::Message::Ping(data)) => {
                ctx.pong(&data);
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Close(reason)) => {
                info!(session_id = ?self.session_id, "WebSocket closed by client: {:?}", reason);
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                warn!("Received unexpected continuation frame");
            }
            Ok(ws::Message::Nop) => {}
            Err(err) => {
                error!("WebSocket protocol error: {}", err);
                ctx.stop();
            }
        }
    }
}

impl Handler<Deliver> for InterviewWebSocket {
    type Result = ();

    fn handle(&mut self, msg: Deliver, ctx: &mut Self::Context) {
        for event in msg.0 {
            self.send_event(&event, ctx);
            if event.is_session_end() {
                info!(session_id = ?self.session_id, "Session ended, closing connection");
                ctx.close(Some(ws::CloseReason::from(ws::CloseCode::Normal)));
                ctx.stop();
                return;
            }
        }
    }
}

impl Handler<SessionBound> for InterviewWebSocket {
    type Result = ();

    fn handle(&mut self, msg: SessionBound, ctx: &mut Self::Context) {
        self.init_in_flight = false;
        self.buffer.clear();
        info!(session_id = %msg.session_id, "WebSocket bound to interview session");
        self.session_id = Some(msg.session_id);
        self.send_event(&msg.greeting, ctx);
        self.replay_queued(ctx);
    }
}

impl Handler<InitFailed> for InterviewWebSocket {
    type Result = ();

    fn handle(&mut self, msg: InitFailed, ctx: &mut Self::Context) {
        self.init_in_flight = false;
        let dropped = self.queued.len();
        self.queued.clear();
        if dropped > 0 {
            debug!(dropped, "Discarding frames queued behind a failed session_init");
        }
        self.send_error(&msg.0, ctx);
    }
}

impl Handler<PartialTranscript> for InterviewWebSocket {
    type Result = ();

    fn handle(&mut self, msg: PartialTranscript, ctx: &mut Self::Context) {
        match partial_caption(&self.buffer, msg.utterance, msg.text) {
            Some(event) => self.send_event(&event, ctx),
            None => debug!(session_id = ?self.session_id, "Dropping partial transcript for a flushed utterance"),
        }
    }
}

/// `GET /api/ws`: upgrades the request to an interview connection.
pub async fn interview_websocket(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    info!("New WebSocket connection request from: {:?}", req.connection_info().peer_addr());
    ws::start(InterviewWebSocket::new(state), &req, stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_state;

    #[test]
    fn test_decode_fragment() {
        let fragment = AudioFragment {
            data: STANDARD.encode([1u8, 2, 3]),
            is_speaking: true,
        };
        assert_eq!(decode_fragment(&fragment).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_decode_fragment_rejects_garbage() {
        let fragment = AudioFragment {
            data: "not base64 !!".to_string(),
            is_speaking: false,
        };
        let err = decode_fragment(&fragment).unwrap_err();
        assert_eq!(err.code(), "bad_request");
    }

    #[test]
    fn test_actor_uses_configured_timings() {
        let state = web::Data::new(test_state());
        let socket = InterviewWebSocket::new(state.clone());
        let config = state.get_config();

        assert_eq!(socket.heartbeat_interval, config.performance.heartbeat_interval());
        assert_eq!(socket.client_timeout, config.performance.client_timeout());
        assert_eq!(socket.flush_check_interval, config.audio.flush_check_interval());
        assert!(socket.session_id.is_none());
        assert!(socket.buffer.is_empty());
    }

    #[test]
    fn test_unbound_connection_rejects_answers() {
        let socket = InterviewWebSocket::new(web::Data::new(test_state()));
        let err = socket.bound_session().unwrap_err();
        assert_eq!(err.code(), "bad_request");
    }

    fn init(session_id: &str) -> SessionInit {
        SessionInit {
            session_id: Some(session_id.to_string()),
            candidate_name: "Ada".to_string(),
            job_role: "Software Engineer".to_string(),
            job_level: "Mid".to_string(),
            question_type: "Behavioral".to_string(),
            custom_instruction: None,
        }
    }

    #[test]
    fn test_frames_queue_only_while_init_is_pending() {
        let mut socket = InterviewWebSocket::new(web::Data::new(test_state()));
        assert!(!socket.awaiting_session());

        socket.init_in_flight = true;
        assert!(socket.awaiting_session());

        socket.session_id = Some("s1".to_string());
        assert!(!socket.awaiting_session());
    }

    #[test]
    fn test_frame_queue_keeps_order_and_caps() {
        let mut queue = FrameQueue::default();
        queue
            .push(QueuedFrame::Event(InboundEvent::UserText {
                content: "yes".to_string(),
            }))
            .unwrap();
        queue
            .push(QueuedFrame::Audio {
                data: vec![1],
                is_speaking: true,
            })
            .unwrap();

        let frames = queue.drain();
        assert_eq!(frames.len(), 2);
        assert!(matches!(frames[0], QueuedFrame::Event(InboundEvent::UserText { .. })));
        assert_eq!(queue.len(), 0);

        for _ in 0..MAX_QUEUED_FRAMES {
            queue.push(QueuedFrame::Event(InboundEvent::AudioEnd {})).unwrap();
        }
        let err = queue.push(QueuedFrame::Event(InboundEvent::AudioEnd {})).unwrap_err();
        assert_eq!(err.code(), "bad_request");

        queue.clear();
        assert_eq!(queue.len(), 0);
    }

    #[actix_web::test]
    async fn test_init_evicts_session_when_connection_is_gone() {
        let state = test_state();
        let conversation = state.conversation.clone();

        init_and_bind(&conversation, init("gone"), |_, _| async { false })
            .await
            .unwrap();

        assert!(!conversation.sessions().contains("gone"));
        assert_eq!(conversation.stats().active_sessions, 0);
    }

    #[actix_web::test]
    async fn test_init_keeps_session_once_bound() {
        let state = test_state();
        let conversation = state.conversation.clone();

        let mut bound = None;
        init_and_bind(&conversation, init("kept"), |session_id, greeting| {
            bound = Some((session_id, greeting));
            async { true }
        })
        .await
        .unwrap();

        let (session_id, greeting) = bound.unwrap();
        assert_eq!(session_id, "kept");
        assert_eq!(greeting.kind(), "greeting");
        assert!(conversation.sessions().contains("kept"));
    }

    #[actix_web::test]
    async fn test_failed_init_never_binds() {
        let state = test_state();
        let conversation = state.conversation.clone();
        let mut request = init("bad");
        request.job_role = "  ".to_string();

        let mut called = false;
        let err = init_and_bind(&conversation, request, |_, _| {
            called = true;
            async { true }
        })
        .await
        .unwrap_err();

        assert_eq!(err.code(), "validation_error");
        assert!(!called);
    }

    #[test]
    fn test_partial_caption_dropped_after_final_flush() {
        let state = test_state();
        let mut buffer = AudioIncrementalBuffer::new(state.get_config().audio.buffer_config());
        let utterance = buffer.utterance();
        buffer.push(vec![1, 2], true);

        assert_eq!(
            partial_caption(&buffer, utterance, "tell me".to_string()),
            Some(OutboundEvent::IncrementalTranscript {
                text: "tell me".to_string()
            })
        );

        assert!(matches!(buffer.flush(), BufferAction::Final { .. }));
        assert_eq!(partial_caption(&buffer, utterance, "tell me".to_string()), None);
    }

    #[test]
    fn test_session_end_frame_shape() {
        let event = OutboundEvent::SessionEnd {
            content: "Thank you for your time.".to_string(),
        };
        let json: serde_json::Value = serde_json::from_str(&serde_json::to_string(&event).unwrap()).unwrap();
        assert_eq!(json["type"], "session_end");
        assert!(event.is_session_end());
    }
}

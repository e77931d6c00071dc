//! Playback controller
//!
//! The session lives inside a single tokio task. Callers talk to it through a
//! cloneable [`PlaybackController`] handle: commands go over an mpsc channel
//! with oneshot replies, state comes back through a `watch` snapshot.
//! Dropping every handle tears the session down.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};

use super::pipeline::{MediaError, MediaPipeline, MediaSource, MediaStream, PipelineContext, PipelineEvent};
use super::state::{EndEffect, PlayEffect, PlaybackSession, PlaybackSnapshot, SessionOptions};
use super::time_format::{time_update, TimeUpdate};
use crate::render::FrameSlot;
use crate::settings::PlaybackSettings;

/// Errors returned by controller commands
#[derive(Debug, Clone, thiserror::Error)]
pub enum PlaybackError {
    #[error("no playback session is open")]
    SessionNotOpen,
    #[error("a playback session is already open")]
    AlreadyInitialized,
    #[error("playback session was disposed")]
    Disposed,
    #[error("invalid time: {0}")]
    InvalidTime(f64),
    #[error(transparent)]
    Media(#[from] MediaError),
}

type Reply = oneshot::Sender<Result<(), PlaybackError>>;

enum ControlMessage {
    Init {
        source: MediaSource,
        options: SessionOptions,
        reply: Reply,
    },
    Play {
        reply: Reply,
    },
    Pause {
        reply: Reply,
    },
    JumpTo {
        seconds: f64,
        reply: Reply,
    },
    SeekBy {
        delta: f64,
        reply: Reply,
    },
    Dispose {
        reply: oneshot::Sender<()>,
    },
}

/// Handle to the playback actor
#[derive(Clone)]
pub struct PlaybackController {
    commands: mpsc::UnboundedSender<ControlMessage>,
    snapshot: watch::Receiver<PlaybackSnapshot>,
    task: Arc<JoinHandle<()>>,
}

impl std::fmt::Debug for PlaybackController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackController")
            .field("snapshot", &*self.snapshot.borrow())
            .finish()
    }
}

impl PlaybackController {
    /// Spawn the actor on the current tokio runtime
    ///
    /// Time updates are sent on `updates` about once per `time_update_ms`
    /// while a session is open and its duration is known.
    pub fn spawn(
        pipeline: Arc<dyn MediaPipeline>,
        frames: Arc<FrameSlot>,
        settings: &PlaybackSettings,
        updates: mpsc::UnboundedSender<TimeUpdate>,
    ) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot) = watch::channel(PlaybackSnapshot::default());
        let (events, event_rx) = mpsc::unbounded_channel();

        let actor = SessionActor {
            pipeline,
            frames,
            commands: command_rx,
            events,
            event_rx,
            snapshot: snapshot_tx,
            updates,
            poll_period: settings.readiness_poll_interval(),
            tick_period: settings.time_update_interval(),
            session: Session::NotInitialized,
            readiness_poll: None,
            time_ticker: None,
        };

        let task = tokio::spawn(actor.run());

        Self {
            commands,
            snapshot,
            task: Arc::new(task),
        }
    }

    async fn request(&self, build: impl FnOnce(Reply) -> ControlMessage) -> Result<(), PlaybackError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(build(reply))
            .map_err(|_| PlaybackError::Disposed)?;
        rx.await.unwrap_or(Err(PlaybackError::Disposed))
    }

    /// Open the media source and enter `Ready`
    pub async fn init(&self, source: MediaSource, options: SessionOptions) -> Result<(), PlaybackError> {
        self.request(|reply| ControlMessage::Init { source, options, reply })
            .await
    }

    pub async fn play(&self) -> Result<(), PlaybackError> {
        self.request(|reply| ControlMessage::Play { reply }).await
    }

    pub async fn pause(&self) -> Result<(), PlaybackError> {
        self.request(|reply| ControlMessage::Pause { reply }).await
    }

    /// Seek to an absolute position in seconds, clamped to the media
    pub async fn jump_to(&self, seconds: f64) -> Result<(), PlaybackError> {
        self.request(|reply| ControlMessage::JumpTo { seconds, reply })
            .await
    }

    /// Seek relative to the current position
    pub async fn seek_by(&self, delta: f64) -> Result<(), PlaybackError> {
        self.request(|reply| ControlMessage::SeekBy { delta, reply })
            .await
    }

    /// Release the session. Safe to call any number of times.
    pub async fn dispose(&self) {
        let (reply, rx) = oneshot::channel();
        if self.commands.send(ControlMessage::Dispose { reply }).is_ok() {
            let _ = rx.await;
        }
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> PlaybackSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PlaybackSnapshot> {
        self.snapshot.clone()
    }

    /// Whether the actor task has exited
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

struct ActiveSession {
    session: PlaybackSession,
    stream: Box<dyn MediaStream>,
}

impl ActiveSession {
    /// Take the live position and duration from the stream
    fn sync_from_stream(&mut self) {
        let (position, duration) = (self.stream.position(), self.stream.duration());
        self.session.sync(position, duration);
    }
}

enum Session {
    NotInitialized,
    Open(ActiveSession),
    Disposed,
}

enum ActorEvent {
    Command(Option<ControlMessage>),
    Pipeline(PipelineEvent),
    ReadinessPoll,
    TimeTick,
}

struct SessionActor {
    pipeline: Arc<dyn MediaPipeline>,
    frames: Arc<FrameSlot>,
    commands: mpsc::UnboundedReceiver<ControlMessage>,
    /// Cloned into each stream's context
    events: mpsc::UnboundedSender<PipelineEvent>,
    event_rx: mpsc::UnboundedReceiver<PipelineEvent>,
    snapshot: watch::Sender<PlaybackSnapshot>,
    updates: mpsc::UnboundedSender<TimeUpdate>,
    poll_period: Duration,
    tick_period: Duration,
    session: Session,
    readiness_poll: Option<Interval>,
    time_ticker: Option<Interval>,
}

/// Tick an optional interval; pends forever when absent
async fn tick_optional(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

fn delayed_interval(period: Duration) -> Interval {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

impl SessionActor {
    async fn run(mut self) {
        loop {
            let event = tokio::select! {
                message = self.commands.recv() => ActorEvent::Command(message),
                Some(event) = self.event_rx.recv() => ActorEvent::Pipeline(event),
                _ = tick_optional(&mut self.readiness_poll) => ActorEvent::ReadinessPoll,
                _ = tick_optional(&mut self.time_ticker) => ActorEvent::TimeTick,
            };

            match event {
                ActorEvent::Command(Some(message)) => self.handle_command(message),
                ActorEvent::Command(None) => {
                    tracing::debug!(target: "immersive_360::playback", "All controller handles dropped");
                    self.teardown();
                    break;
                }
                ActorEvent::Pipeline(event) => self.handle_pipeline_event(event),
                ActorEvent::ReadinessPoll => self.check_readiness(),
                ActorEvent::TimeTick => self.emit_time_update(),
            }
        }
    }

    fn handle_command(&mut self, message: ControlMessage) {
        match message {
            ControlMessage::Init { source, options, reply } => {
                let _ = reply.send(self.init(source, options));
            }
            ControlMessage::Play { reply } => {
                let _ = reply.send(self.with_open("play", |actor| {
                    actor.play();
                    Ok(())
                }));
            }
            ControlMessage::Pause { reply } => {
                let _ = reply.send(self.with_open("stop", |actor| {
                    actor.pause();
                    Ok(())
                }));
            }
            ControlMessage::JumpTo { seconds, reply } => {
                let _ = reply.send(self.with_open("jumpTo", |actor| actor.jump_to(seconds)));
            }
            ControlMessage::SeekBy { delta, reply } => {
                let _ = reply.send(self.with_open("seekTo", |actor| {
                    if !delta.is_finite() {
                        return Err(PlaybackError::InvalidTime(delta));
                    }
                    let target = match actor.active() {
                        Some(active) => {
                            active.sync_from_stream();
                            active.session.seek_target(delta)
                        }
                        None => return Err(PlaybackError::SessionNotOpen),
                    };
                    actor.jump_to(target)
                }));
            }
            ControlMessage::Dispose { reply } => {
                self.teardown();
                let _ = reply.send(());
            }
        }
    }

    fn with_open(
        &mut self,
        command: &str,
        f: impl FnOnce(&mut Self) -> Result<(), PlaybackError>,
    ) -> Result<(), PlaybackError> {
        match &self.session {
            Session::Open(_) => {}
            Session::NotInitialized => {
                tracing::debug!(target: "immersive_360::playback", command, "Rejected: session not open");
                return Err(PlaybackError::SessionNotOpen);
            }
            Session::Disposed => {
                tracing::debug!(target: "immersive_360::playback", command, "Rejected: session disposed");
                return Err(PlaybackError::Disposed);
            }
        }
        f(self)
    }

    fn init(&mut self, source: MediaSource, options: SessionOptions) -> Result<(), PlaybackError> {
        match self.session {
            Session::NotInitialized => {}
            Session::Open(_) => return Err(PlaybackError::AlreadyInitialized),
            Session::Disposed => return Err(PlaybackError::Disposed),
        }

        let ctx = PipelineContext {
            events: self.events.clone(),
            frames: Arc::clone(&self.frames),
        };
        let stream = self.pipeline.open(&source, ctx).map_err(|e| {
            tracing::warn!(target: "immersive_360::playback", uri = source.uri(), error = %e, "Failed to open media");
            e
        })?;

        let mut session = PlaybackSession::new(source, options);
        session.sync(0.0, stream.duration());

        tracing::info!(
            target: "immersive_360::playback",
            uri = session.source().uri(),
            autoplay = options.autoplay,
            loop_enabled = options.loop_enabled,
            width = options.viewport.width,
            height = options.viewport.height,
            "Playback session opened"
        );

        self.session = Session::Open(ActiveSession { session, stream });
        self.time_ticker = Some(delayed_interval(self.tick_period));
        if options.autoplay {
            self.arm_readiness_poll();
        }
        self.publish();
        Ok(())
    }

    fn active(&mut self) -> Option<&mut ActiveSession> {
        match &mut self.session {
            Session::Open(active) => Some(active),
            _ => None,
        }
    }

    fn arm_readiness_poll(&mut self) {
        self.readiness_poll = Some(delayed_interval(self.poll_period));
    }

    fn play(&mut self) {
        let Some(active) = self.active() else { return };
        active.sync_from_stream();
        let from = active.session.state();
        match active.session.play() {
            PlayEffect::Resume => active.stream.play(),
            PlayEffect::Restart => {
                active.stream.seek(0.0);
                active.stream.play();
            }
            PlayEffect::None => {
                tracing::debug!(target: "immersive_360::playback", state = %from, "play ignored");
                return;
            }
        }
        tracing::info!(target: "immersive_360::playback", %from, "Playback started");
        self.readiness_poll = None;
        self.publish();
    }

    fn pause(&mut self) {
        let Some(active) = self.active() else { return };
        if active.session.pause() {
            active.stream.pause();
            let position = active.session.current_time();
            tracing::info!(target: "immersive_360::playback", position, "Playback paused");
        } else {
            tracing::debug!(target: "immersive_360::playback", state = %active.session.state(), "stop ignored");
        }
        // An explicit stop overrides pending autoplay
        self.readiness_poll = None;
        self.publish();
    }

    fn jump_to(&mut self, seconds: f64) -> Result<(), PlaybackError> {
        if !seconds.is_finite() {
            return Err(PlaybackError::InvalidTime(seconds));
        }
        let Some(active) = self.active() else {
            return Err(PlaybackError::SessionNotOpen);
        };

        let target = active.session.jump_to(seconds);
        active.stream.seek(target);
        let rearm = active.session.options().autoplay && !active.session.state().is_playing();
        tracing::debug!(target: "immersive_360::playback", requested = seconds, target, "Seek");

        if rearm {
            self.arm_readiness_poll();
        }
        self.publish();
        Ok(())
    }

    fn check_readiness(&mut self) {
        let Some(active) = self.active() else {
            self.readiness_poll = None;
            return;
        };
        let status = active.stream.status();
        tracing::trace!(target: "immersive_360::playback", ?status, "Readiness poll");
        if status.can_autoplay() {
            // play() cancels the poll
            self.play();
        } else if active.session.state().is_playing() {
            self.readiness_poll = None;
        }
    }

    fn emit_time_update(&mut self) {
        let Some(active) = self.active() else {
            self.time_ticker = None;
            return;
        };
        active.sync_from_stream();
        let update = time_update(active.session.current_time(), active.session.total_duration());

        self.publish();
        if let Some(update) = update {
            let _ = self.updates.send(update);
        }
    }

    fn handle_pipeline_event(&mut self, event: PipelineEvent) {
        let Some(active) = self.active() else {
            tracing::debug!(target: "immersive_360::playback", ?event, "Pipeline event without session");
            return;
        };

        match event {
            PipelineEvent::EndOfStream => match active.session.end_of_stream() {
                EndEffect::Loop => {
                    tracing::debug!(target: "immersive_360::playback", "End of stream, looping");
                    active.stream.seek(0.0);
                    active.stream.play();
                }
                EndEffect::Stop => {
                    tracing::info!(target: "immersive_360::playback", "End of stream");
                    active.stream.pause();
                }
                EndEffect::Ignore => return,
            },
            PipelineEvent::Failed(reason) => {
                tracing::warn!(target: "immersive_360::playback", %reason, "Media pipeline failed");
                if active.session.pause() {
                    active.stream.pause();
                }
            }
        }
        self.publish();
    }

    /// Cancel timers, close the stream and mark the session disposed
    fn teardown(&mut self) {
        self.readiness_poll = None;
        self.time_ticker = None;

        let previous = std::mem::replace(&mut self.session, Session::Disposed);
        match previous {
            Session::Open(mut active) => {
                active.stream.close();
                self.frames.clear();
                tracing::info!(target: "immersive_360::playback", uri = active.session.source().uri(), "Playback session disposed");
            }
            Session::NotInitialized => {
                tracing::debug!(target: "immersive_360::playback", "Disposed before init");
            }
            Session::Disposed => {
                tracing::debug!(target: "immersive_360::playback", "Already disposed");
            }
        }
        self.publish();
    }

    fn publish(&self) {
        let snapshot = match &self.session {
            Session::Open(active) => active.session.snapshot(),
            Session::NotInitialized | Session::Disposed => PlaybackSnapshot::default(),
        };
        self.snapshot.send_replace(snapshot);
    }
}

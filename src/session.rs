//! Per-connection ingest: parse, buffer, record, trigger tones.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::{Stream, StreamExt};
use log::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{SessionError, SinkError};
use crate::parse::{parse, Domain};
use crate::ring::RingBuffer;
use crate::shutdown::ShutdownSignal;
use crate::tone::ToneTrigger;
use crate::wav::WavSink;

/// State shared by every session of one server.
pub struct SessionContext {
    pub config: Config,
    pub buffer: Arc<RingBuffer>,
    pub tone: Option<ToneTrigger>,
    pub claims: Arc<SinkRegistry>,
}

impl SessionContext {
    pub fn new(config: Config) -> Self {
        let buffer = Arc::new(RingBuffer::new(config.buffer_capacity));
        let tone = config.tone.then(|| {
            ToneTrigger::new(
                config.tone_params(),
                config.wav_format(),
                config.tone_output.clone(),
            )
        });
        Self {
            config,
            buffer,
            tone,
            claims: Arc::new(SinkRegistry::default()),
        }
    }
}

/// Output paths currently owned by a session.
#[derive(Default)]
pub struct SinkRegistry {
    paths: Mutex<HashSet<PathBuf>>,
}

impl SinkRegistry {
    /// Claim `path` exclusively; `None` if another session holds it.
    pub fn try_claim(self: &Arc<Self>, path: &Path) -> Option<SinkClaim> {
        let mut paths = self.paths.lock().unwrap_or_else(PoisonError::into_inner);
        if !paths.insert(path.to_path_buf()) {
            return None;
        }
        Some(SinkClaim {
            registry: Arc::clone(self),
            path: path.to_path_buf(),
        })
    }
}

/// Released on drop.
pub struct SinkClaim {
    registry: Arc<SinkRegistry>,
    path: PathBuf,
}

impl Drop for SinkClaim {
    fn drop(&mut self) {
        self.registry
            .paths
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.path);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Active,
    Draining,
    Closed,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub received: u64,
    pub accepted: u64,
    pub discarded: u64,
    pub tones: u64,
    pub frames_recorded: u64,
}

/// One connection's lifecycle: `Connecting → Active → Draining → Closed`.
pub struct IngestSession {
    id: u64,
    ctx: Arc<SessionContext>,
    state: SessionState,
    sink: Option<(WavSink, SinkClaim)>,
    stats: SessionStats,
}

impl IngestSession {
    pub fn new(id: u64, ctx: Arc<SessionContext>) -> Self {
        Self {
            id,
            ctx,
            state: SessionState::Connecting,
            sink: None,
            stats: SessionStats::default(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Consume `messages` until the stream ends or shutdown is signalled, then
    /// finalize any open recording. Always leaves the session `Closed`.
    pub async fn run<S>(
        &mut self,
        messages: S,
        mut shutdown: ShutdownSignal,
    ) -> Result<SessionStats, SessionError>
    where
        S: Stream<Item = String>,
    {
        tokio::pin!(messages);
        let outcome = self.pump(&mut messages, &mut shutdown).await;
        if outcome.is_ok() {
            self.state = SessionState::Draining;
        }
        let closed = self.close_sink();
        self.state = SessionState::Closed;
        info!(
            "[session {}] closed: received={} accepted={} discarded={} tones={} frames_recorded={}",
            self.id,
            self.stats.received,
            self.stats.accepted,
            self.stats.discarded,
            self.stats.tones,
            self.stats.frames_recorded
        );
        if let Err(e) = &outcome {
            error!("[session {}] aborted: {}", self.id, e);
        }
        outcome?;
        closed?;
        Ok(self.stats)
    }

    async fn pump<S>(
        &mut self,
        messages: &mut std::pin::Pin<&mut S>,
        shutdown: &mut ShutdownSignal,
    ) -> Result<(), SessionError>
    where
        S: Stream<Item = String>,
    {
        loop {
            let message = tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    info!("[session {}] shutdown requested, draining", self.id);
                    return Ok(());
                }
                next = messages.next() => match next {
                    Some(m) => m,
                    None => {
                        info!("[session {}] stream ended", self.id);
                        return Ok(());
                    }
                },
            };
            if self.state == SessionState::Connecting {
                self.activate()?;
            }
            self.handle_message(&message).await?;
        }
    }

    /// `Connecting → Active`: optionally reset the buffer and open the recording.
    pub fn activate(&mut self) -> Result<(), SessionError> {
        let config = &self.ctx.config;
        if config.reset_buffer_on_connect {
            self.ctx.buffer.clear();
        }
        if let Some(path) = &config.record {
            let Some(claim) = self.ctx.claims.try_claim(path) else {
                warn!("[session {}] rejected: {:?} is being recorded", self.id, path);
                return Err(SessionError::OutputBusy(path.clone()));
            };
            let sink = WavSink::open(path, config.wav_format())?;
            info!("[session {}] recording to {}", self.id, sink.path().display());
            self.sink = Some((sink, claim));
        }
        self.state = SessionState::Active;
        info!("[session {}] active", self.id);
        Ok(())
    }

    /// Handle one inbound token. Malformed tokens are logged and dropped;
    /// only sink failures are returned.
    pub async fn handle_message(&mut self, token: &str) -> Result<(), SessionError> {
        self.stats.received += 1;
        let config = &self.ctx.config;
        let parsed = (
            parse(token, config.buffer_domain, config),
            parse(token, Domain::Pcm, config),
        );
        let (sample, pcm) = match parsed {
            (Ok(sample), Ok(pcm)) => (sample, pcm),
            (Err(e), _) | (_, Err(e)) => {
                warn!("[session {}] Invalid data received: {}", self.id, e);
                self.stats.discarded += 1;
                return Ok(());
            }
        };
        self.ctx.buffer.push(sample);
        self.stats.accepted += 1;
        debug!("[session {}] Received: {}", self.id, sample);

        if let Some((sink, _)) = self.sink.as_mut() {
            sink.write(&[pcm])?;
            self.stats.frames_recorded = sink.frames();
        }

        if let Some(tone) = &self.ctx.tone {
            if tone.fires_on(sample) {
                tone.fire(sample).await?;
                self.stats.tones += 1;
            }
        }
        Ok(())
    }

    /// Finalize the recording, if any. Runs on every exit path.
    fn close_sink(&mut self) -> Result<(), SinkError> {
        let Some((sink, claim)) = self.sink.take() else {
            return Ok(());
        };
        let path = sink.path().to_path_buf();
        let result = sink.close();
        drop(claim);
        match &result {
            Ok(frames) => info!(
                "[session {}] recording saved: {} ({} frames)",
                self.id,
                path.display(),
                frames
            ),
            Err(e) => error!("[session {}] failed to finalize recording: {}", self.id, e),
        }
        result.map(|_| ())
    }
}

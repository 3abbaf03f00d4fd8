//! Pipeline - sampling loop and pose consumer for one session

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use tiara_capture::{
    BackpressureGate, FrameSampler, GateStats, PerformanceMonitor, VideoSource, DEFAULT_RETENTION,
};
use tiara_core::{PoseMessage, RenderTransform, TiaraError, TiaraResult};
use tiara_pose::PoseMapper;
use tiara_transport::{ChannelHandle, SendOutcome};
use tiara_wire::FramePayload;

use crate::PipelineConfig;

/// Pipeline counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Sampling loop ticks observed
    pub ticks: u64,
    /// Frames captured after the gate allowed a tick
    pub frames_sampled: u64,
    /// Frames the channel delivered
    pub frames_sent: u64,
    /// Frames dropped (channel not open, too large, or write failed)
    pub frames_dropped: u64,
    pub encode_failures: u64,
    /// Pose messages mapped into the render slot
    pub messages_applied: u64,
    pub malformed_messages: u64,
    pub server_errors: u64,
}

/// A configured, not yet started pipeline
pub struct Pipeline<V: VideoSource> {
    config: PipelineConfig,
    source: V,
    channel: ChannelHandle,
}

impl<V: VideoSource> Pipeline<V> {
    pub fn new(config: PipelineConfig, source: V, channel: ChannelHandle) -> TiaraResult<Self> {
        config.validate()?;
        Ok(Pipeline {
            config,
            source,
            channel,
        })
    }

    /// Acquire the source and spawn the pipeline tasks.
    ///
    /// Camera acquisition errors are returned as-is and nothing is spawned.
    /// Does not connect the channel.
    pub fn start(mut self) -> TiaraResult<PipelineHandle> {
        if let Err(e) = self.source.start() {
            tracing::error!("camera unavailable: {}", e);
            return Err(TiaraError::Camera(e));
        }

        let cancel = CancellationToken::new();
        let stats = Arc::new(Mutex::new(PipelineStats::default()));
        let monitor = Arc::new(Mutex::new(PerformanceMonitor::started_at(
            Instant::now().into_std(),
            DEFAULT_RETENTION,
        )));
        let gate_stats = Arc::new(Mutex::new(GateStats::default()));
        let model_type = Arc::new(RwLock::new(self.config.model_type.clone()));
        let (render_tx, render_rx) = watch::channel(RenderTransform::hidden());

        // Subscribe before spawning so no early message is missed
        let poses = self.channel.subscribe();

        let sampler = SamplingLoop {
            source: self.source,
            sampler: FrameSampler::new(self.config.sampler.clone()),
            gate: BackpressureGate::new(&self.config.gate),
            channel: self.channel.clone(),
            monitor: Arc::clone(&monitor),
            stats: Arc::clone(&stats),
            gate_stats: Arc::clone(&gate_stats),
        };
        let sampling = tokio::spawn(sampler.run(self.config.tick_interval, cancel.clone()));

        let consumer = PoseConsumer {
            poses,
            mapper: PoseMapper::new(self.config.mapper.clone()),
            model_type: Arc::clone(&model_type),
            render: render_tx,
            stats: Arc::clone(&stats),
        };
        let consuming = tokio::spawn(consumer.run(cancel.clone()));

        tracing::info!(
            endpoint = %self.config.channel.endpoint,
            target_rate = self.config.gate.target_rate,
            "pipeline started"
        );

        Ok(PipelineHandle {
            render: render_rx,
            model_type,
            monitor,
            stats,
            gate_stats,
            channel: self.channel,
            cancel,
            tasks: vec![sampling, consuming],
        })
    }
}

/// Handle to a running pipeline
pub struct PipelineHandle {
    render: watch::Receiver<RenderTransform>,
    model_type: Arc<RwLock<String>>,
    monitor: Arc<Mutex<PerformanceMonitor>>,
    stats: Arc<Mutex<PipelineStats>>,
    gate_stats: Arc<Mutex<GateStats>>,
    channel: ChannelHandle,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl PipelineHandle {
    /// Latest render transform (hidden until the first pose arrives)
    pub fn transform(&self) -> RenderTransform {
        *self.render.borrow()
    }

    pub fn subscribe_transforms(&self) -> watch::Receiver<RenderTransform> {
        self.render.clone()
    }

    /// Achieved sampling rate over the trailing `window`
    pub fn average_rate(&self, window: Duration) -> f64 {
        self.monitor
            .lock()
            .average_rate_at(Instant::now().into_std(), window)
    }

    pub fn stats(&self) -> PipelineStats {
        let mut stats = *self.stats.lock();
        let channel = self.channel.stats();
        stats.malformed_messages = channel.malformed_messages;
        stats.server_errors = channel.server_errors;
        stats
    }

    pub fn gate_stats(&self) -> GateStats {
        self.gate_stats.lock().clone()
    }

    /// Switch the overlay model for messages that do not name one
    pub fn set_model_type(&self, model_type: impl Into<String>) {
        let model_type = model_type.into();
        tracing::info!(%model_type, "overlay model changed");
        *self.model_type.write() = model_type;
    }

    pub fn model_type(&self) -> String {
        self.model_type.read().clone()
    }

    pub fn channel(&self) -> &ChannelHandle {
        &self.channel
    }

    /// Stop sampling and consuming. An in-flight send is allowed to settle.
    pub async fn stop(self) {
        self.cancel.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::warn!("pipeline task ended abnormally: {}", e);
            }
        }
        tracing::info!("pipeline stopped");
    }
}

struct SamplingLoop<V> {
    source: V,
    sampler: FrameSampler,
    gate: BackpressureGate,
    channel: ChannelHandle,
    monitor: Arc<Mutex<PerformanceMonitor>>,
    stats: Arc<Mutex<PipelineStats>>,
    gate_stats: Arc<Mutex<GateStats>>,
}

impl<V: VideoSource> SamplingLoop<V> {
    async fn run(mut self, tick: Duration, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let now = tokio::select! {
                _ = cancel.cancelled() => break,
                now = interval.tick() => now,
            };
            self.stats.lock().ticks += 1;

            let allowed = self.gate.tick(now.into_std(), self.channel.state());
            *self.gate_stats.lock() = self.gate.stats().clone();
            if !allowed {
                continue;
            }

            self.sample_and_send(now).await;
            self.gate.settle();
        }

        self.source.stop();
        tracing::debug!("sampling loop stopped");
    }

    async fn sample_and_send(&mut self, now: Instant) {
        let Some(image) = self.sampler.capture(&mut self.source) else {
            tracing::trace!("no frame ready");
            return;
        };
        self.stats.lock().frames_sampled += 1;
        self.monitor.lock().record_frame_at(now.into_std());

        let sampler = self.sampler.clone();
        let timestamp = now.into_std();
        let sample = match tokio::task::spawn_blocking(move || sampler.encode(image, timestamp)).await {
            Ok(Ok(sample)) => sample,
            Ok(Err(e)) => {
                tracing::warn!("dropping frame: {}", e);
                self.stats.lock().encode_failures += 1;
                return;
            }
            Err(e) => {
                tracing::warn!("dropping frame, encoder task failed: {}", e);
                self.stats.lock().encode_failures += 1;
                return;
            }
        };

        let payload = match FramePayload::from_sample(sample) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!("dropping frame: {}", e);
                self.stats.lock().frames_dropped += 1;
                return;
            }
        };

        let bytes = payload.len();
        match self.channel.send(payload).await {
            SendOutcome::Delivered => {
                tracing::debug!(bytes, "frame sent");
                self.stats.lock().frames_sent += 1;
            }
            outcome => {
                tracing::debug!(?outcome, "frame not sent");
                self.stats.lock().frames_dropped += 1;
            }
        }
    }
}

struct PoseConsumer {
    poses: broadcast::Receiver<PoseMessage>,
    mapper: PoseMapper,
    model_type: Arc<RwLock<String>>,
    render: watch::Sender<RenderTransform>,
    stats: Arc<Mutex<PipelineStats>>,
}

impl PoseConsumer {
    async fn run(mut self, cancel: CancellationToken) {
        loop {
            let received = tokio::select! {
                _ = cancel.cancelled() => break,
                received = self.poses.recv() => received,
            };

            match received {
                Ok(message) => self.apply(message),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "pose consumer lagging, skipped stale messages");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        tracing::debug!("pose consumer stopped");
    }

    fn apply(&mut self, mut message: PoseMessage) {
        if message.model_type.is_none() {
            message.model_type = Some(self.model_type.read().clone());
        }
        let transform = self.mapper.map(&message);
        self.render.send_replace(transform);
        self.stats.lock().messages_applied += 1;
    }
}


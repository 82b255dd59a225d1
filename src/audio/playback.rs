//! Response playback
//!
//! [`PlaybackQueue`] sequences inbound frames through a single render slot:
//! a completion promotes the next frame, an interrupt empties everything at
//! once. [`CpalPlayback`] renders the slot from a cpal output callback.

use cpal::traits::{DeviceTrait, StreamTrait};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::oneshot;

use crate::audio::buffer::AudioBlock;
use crate::audio::device::{find_output_device, pick_config, PlaybackDevice, RenderEvent, RenderEventSender, RenderId};
use crate::audio::resample::resample;
use crate::codec::{EncodedFrame, PcmDecoder};
use crate::constants::DEVICE_READY_TIMEOUT_MS;
use crate::error::AudioError;

/// Result of one `advance()` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// A render was started
    Started(RenderId),
    /// A render is already active
    Busy,
    /// Nothing pending
    Idle,
    /// Output device not ready; the popped frame is held
    Deferred,
}

/// Playback statistics
#[derive(Debug, Clone, Default)]
pub struct PlaybackStats {
    pub frames_enqueued: u64,
    pub frames_rendered: u64,
    pub frames_skipped: u64,
    pub frames_discarded: u64,
    pub interrupts: u64,
}

/// Decoded frame waiting for the device
struct HeldFrame {
    samples: Vec<f32>,
    sample_rate: u32,
}

/// FIFO of response frames feeding one render slot
pub struct PlaybackQueue<P> {
    device: P,
    decoder: PcmDecoder,
    pending: VecDeque<EncodedFrame>,
    /// Frame popped while the device was not ready
    held: Option<HeldFrame>,
    /// Render currently occupying the slot
    current: Option<RenderId>,
    next_id: u64,
    stats: PlaybackStats,
}

impl<P: PlaybackDevice> PlaybackQueue<P> {
    pub fn new(device: P, sample_rate: u32) -> Self {
        Self {
            device,
            decoder: PcmDecoder::new(sample_rate),
            pending: VecDeque::new(),
            held: None,
            current: None,
            next_id: 0,
            stats: PlaybackStats::default(),
        }
    }

    /// Open the output device
    pub async fn acquire_device(&mut self, events: RenderEventSender) -> Result<(), AudioError> {
        self.device.acquire(events).await
    }

    /// Close the output device, dropping anything queued
    pub fn release_device(&mut self) {
        self.interrupt();
        self.device.release();
    }

    pub fn is_device_ready(&self) -> bool {
        self.device.is_ready()
    }

    /// Append a frame and start it if nothing is rendering
    pub fn enqueue(&mut self, frame: EncodedFrame) -> Advance {
        self.pending.push_back(frame);
        self.stats.frames_enqueued += 1;
        self.advance()
    }

    /// Start the next frame if the slot is free.
    ///
    /// Frames that fail to decode or fail to start are skipped. Safe to
    /// call again once the device becomes ready.
    pub fn advance(&mut self) -> Advance {
        if self.current.is_some() {
            return Advance::Busy;
        }

        loop {
            let held = match self.held.take() {
                Some(held) => held,
                None => {
                    let Some(frame) = self.pending.pop_front() else {
                        return Advance::Idle;
                    };
                    match self.decoder.decode(&frame) {
                        Ok(samples) => HeldFrame {
                            samples,
                            sample_rate: frame.sample_rate(),
                        },
                        Err(e) => {
                            self.stats.frames_skipped += 1;
                            tracing::warn!(error = %e, "skipping undecodable frame");
                            continue;
                        }
                    }
                }
            };

            if !self.device.is_ready() {
                tracing::warn!(queued = self.pending.len(), "output device not ready, holding frame");
                self.held = Some(held);
                return Advance::Deferred;
            }

            let id = RenderId(self.next_id);
            self.next_id += 1;

            match self.device.start_render(id, held.samples, held.sample_rate) {
                Ok(()) => {
                    self.current = Some(id);
                    self.stats.frames_rendered += 1;
                    tracing::trace!(render = id.0, queued = self.pending.len(), "render started");
                    return Advance::Started(id);
                }
                Err(e) => {
                    self.stats.frames_skipped += 1;
                    tracing::error!(error = %e, render = id.0, "failed to start render");
                }
            }
        }
    }

    /// Natural end of a render: free the slot and move on.
    ///
    /// Completions for anything but the current render are stale and ignored.
    pub fn on_render_complete(&mut self, id: RenderId) -> Advance {
        if self.current != Some(id) {
            tracing::debug!(render = id.0, "ignoring stale render completion");
            return Advance::Busy;
        }
        self.current = None;
        self.advance()
    }

    /// Render failure reported by the device: release the slot, keep going
    pub fn on_render_failed(&mut self, id: RenderId, reason: &str) -> Advance {
        if self.current != Some(id) {
            return Advance::Busy;
        }
        tracing::error!(render = id.0, reason, "render failed");
        self.current = None;
        self.advance()
    }

    /// Barge-in: drop every pending frame and silence the active render now.
    pub fn interrupt(&mut self) {
        let discarded = self.pending.len() + usize::from(self.held.is_some());
        self.pending.clear();
        self.held = None;
        self.stats.frames_discarded += discarded as u64;

        if let Some(id) = self.current.take() {
            self.device.halt();
            self.stats.interrupts += 1;
            tracing::info!(render = id.0, discarded, "playback interrupted");
        } else if discarded > 0 {
            self.stats.interrupts += 1;
            tracing::info!(discarded, "pending playback cleared");
        }
    }

    /// Frames waiting behind the render slot, including a held frame
    pub fn len(&self) -> usize {
        self.pending.len() + usize::from(self.held.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_rendering(&self) -> bool {
        self.current.is_some()
    }

    pub fn current(&self) -> Option<RenderId> {
        self.current
    }

    pub fn stats(&self) -> &PlaybackStats {
        &self.stats
    }

    pub fn device(&self) -> &P {
        &self.device
    }
}

/// Samples being rendered by the output callback
#[derive(Default)]
struct RenderSlot {
    id: Option<RenderId>,
    samples: Vec<f32>,
    position: usize,
}

/// Result of filling one device buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct Fill {
    /// Render that ran out of samples during this buffer
    completed: Option<RenderId>,
    /// Frames of silence written after the render ran out
    gap_frames: usize,
}

impl RenderSlot {
    fn start(&mut self, id: RenderId, samples: Vec<f32>) {
        self.id = Some(id);
        self.samples = samples;
        self.position = 0;
    }

    fn clear(&mut self) -> Option<RenderId> {
        self.samples.clear();
        self.position = 0;
        self.id.take()
    }

    /// Write the next samples into an interleaved buffer, duplicating each
    /// mono sample across `channels` and scaling by `gain`. Reports the
    /// render id once, on the buffer where the samples run out.
    fn fill(&mut self, data: &mut [f32], channels: usize, gain: f32) -> Fill {
        let mut fill = Fill::default();
        for frame in data.chunks_mut(channels.max(1)) {
            let sample = match self.samples.get(self.position) {
                Some(s) if self.id.is_some() => {
                    self.position += 1;
                    s * gain
                }
                _ => {
                    if fill.completed.is_some() {
                        fill.gap_frames += 1;
                    }
                    0.0
                }
            };
            frame.fill(sample);

            if fill.completed.is_none() && self.id.is_some() && self.position >= self.samples.len() {
                fill.completed = self.clear();
            }
        }
        fill
    }
}

/// cpal output stream owned by a dedicated thread
pub struct CpalPlayback {
    /// Device identifier, `None` for the host default
    device_id: Option<String>,
    /// Declared rate of rendered audio
    sample_rate: u32,
    gain: f32,
    slot: Arc<Mutex<RenderSlot>>,
    running: Arc<AtomicBool>,
    /// Silence written between the end of one render and the next
    gap_frames: Arc<AtomicU64>,
    /// Rate the output stream actually runs at
    device_rate: Option<u32>,
    thread_handle: Option<JoinHandle<()>>,
}

impl CpalPlayback {
    pub fn new(device_id: Option<String>, sample_rate: u32, gain: f32) -> Self {
        Self {
            device_id,
            sample_rate,
            gain,
            slot: Arc::new(Mutex::new(RenderSlot::default())),
            running: Arc::new(AtomicBool::new(false)),
            gap_frames: Arc::new(AtomicU64::new(0)),
            device_rate: None,
            thread_handle: None,
        }
    }

    pub fn device_rate(&self) -> Option<u32> {
        self.device_rate
    }

    /// Device frames of silence emitted after renders ran out mid-buffer
    pub fn gap_frames(&self) -> u64 {
        self.gap_frames.load(Ordering::Relaxed)
    }
}

impl PlaybackDevice for CpalPlayback {
    async fn acquire(&mut self, events: RenderEventSender) -> Result<(), AudioError> {
        if self.is_ready() {
            return Ok(());
        }

        let (ready_tx, ready_rx) = oneshot::channel::<Result<u32, AudioError>>();
        let device_id = self.device_id.clone();
        let target_rate = self.sample_rate;
        let gain = self.gain;
        let shared_slot = self.slot.clone();
        let slot_for_errors = self.slot.clone();
        let gap_frames = self.gap_frames.clone();
        let error_events = events.clone();
        let ready_events = events.clone();
        // Fresh flag per stream so an abandoned thread cannot be revived
        self.running = Arc::new(AtomicBool::new(true));
        let running = self.running.clone();

        let handle = thread::Builder::new()
            .name("playback".to_string())
            .spawn(move || {
                let opened = find_output_device(device_id.as_deref()).and_then(|device| {
                    let ranges: Vec<_> = device
                        .supported_output_configs()
                        .map(|c| c.collect())
                        .map_err(|e| AudioError::DeviceUnavailable(e.to_string()))?;
                    let config = pick_config(ranges, device.default_output_config().ok(), target_rate)?;
                    Ok((device, config))
                });
                let (device, config) = match opened {
                    Ok(opened) => opened,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                let channels = config.channels as usize;
                let stream = device.build_output_stream(
                    &config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        // Never wait on the session thread here
                        let Some(mut slot) = shared_slot.try_lock() else {
                            data.fill(0.0);
                            return;
                        };
                        let fill = slot.fill(data, channels, gain);
                        drop(slot);

                        if let Some(id) = fill.completed {
                            gap_frames.fetch_add(fill.gap_frames as u64, Ordering::Relaxed);
                            let _ = events.send(RenderEvent::Completed(id));
                        }
                    },
                    move |err| {
                        tracing::error!(error = %err, "audio playback error");
                        if let Some(id) = slot_for_errors.lock().clear() {
                            let _ = error_events.send(RenderEvent::Failed {
                                id,
                                reason: err.to_string(),
                            });
                        }
                    },
                    None,
                );

                let stream = match stream {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(AudioError::DeviceUnavailable(e.to_string())));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(AudioError::StreamError(e.to_string())));
                    return;
                }
                let _ = ready_tx.send(Ok(config.sample_rate.0));

                while running.load(Ordering::Relaxed) {
                    thread::sleep(Duration::from_millis(10));
                }
            })
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        self.thread_handle = Some(handle);

        match tokio::time::timeout(Duration::from_millis(DEVICE_READY_TIMEOUT_MS), ready_rx).await {
            Ok(Ok(Ok(rate))) => {
                if rate != self.sample_rate {
                    tracing::warn!(device_rate = rate, sample_rate = self.sample_rate, "playback rate differs, resampling");
                }
                self.device_rate = Some(rate);
                tracing::info!(rate, gain = self.gain, "playback device ready");
                let _ = ready_events.send(RenderEvent::DeviceReady);
                Ok(())
            }
            Ok(Ok(Err(e))) => {
                self.release();
                Err(e)
            }
            Ok(Err(_)) | Err(_) => {
                // The thread may still be opening the device; it exits on its own
                self.running.store(false, Ordering::SeqCst);
                self.thread_handle = None;
                Err(AudioError::DeviceUnavailable("playback device did not start".to_string()))
            }
        }
    }

    fn is_ready(&self) -> bool {
        self.device_rate.is_some() && self.running.load(Ordering::SeqCst)
    }

    fn start_render(&mut self, id: RenderId, samples: Vec<f32>, sample_rate: u32) -> Result<(), AudioError> {
        let Some(device_rate) = self.device_rate else {
            return Err(AudioError::NotReady);
        };
        if samples.is_empty() {
            return Err(AudioError::StreamError("empty render".to_string()));
        }

        let samples = resample(AudioBlock::new(samples, sample_rate), device_rate).into_samples();
        self.slot.lock().start(id, samples);
        Ok(())
    }

    fn halt(&mut self) {
        self.slot.lock().clear();
    }

    fn release(&mut self) {
        self.halt();
        self.running.store(false, Ordering::SeqCst);
        self.device_rate = None;

        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CpalPlayback {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct FakeSpeaker {
        ready: bool,
        fail_next: bool,
        rendering: Option<RenderId>,
        started: Vec<(RenderId, Vec<f32>)>,
        halts: usize,
    }

    impl PlaybackDevice for FakeSpeaker {
        async fn acquire(&mut self, _events: RenderEventSender) -> Result<(), AudioError> {
            self.ready = true;
            Ok(())
        }

        fn is_ready(&self) -> bool {
            self.ready
        }

        fn start_render(&mut self, id: RenderId, samples: Vec<f32>, _rate: u32) -> Result<(), AudioError> {
            if std::mem::take(&mut self.fail_next) {
                return Err(AudioError::StreamError("boom".into()));
            }
            self.rendering = Some(id);
            self.started.push((id, samples));
            Ok(())
        }

        fn halt(&mut self) {
            self.rendering = None;
            self.halts += 1;
        }

        fn release(&mut self) {
            self.ready = false;
        }
    }

    fn frame(marker: i16) -> EncodedFrame {
        EncodedFrame::from_samples(&[marker, marker], 24_000).unwrap()
    }

    fn marker(samples: &[f32]) -> i16 {
        (samples[0] * 32768.0) as i16
    }

    fn ready_queue() -> PlaybackQueue<FakeSpeaker> {
        PlaybackQueue::new(FakeSpeaker { ready: true, ..Default::default() }, 24_000)
    }

    fn started_markers(queue: &PlaybackQueue<FakeSpeaker>) -> Vec<i16> {
        queue.device().started.iter().map(|(_, s)| marker(s)).collect()
    }

    #[test]
    fn test_renders_in_arrival_order_without_gaps() {
        let mut queue = ready_queue();

        let first = queue.enqueue(frame(1));
        queue.enqueue(frame(2));
        queue.enqueue(frame(3));
        assert_eq!(first, Advance::Started(RenderId(0)));
        assert_eq!(queue.len(), 2);

        for expected in [RenderId(1), RenderId(2)] {
            let id = queue.current().unwrap();
            assert_eq!(queue.on_render_complete(id), Advance::Started(expected));
            // The slot is refilled inside the completion handler
            assert!(queue.is_rendering());
        }

        let id = queue.current().unwrap();
        assert_eq!(queue.on_render_complete(id), Advance::Idle);
        assert!(!queue.is_rendering());
        assert_eq!(started_markers(&queue), vec![1, 2, 3]);
    }

    #[test]
    fn test_interrupt_clears_and_frees_slot() {
        let mut queue = ready_queue();
        queue.enqueue(frame(1));
        queue.enqueue(frame(2));
        queue.enqueue(frame(3));

        queue.interrupt();

        assert!(queue.is_empty());
        assert!(!queue.is_rendering());
        assert_eq!(queue.device().halts, 1);
        assert_eq!(queue.stats().frames_discarded, 2);

        // Frame 4 starts without waiting for frame 1 to complete
        assert_eq!(queue.enqueue(frame(4)), Advance::Started(RenderId(1)));
        assert_eq!(started_markers(&queue), vec![1, 4]);
    }

    #[test]
    fn test_interrupt_when_idle_is_noop() {
        let mut queue = ready_queue();
        queue.interrupt();

        assert!(queue.is_empty());
        assert!(!queue.is_rendering());
        assert_eq!(queue.device().halts, 0);
        assert_eq!(queue.stats().interrupts, 0);
    }

    #[test]
    fn test_stale_completion_ignored() {
        let mut queue = ready_queue();
        queue.enqueue(frame(1));
        queue.interrupt();
        queue.enqueue(frame(2));
        queue.enqueue(frame(3));

        // Late completion of the halted first render
        assert_eq!(queue.on_render_complete(RenderId(0)), Advance::Busy);
        assert_eq!(queue.current(), Some(RenderId(1)));
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn test_holds_frame_until_device_ready() {
        let mut queue = PlaybackQueue::new(FakeSpeaker::default(), 24_000);

        assert_eq!(queue.enqueue(frame(1)), Advance::Deferred);
        assert_eq!(queue.enqueue(frame(2)), Advance::Deferred);
        assert!(!queue.is_rendering());
        assert_eq!(queue.len(), 2);

        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        queue.acquire_device(tx).await.unwrap();

        // Held frame is played first, not requeued behind frame 2
        assert_eq!(queue.advance(), Advance::Started(RenderId(0)));
        assert_eq!(started_markers(&queue), vec![1]);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_interrupt_drops_held_frame() {
        let mut queue = PlaybackQueue::new(FakeSpeaker::default(), 24_000);
        queue.enqueue(frame(1));
        queue.interrupt();

        assert!(queue.is_empty());
        assert_eq!(queue.stats().frames_discarded, 1);
    }

    #[test]
    fn test_start_failure_advances_to_next() {
        let mut queue = ready_queue();
        queue.enqueue(frame(1));
        queue.enqueue(frame(2));
        queue.enqueue(frame(3));

        queue.device.fail_next = true;
        let id = queue.current().unwrap();
        let outcome = queue.on_render_complete(id);

        assert_eq!(outcome, Advance::Started(RenderId(2)));
        assert_eq!(started_markers(&queue), vec![1, 3]);
        assert_eq!(queue.stats().frames_skipped, 1);
    }

    #[test]
    fn test_decode_failure_skips_frame() {
        let mut queue = ready_queue();
        let wrong_rate = EncodedFrame::from_samples(&[7, 7], 16_000).unwrap();

        queue.enqueue(wrong_rate);
        queue.enqueue(frame(5));

        assert_eq!(started_markers(&queue), vec![5]);
        assert_eq!(queue.stats().frames_skipped, 1);
    }

    #[test]
    fn test_render_failure_releases_slot() {
        let mut queue = ready_queue();
        queue.enqueue(frame(1));
        queue.enqueue(frame(2));

        let id = queue.current().unwrap();
        assert_eq!(queue.on_render_failed(id, "device lost"), Advance::Started(RenderId(1)));
    }

    fn slot_with(samples: Vec<f32>) -> RenderSlot {
        let mut slot = RenderSlot::default();
        slot.start(RenderId(7), samples);
        slot
    }

    #[test]
    fn test_fill_partial_buffer() {
        let mut slot = slot_with(vec![0.5; 10]);
        let mut data = [1.0f32; 4];

        let fill = slot.fill(&mut data, 1, 0.8);

        assert_eq!(fill, Fill::default());
        assert_eq!(data, [0.4; 4]);
        assert_eq!(slot.position, 4);
        assert_eq!(slot.id, Some(RenderId(7)));
    }

    #[test]
    fn test_fill_reports_completion_once() {
        let mut slot = slot_with(vec![1.0, 1.0, 1.0]);
        let mut data = [9.0f32; 5];

        let fill = slot.fill(&mut data, 1, 1.0);

        assert_eq!(fill.completed, Some(RenderId(7)));
        assert_eq!(fill.gap_frames, 2);
        assert_eq!(data, [1.0, 1.0, 1.0, 0.0, 0.0]);

        let next = slot.fill(&mut data, 1, 1.0);
        assert_eq!(next, Fill::default());
        assert_eq!(data, [0.0; 5]);
    }

    #[test]
    fn test_fill_exact_buffer_has_no_gap() {
        let mut slot = slot_with(vec![0.25; 4]);
        let mut data = [0.0f32; 4];

        let fill = slot.fill(&mut data, 1, 1.0);
        assert_eq!(fill.completed, Some(RenderId(7)));
        assert_eq!(fill.gap_frames, 0);
    }

    #[test]
    fn test_fill_after_halt_is_silent() {
        let mut slot = slot_with(vec![0.5; 8]);
        let mut data = [0.0f32; 4];
        slot.fill(&mut data, 1, 1.0);

        assert_eq!(slot.clear(), Some(RenderId(7)));
        let mut data = [1.0f32; 4];
        let fill = slot.fill(&mut data, 1, 1.0);

        assert_eq!(fill, Fill::default());
        assert_eq!(data, [0.0; 4]);
    }

    #[test]
    fn test_fill_stereo_duplicates_samples() {
        let mut slot = slot_with(vec![0.5, -0.5]);
        let mut data = [9.0f32; 6];

        let fill = slot.fill(&mut data, 2, 0.5);

        assert_eq!(data, [0.25, 0.25, -0.25, -0.25, 0.0, 0.0]);
        assert_eq!(fill.completed, Some(RenderId(7)));
        assert_eq!(fill.gap_frames, 1);
    }
}

//! Captured audio blocks
//!
//! Device callbacks arrive in platform-dependent sizes. The accumulator
//! re-chunks them into fixed-size mono blocks so the rest of the pipeline
//! sees a steady cadence.

/// Mono block of normalized samples at a known rate
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBlock {
    samples: Vec<f32>,
    sample_rate: u32,
    /// Capture period the block was recorded in
    epoch: u64,
}

impl AudioBlock {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
            epoch: 0,
        }
    }

    /// Tag the block with the capture period it belongs to
    pub fn with_epoch(mut self, epoch: u64) -> Self {
        self.epoch = epoch;
        self
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Empty block, meaning "nothing to send"
    pub fn empty(sample_rate: u32) -> Self {
        Self::new(Vec::new(), sample_rate)
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Channel count; blocks are always mono
    pub fn channels(&self) -> u16 {
        1
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Block duration in microseconds
    pub fn duration_us(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        (self.samples.len() as u64 * 1_000_000) / self.sample_rate as u64
    }
}

/// Collects interleaved device samples into fixed-size mono blocks
pub struct BlockAccumulator {
    pending: Vec<f32>,
    block_size: usize,
    sample_rate: u32,
}

impl BlockAccumulator {
    pub fn new(block_size: usize, sample_rate: u32) -> Self {
        let block_size = block_size.max(1);
        Self {
            pending: Vec::with_capacity(block_size),
            block_size,
            sample_rate,
        }
    }

    /// Push interleaved samples, down-mixing to mono by averaging channels.
    ///
    /// `emit` is called once per completed block; a block's buffer is only
    /// allocated when the previous one is handed off.
    pub fn push_interleaved(&mut self, data: &[f32], channels: usize, mut emit: impl FnMut(AudioBlock)) {
        let channels = channels.max(1);
        for frame in data.chunks(channels) {
            let sample = if channels == 1 {
                frame[0]
            } else {
                frame.iter().sum::<f32>() / frame.len() as f32
            };
            self.pending.push(sample);

            if self.pending.len() == self.block_size {
                let samples = std::mem::replace(&mut self.pending, Vec::with_capacity(self.block_size));
                emit(AudioBlock::new(samples, self.sample_rate));
            }
        }
    }

    /// Samples waiting for the next block
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Drop any partial block
    pub fn reset(&mut self) {
        self.pending.clear();
    }
}

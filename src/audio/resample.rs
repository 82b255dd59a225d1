//! Nearest-neighbor sample rate conversion
//!
//! No anti-aliasing filter is applied. Voice-band content tolerates the
//! aliasing and the conversion adds no latency.

use super::buffer::AudioBlock;

/// Convert `block` to `target_rate`.
///
/// Output length is `floor(len * target_rate / source_rate)`; output sample
/// `i` copies source sample `floor(i * source_rate / target_rate)`. Equal
/// rates return the block untouched. Zero rates yield an empty block.
pub fn resample(block: AudioBlock, target_rate: u32) -> AudioBlock {
    let source_rate = block.sample_rate();
    if source_rate == target_rate {
        return block;
    }
    let epoch = block.epoch();
    if source_rate == 0 || target_rate == 0 {
        return AudioBlock::empty(target_rate).with_epoch(epoch);
    }

    let input = block.samples();
    let source = source_rate as u64;
    let target = target_rate as u64;
    let out_len = (input.len() as u64 * target / source) as usize;

    let output: Vec<f32> = (0..out_len as u64)
        .map(|i| input[(i * source / target) as usize])
        .collect();

    AudioBlock::new(output, target_rate).with_epoch(epoch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_keeps_capture_epoch() {
        let block = AudioBlock::new(vec![0.5; 480], 48_000).with_epoch(3);
        assert_eq!(resample(block, 16_000).epoch(), 3);
    }

    #[test]
    fn test_identity_when_rates_match() {
        let block = AudioBlock::new(vec![0.1, -0.2, 0.3], 16_000);
        assert_eq!(resample(block.clone(), 16_000), block);
    }

    #[test]
    fn test_decimate_48k_to_16k() {
        let samples: Vec<f32> = (0..12).map(|i| i as f32).collect();
        let out = resample(AudioBlock::new(samples, 48_000), 16_000);

        assert_eq!(out.sample_rate(), 16_000);
        assert_eq!(out.samples(), &[0.0, 3.0, 6.0, 9.0]);
    }

    #[test]
    fn test_upsample_repeats_samples() {
        let out = resample(AudioBlock::new(vec![1.0, 2.0], 16_000), 24_000);
        assert_eq!(out.samples(), &[1.0, 1.0, 2.0]);
    }

    #[test]
    fn test_44_1k_block_to_16k() {
        let out = resample(AudioBlock::new(vec![0.0; 4096], 44_100), 16_000);
        assert_eq!(out.len(), 4096 * 16_000 / 44_100);
    }

    #[test]
    fn test_zero_length_output_is_empty() {
        let out = resample(AudioBlock::new(vec![0.5], 48_000), 16_000);
        assert!(out.is_empty());

        let out = resample(AudioBlock::new(vec![0.5; 10], 48_000), 0);
        assert!(out.is_empty());
    }

    proptest! {
        #[test]
        fn prop_output_length_law(
            len in 1usize..5000,
            source in 1u32..200_000,
            target in 1u32..200_000,
        ) {
            let out = resample(AudioBlock::new(vec![0.0; len], source), target);
            let expected = if source == target {
                len
            } else {
                (len as u64 * target as u64 / source as u64) as usize
            };
            prop_assert_eq!(out.len(), expected);
        }

        #[test]
        fn prop_samples_copied_verbatim(
            samples in prop::collection::vec(-1.0f32..=1.0, 1..512),
            target in 1u32..96_000,
        ) {
            let block = AudioBlock::new(samples.clone(), 48_000);
            let out = resample(block, target);
            for s in out.samples() {
                prop_assert!(samples.contains(s));
            }
        }
    }
}

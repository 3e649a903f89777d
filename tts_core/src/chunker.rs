//! Re-segmentation of an arbitrary PCM byte stream into fixed-duration frames.
//!
//! Backends hand us whatever their pipe or iterator produced: odd byte counts,
//! half a sample at a chunk boundary, a single huge buffer. The chunker keeps
//! the unconsumed tail and only ever cuts at whole-frame boundaries, so the
//! concatenation of emitted frames equals the input byte-for-byte.

use std::time::Duration;

use crate::error::{Result, TtsError};
use crate::frame::{AudioFrame, BYTES_PER_SAMPLE};

#[derive(Debug)]
pub struct FrameChunker {
    sample_rate: u32,
    channels: u16,
    frame_bytes: usize,
    buffer: Vec<u8>,
    bytes_in: u64,
}

impl FrameChunker {
    pub fn new(sample_rate: u32, channels: u16, frame_duration: Duration) -> Result<Self> {
        if sample_rate == 0 || channels == 0 {
            return Err(TtsError::InvalidParameter(format!(
                "Sample rate and channel count must be positive (got {sample_rate} Hz, {channels} ch)"
            )));
        }
        let samples_per_channel =
            (sample_rate as u128 * frame_duration.as_micros() / 1_000_000) as usize;
        if samples_per_channel == 0 {
            return Err(TtsError::InvalidParameter(format!(
                "Frame duration {:?} is shorter than one sample at {sample_rate} Hz",
                frame_duration
            )));
        }
        let frame_bytes = samples_per_channel * channels as usize * BYTES_PER_SAMPLE;
        Ok(Self {
            sample_rate,
            channels,
            frame_bytes,
            buffer: Vec::with_capacity(frame_bytes * 2),
            bytes_in: 0,
        })
    }

    /// Size of every full frame in bytes.
    pub fn frame_bytes(&self) -> usize {
        self.frame_bytes
    }

    /// Bytes buffered but not yet emitted.
    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }

    /// Total bytes accepted so far.
    pub fn bytes_in(&self) -> u64 {
        self.bytes_in
    }

    /// Accept a chunk and return every frame it completed, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<AudioFrame> {
        self.bytes_in += chunk.len() as u64;
        self.buffer.extend_from_slice(chunk);

        let full = self.buffer.len() / self.frame_bytes;
        if full == 0 {
            return Vec::new();
        }
        let consumed = full * self.frame_bytes;
        let frames = self.buffer[..consumed]
            .chunks_exact(self.frame_bytes)
            .map(|b| AudioFrame::from_le_bytes(b, self.sample_rate, self.channels))
            .collect();
        self.buffer.drain(..consumed);
        frames
    }

    /// End of stream: emit the trailing short frame, if any.
    ///
    /// A tail that is not a whole number of interleaved samples means the
    /// backend stopped mid-sample; that is reported instead of being padded
    /// or dropped.
    pub fn finish(&mut self) -> Result<Option<AudioFrame>> {
        if self.buffer.is_empty() {
            return Ok(None);
        }
        let align = BYTES_PER_SAMPLE * self.channels as usize;
        if self.buffer.len() % align != 0 {
            return Err(TtsError::backend(
                format!(
                    "backend output ended mid-sample ({} trailing bytes, {} byte alignment)",
                    self.buffer.len(),
                    align
                ),
                String::new(),
            ));
        }
        let tail = std::mem::take(&mut self.buffer);
        tracing::debug!(bytes = tail.len(), "flushing short final frame");
        Ok(Some(AudioFrame::from_le_bytes(
            &tail,
            self.sample_rate,
            self.channels,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic byte pattern so misalignment shows up as wrong samples.
    fn pcm_bytes(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 251) as u8).collect()
    }

    /// Irregular chunk sizes from a small LCG, including 0 and 1 byte chunks.
    fn irregular_chunks(data: &[u8], seed: u64) -> Vec<&[u8]> {
        let mut state = seed;
        let mut out = Vec::new();
        let mut pos = 0;
        while pos < data.len() {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let size = ((state >> 33) % 1500) as usize;
            let end = (pos + size).min(data.len());
            out.push(&data[pos..end]);
            pos = end;
        }
        out
    }

    #[test]
    fn test_frame_size_from_duration() {
        let c = FrameChunker::new(22_050, 1, Duration::from_millis(20)).unwrap();
        assert_eq!(c.frame_bytes(), 441 * 2);

        let c = FrameChunker::new(48_000, 2, Duration::from_millis(10)).unwrap();
        assert_eq!(c.frame_bytes(), 480 * 2 * 2);
    }

    #[test]
    fn test_rejects_degenerate_settings() {
        assert!(FrameChunker::new(0, 1, Duration::from_millis(20)).is_err());
        assert!(FrameChunker::new(16_000, 0, Duration::from_millis(20)).is_err());
        assert!(FrameChunker::new(16_000, 1, Duration::from_micros(10)).is_err());
    }

    #[test]
    fn test_irregular_chunks_match_reference_segmentation() {
        for (seed, len) in [(1u64, 50_000usize), (7, 882 * 10), (42, 4), (99, 17_641 * 2)] {
            let data = pcm_bytes(len);
            let mut chunker = FrameChunker::new(22_050, 1, Duration::from_millis(20)).unwrap();
            let frame_bytes = chunker.frame_bytes();

            let mut frames = Vec::new();
            for chunk in irregular_chunks(&data, seed) {
                frames.extend(chunker.push(chunk));
                assert!(chunker.pending_bytes() < frame_bytes);
            }
            frames.extend(chunker.finish().unwrap());

            let reference: Vec<&[u8]> = data.chunks(frame_bytes).collect();
            assert_eq!(frames.len(), reference.len(), "seed {seed}");
            for (frame, expected) in frames.iter().zip(&reference) {
                assert_eq!(&frame.to_le_bytes()[..], *expected);
            }
            assert_eq!(chunker.bytes_in(), len as u64);
        }
    }

    #[test]
    fn test_short_final_frame_is_emitted() {
        let mut chunker = FrameChunker::new(16_000, 1, Duration::from_millis(20)).unwrap();
        let frames = chunker.push(&pcm_bytes(640 + 100));
        assert_eq!(frames.len(), 1);

        let last = chunker.finish().unwrap().expect("short tail frame");
        assert_eq!(last.samples().len(), 50);
        assert!(last.samples().len() * 2 < chunker.frame_bytes());
        assert!(chunker.finish().unwrap().is_none());
    }

    #[test]
    fn test_split_sample_across_chunks() {
        let mut chunker = FrameChunker::new(1_000, 1, Duration::from_millis(2)).unwrap();
        // Two samples per frame: 0x1234, 0x5678 split unevenly.
        assert!(chunker.push(&[0x34]).is_empty());
        assert!(chunker.push(&[0x12, 0x78]).is_empty());
        let frames = chunker.push(&[0x56]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].samples(), &[0x1234, 0x5678]);
    }

    #[test]
    fn test_trailing_half_sample_is_an_error() {
        let mut chunker = FrameChunker::new(16_000, 1, Duration::from_millis(20)).unwrap();
        chunker.push(&[1, 2, 3]);
        assert!(matches!(
            chunker.finish(),
            Err(TtsError::SynthesisBackend { .. })
        ));
    }

    #[test]
    fn test_stereo_tail_must_hold_whole_sample_frames() {
        let mut chunker = FrameChunker::new(16_000, 2, Duration::from_millis(20)).unwrap();
        chunker.push(&[0, 0]);
        assert!(chunker.finish().is_err());

        let mut chunker = FrameChunker::new(16_000, 2, Duration::from_millis(20)).unwrap();
        chunker.push(&[0, 0, 1, 0]);
        let tail = chunker.finish().unwrap().unwrap();
        assert_eq!(tail.samples_per_channel(), 1);
    }
}

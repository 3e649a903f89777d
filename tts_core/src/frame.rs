use std::time::Duration;

/// Bytes per sample of signed 16-bit little-endian PCM.
pub const BYTES_PER_SAMPLE: usize = 2;

/// A slice of interleaved 16-bit PCM ready for playback.
///
/// Frames are handed to the consumer by value; the producer keeps no copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    samples: Vec<i16>,
    sample_rate: u32,
    channels: u16,
}

impl AudioFrame {
    pub fn new(samples: Vec<i16>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples,
            sample_rate,
            channels,
        }
    }

    /// Decode little-endian PCM. `bytes.len()` must be a whole number of samples.
    pub(crate) fn from_le_bytes(bytes: &[u8], sample_rate: u32, channels: u16) -> Self {
        let samples = bytes
            .chunks_exact(BYTES_PER_SAMPLE)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        Self::new(samples, sample_rate, channels)
    }

    /// Interleaved samples across all channels.
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<i16> {
        self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn samples_per_channel(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples_per_channel() as f64 / self.sample_rate as f64)
    }

    /// Re-encode as little-endian PCM bytes.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.samples.len() * BYTES_PER_SAMPLE);
        for s in &self.samples {
            out.extend_from_slice(&s.to_le_bytes());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_bytes_round_trip() {
        let bytes = [0x01, 0x00, 0xff, 0x7f, 0x00, 0x80, 0xfe, 0xff];
        let frame = AudioFrame::from_le_bytes(&bytes, 16_000, 1);
        assert_eq!(frame.samples(), &[1, i16::MAX, i16::MIN, -2]);
        assert_eq!(frame.to_le_bytes(), bytes);
    }

    #[test]
    fn test_frame_duration() {
        let frame = AudioFrame::new(vec![0; 441], 22_050, 1);
        assert_eq!(frame.duration(), Duration::from_millis(20));

        let stereo = AudioFrame::new(vec![0; 960], 48_000, 2);
        assert_eq!(stereo.samples_per_channel(), 480);
        assert_eq!(stereo.duration(), Duration::from_millis(10));
    }
}

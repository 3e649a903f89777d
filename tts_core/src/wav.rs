use std::{
    fs::File,
    io::{self, BufWriter, Cursor, Seek, Write},
    path::Path,
};

use crate::error::{Result, TtsError};
use crate::frame::AudioFrame;

/// Encode frames as a 16-bit PCM WAV file in memory.
///
/// The format is taken from the first frame; an empty slice gives `InvalidParameter`.
pub fn encode_wav(frames: &[AudioFrame]) -> Result<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::with_capacity(44 + total_samples(frames) * 2));
    write_frames(&mut cursor, frames)?;
    Ok(cursor.into_inner())
}

/// Write frames to `path` as a 16-bit PCM WAV file.
pub fn write_wav<P: AsRef<Path>>(path: P, frames: &[AudioFrame]) -> Result<()> {
    let file = File::create(path.as_ref())?;
    write_frames(BufWriter::new(file), frames)
}

fn write_frames<W: Write + Seek>(out: W, frames: &[AudioFrame]) -> Result<()> {
    let first = frames
        .first()
        .ok_or_else(|| TtsError::InvalidParameter("No audio frames to write".to_string()))?;
    let spec = hound::WavSpec {
        channels: first.channels(),
        sample_rate: first.sample_rate(),
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::new(out, spec).map_err(wav_error)?;
    for frame in frames {
        if frame.sample_rate() != spec.sample_rate || frame.channels() != spec.channels {
            return Err(TtsError::InvalidParameter(format!(
                "Frame format {} Hz/{} ch differs from {} Hz/{} ch",
                frame.sample_rate(),
                frame.channels(),
                spec.sample_rate,
                spec.channels
            )));
        }
        for &s in frame.samples() {
            writer.write_sample(s).map_err(wav_error)?;
        }
    }
    writer.finalize().map_err(wav_error)
}

fn total_samples(frames: &[AudioFrame]) -> usize {
    frames.iter().map(|f| f.samples().len()).sum()
}

fn wav_error(e: hound::Error) -> TtsError {
    match e {
        hound::Error::IoError(e) => TtsError::Io(e),
        other => TtsError::Io(io::Error::new(io::ErrorKind::InvalidData, other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_wav_header_and_samples() {
        let frames = vec![
            AudioFrame::new(vec![0, 1, -1, i16::MAX], 22_050, 1),
            AudioFrame::new(vec![i16::MIN, 7], 22_050, 1),
        ];
        let bytes = encode_wav(&frames).unwrap();
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");

        let mut reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.sample_rate, 22_050);
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.bits_per_sample, 16);
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, [0, 1, -1, i16::MAX, i16::MIN, 7]);
    }

    #[test]
    fn test_encode_wav_rejects_empty_and_mixed() {
        assert!(matches!(encode_wav(&[]), Err(TtsError::InvalidParameter(_))));

        let frames = vec![
            AudioFrame::new(vec![0; 4], 22_050, 1),
            AudioFrame::new(vec![0; 4], 16_000, 1),
        ];
        assert!(matches!(encode_wav(&frames), Err(TtsError::InvalidParameter(_))));
    }

    #[test]
    fn test_write_wav_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wav");
        write_wav(&path, &[AudioFrame::new(vec![5; 320], 16_000, 1)]).unwrap();
        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.duration(), 320);
    }
}

use serde::{Deserialize, Serialize};

use crate::error::{Result, TtsError};

/// Default speaking rate multiplier.
pub const DEFAULT_SPEED: f32 = 1.0;

/// One synthesis call: the text plus per-call voice parameters.
///
/// Fields are private so a validated request cannot be mutated afterwards;
/// build one with [`SynthesisRequest::new`] and the `with_*` methods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisRequest {
    text: String,
    voice: Option<String>,
    speed: f32,
    noise_scale: Option<f32>,
    noise_w: Option<f32>,
    volume: Option<f32>,
}

impl SynthesisRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            voice: None,
            speed: DEFAULT_SPEED,
            noise_scale: None,
            noise_w: None,
            volume: None,
        }
    }

    /// Speaker / voice identifier for multi-speaker models.
    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = Some(voice.into());
        self
    }

    pub fn with_speed(mut self, speed: f32) -> Self {
        self.speed = speed;
        self
    }

    pub fn with_noise_scale(mut self, noise_scale: f32) -> Self {
        self.noise_scale = Some(noise_scale);
        self
    }

    pub fn with_noise_w(mut self, noise_w: f32) -> Self {
        self.noise_w = Some(noise_w);
        self
    }

    /// Output gain in `0.0..=1.0`.
    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = Some(volume);
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn voice(&self) -> Option<&str> {
        self.voice.as_deref()
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    /// Piper's phoneme length scale; larger is slower.
    pub fn length_scale(&self) -> f32 {
        1.0 / self.speed
    }

    pub fn noise_scale(&self) -> Option<f32> {
        self.noise_scale
    }

    pub fn noise_w(&self) -> Option<f32> {
        self.noise_w
    }

    pub fn volume(&self) -> Option<f32> {
        self.volume
    }

    /// Reject requests no backend should ever see.
    pub fn validate(&self) -> Result<()> {
        if self.text.trim().is_empty() {
            return Err(TtsError::InvalidParameter(
                "Text cannot be empty".to_string(),
            ));
        }
        if !self.speed.is_finite() || self.speed <= 0.0 {
            return Err(TtsError::InvalidParameter(format!(
                "Speed must be a positive number, got {}",
                self.speed
            )));
        }
        if let Some(volume) = self.volume {
            if !(0.0..=1.0).contains(&volume) {
                return Err(TtsError::InvalidParameter(format!(
                    "Volume must be within 0.0..=1.0, got {volume}"
                )));
            }
        }
        for (name, value) in [("noise_scale", self.noise_scale), ("noise_w", self.noise_w)] {
            if let Some(v) = value {
                if !v.is_finite() || v < 0.0 {
                    return Err(TtsError::InvalidParameter(format!(
                        "{name} must be a non-negative number, got {v}"
                    )));
                }
            }
        }
        if let Some(voice) = &self.voice {
            if voice.trim().is_empty() {
                return Err(TtsError::InvalidParameter(
                    "Voice identifier cannot be blank".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_request_valid() {
        assert!(SynthesisRequest::new("Hello").validate().is_ok());
        assert!(SynthesisRequest::new("Hello")
            .with_speed(1.5)
            .with_volume(0.8)
            .with_noise_scale(0.667)
            .with_noise_w(0.8)
            .with_voice("3")
            .validate()
            .is_ok());
    }

    #[test]
    fn test_validate_request_empty_text() {
        for text in ["", "   ", "\n\t"] {
            let result = SynthesisRequest::new(text).validate();
            match result {
                Err(TtsError::InvalidParameter(msg)) => assert!(msg.contains("empty")),
                other => panic!("expected InvalidParameter, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_validate_request_bad_speed() {
        for speed in [0.0, -1.0, f32::NAN, f32::INFINITY] {
            let result = SynthesisRequest::new("Hello").with_speed(speed).validate();
            assert!(
                matches!(result, Err(TtsError::InvalidParameter(_))),
                "speed {speed} should be rejected"
            );
        }
    }

    #[test]
    fn test_validate_request_bad_volume_and_noise() {
        assert!(SynthesisRequest::new("Hi").with_volume(1.5).validate().is_err());
        assert!(SynthesisRequest::new("Hi").with_volume(-0.1).validate().is_err());
        assert!(SynthesisRequest::new("Hi").with_noise_scale(-0.2).validate().is_err());
        assert!(SynthesisRequest::new("Hi").with_noise_w(f32::NAN).validate().is_err());
        assert!(SynthesisRequest::new("Hi").with_voice(" ").validate().is_err());
    }

    #[test]
    fn test_length_scale_is_inverse_speed() {
        let req = SynthesisRequest::new("Hi").with_speed(2.0);
        assert!((req.length_scale() - 0.5).abs() < f32::EPSILON);
        assert!((SynthesisRequest::new("Hi").length_scale() - 1.0).abs() < f32::EPSILON);
    }
}

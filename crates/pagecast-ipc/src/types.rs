//! Common types shared across subsystems.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Placeholder written wherever the stream key would appear in logs.
const REDACTED_KEY: &str = "****";

/// The fully qualified stream destination: base URL plus stream key.
///
/// `Display` and `Debug` never print the key. Use [`ComposedDestination::expose`]
/// only when handing the URL to the encoder.
#[derive(Clone, PartialEq, Eq)]
pub struct ComposedDestination {
    base: String,
    key: String,
}

impl ComposedDestination {
    /// Compose a destination, inserting exactly one `/` between base and key.
    pub fn compose(base: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            key: key.into(),
        }
    }

    fn join(&self, key: &str) -> String {
        if self.base.ends_with('/') {
            format!("{}{}", self.base, key)
        } else {
            format!("{}/{}", self.base, key)
        }
    }

    /// The full URL including the secret key.
    pub fn expose(&self) -> String {
        self.join(&self.key)
    }

    /// The URL with the key masked, safe for logs.
    pub fn redacted(&self) -> String {
        self.join(REDACTED_KEY)
    }

    /// Mask every occurrence of the stream key in `text`.
    ///
    /// Used on encoder diagnostics, which echo the output URL on errors.
    pub fn scrub(&self, text: &str) -> String {
        if self.key.is_empty() {
            return text.to_string();
        }
        text.replace(&self.key, REDACTED_KEY)
    }
}

impl fmt::Display for ComposedDestination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}

impl fmt::Debug for ComposedDestination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ComposedDestination")
            .field(&self.redacted())
            .finish()
    }
}

/// Pixels trimmed from the rendered frame before it is scaled back up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropInsets {
    pub top: u32,
    pub bottom: u32,
    pub left: u32,
}

/// Crop rectangle inside the captured frame plus the output size it is
/// scaled back to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropGeometry {
    /// Left edge of the crop.
    pub x: u32,

    /// Top edge of the crop.
    pub y: u32,

    /// Crop width.
    pub width: u32,

    /// Crop height.
    pub height: u32,

    /// Published width (equal to the frame width).
    pub output_width: u32,

    /// Published height (equal to the frame height).
    pub output_height: u32,
}

impl CropGeometry {
    /// Compute the crop for a frame. Returns `None` if the insets leave
    /// nothing to capture.
    pub fn compute(frame_width: u32, frame_height: u32, insets: CropInsets) -> Option<Self> {
        let width = frame_width.checked_sub(insets.left)?;
        let height = frame_height
            .checked_sub(insets.top)?
            .checked_sub(insets.bottom)?;

        if width == 0 || height == 0 {
            return None;
        }

        Some(Self {
            x: insets.left,
            y: insets.top,
            width,
            height,
            output_width: frame_width,
            output_height: frame_height,
        })
    }

    /// Returns true if the crop covers the whole frame.
    pub fn is_identity(&self) -> bool {
        self.x == 0
            && self.y == 0
            && self.width == self.output_width
            && self.height == self.output_height
    }
}

/// Encoder tuning knobs exposed through configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncoderTuning {
    /// Capture frame rate.
    pub framerate: u32,

    /// Capped video bitrate in kbps.
    pub video_bitrate_kbps: u32,

    /// Audio bitrate in kbps.
    pub audio_bitrate_kbps: u32,

    /// Audio resample rate in Hz.
    pub audio_sample_rate: u32,
}

impl Default for EncoderTuning {
    fn default() -> Self {
        Self {
            framerate: 30,
            video_bitrate_kbps: 3000,
            audio_bitrate_kbps: 128,
            audio_sample_rate: 44100,
        }
    }
}

/// Scoped restart backoff and circuit breaker settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestartSettings {
    /// Delay before the first restart inside a window.
    pub base_delay: Duration,

    /// Ceiling for the exponential backoff.
    pub max_delay: Duration,

    /// Failures tolerated inside `window` before escalating. `None` retries forever.
    pub max_failures: Option<u32>,

    /// Sliding window over which failures are counted.
    pub window: Duration,
}

impl Default for RestartSettings {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(60),
            max_failures: Some(10),
            window: Duration::from_secs(600),
        }
    }
}

/// Validated configuration for one process lifetime.
#[derive(Clone)]
pub struct StreamConfig {
    /// Where the encoder pushes the stream.
    pub destination: ComposedDestination,

    /// Page rendered into the display.
    pub source_url: String,

    /// X display identifier, e.g. `:99`.
    pub display_id: String,

    /// Display and output width in pixels.
    pub frame_width: u32,

    /// Display and output height in pixels.
    pub frame_height: u32,

    /// Crop applied before scaling back to the frame size.
    pub crop: CropInsets,

    /// Vertical scroll applied after the page loads.
    pub scroll_offset: u32,

    /// Wait after load before the synthetic click.
    pub media_settle: Duration,

    /// Encoder tuning.
    pub encoder: EncoderTuning,

    /// Scoped restart policy.
    pub restart: RestartSettings,

    /// Explicit browser executable; auto-detected when `None`.
    pub chrome_path: Option<String>,
}

impl StreamConfig {
    /// Crop geometry for this configuration.
    pub fn crop_geometry(&self) -> Option<CropGeometry> {
        CropGeometry::compute(self.frame_width, self.frame_height, self.crop)
    }
}

impl fmt::Debug for StreamConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamConfig")
            .field("destination", &self.destination)
            .field("source_url", &self.source_url)
            .field("display_id", &self.display_id)
            .field("frame", &format_args!("{}x{}", self.frame_width, self.frame_height))
            .field("crop", &self.crop)
            .field("scroll_offset", &self.scroll_offset)
            .field("media_settle", &self.media_settle)
            .field("encoder", &self.encoder)
            .field("restart", &self.restart)
            .field("chrome_path", &self.chrome_path)
            .finish()
    }
}

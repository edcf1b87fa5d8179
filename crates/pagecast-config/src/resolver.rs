//! Turns raw key/value settings into a validated [`StreamConfig`].

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use tracing::{debug, instrument};
use url::Url;

use pagecast_ipc::{
    ComposedDestination, CropGeometry, CropInsets, EncoderTuning, RestartSettings, StreamConfig,
};

use crate::error::ConfigError;
use crate::{ConfigResult, DEFAULT_DISPLAY_ID, DESTINATION_URL, SOURCE_URL, STREAM_KEY};

/// Resolve configuration from the process environment.
pub fn from_env() -> ConfigResult<StreamConfig> {
    // Non-UTF-8 entries cannot hold any setting we read.
    resolve(
        std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?))),
    )
}

/// Resolve configuration from any set of key/value pairs.
///
/// Every missing required setting is reported in a single error.
#[instrument(name = "resolve_config", skip(vars))]
pub fn resolve<I, K, V>(vars: I) -> ConfigResult<StreamConfig>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    let vars = Settings::new(vars);

    let required = [DESTINATION_URL, STREAM_KEY, SOURCE_URL];
    let missing: Vec<&'static str> = required
        .into_iter()
        .filter(|name| vars.get(name).is_none())
        .collect();
    if !missing.is_empty() {
        return Err(ConfigError::Missing(missing));
    }

    let destination_base = vars.required(DESTINATION_URL)?;
    let stream_key = vars.required(STREAM_KEY)?;
    let source_url = vars.required(SOURCE_URL)?;

    check_url(DESTINATION_URL, destination_base)?;
    check_url(SOURCE_URL, source_url)?;

    let frame_width = vars.parse_or("FRAME_WIDTH", 1920u32)?;
    let frame_height = vars.parse_or("FRAME_HEIGHT", 1080u32)?;
    let crop = CropInsets {
        top: vars.parse_or("CROP_TOP", 0)?,
        bottom: vars.parse_or("CROP_BOTTOM", 0)?,
        left: vars.parse_or("CROP_LEFT", 0)?,
    };
    if CropGeometry::compute(frame_width, frame_height, crop).is_none() {
        return Err(ConfigError::Invalid {
            name: "CROP_TOP",
            reason: format!(
                "crop {crop:?} leaves no visible area in a {frame_width}x{frame_height} frame"
            ),
        });
    }

    let defaults = EncoderTuning::default();
    let encoder = EncoderTuning {
        framerate: vars.parse_positive_or("FRAMERATE", defaults.framerate)?,
        video_bitrate_kbps: vars
            .parse_positive_or("VIDEO_BITRATE_KBPS", defaults.video_bitrate_kbps)?,
        audio_bitrate_kbps: vars
            .parse_positive_or("AUDIO_BITRATE_KBPS", defaults.audio_bitrate_kbps)?,
        audio_sample_rate: vars
            .parse_positive_or("AUDIO_SAMPLE_RATE", defaults.audio_sample_rate)?,
    };

    let restart_defaults = RestartSettings::default();
    let max_failures = vars.parse_or(
        "RESTART_MAX_FAILURES",
        restart_defaults.max_failures.unwrap_or(0),
    )?;
    let restart = RestartSettings {
        base_delay: vars.secs_or("RESTART_DELAY_SECS", restart_defaults.base_delay)?,
        max_delay: vars.secs_or("RESTART_MAX_DELAY_SECS", restart_defaults.max_delay)?,
        max_failures: (max_failures > 0).then_some(max_failures),
        window: vars.secs_or("RESTART_WINDOW_SECS", restart_defaults.window)?,
    };
    if restart.max_delay < restart.base_delay {
        return Err(ConfigError::Invalid {
            name: "RESTART_MAX_DELAY_SECS",
            reason: "must not be shorter than RESTART_DELAY_SECS".to_string(),
        });
    }

    let display_id = vars.get("DISPLAY_ID").unwrap_or(DEFAULT_DISPLAY_ID);
    if !display_id.starts_with(':') || display_id[1..].parse::<u32>().is_err() {
        return Err(ConfigError::Invalid {
            name: "DISPLAY_ID",
            reason: format!("expected ':<number>', got '{display_id}'"),
        });
    }

    let config = StreamConfig {
        destination: ComposedDestination::compose(destination_base, stream_key),
        source_url: source_url.to_string(),
        display_id: display_id.to_string(),
        frame_width,
        frame_height,
        crop,
        scroll_offset: vars.parse_or("SCROLL_OFFSET", 0)?,
        media_settle: vars.secs_or("MEDIA_SETTLE_SECS", Duration::from_secs(5))?,
        encoder,
        restart,
        chrome_path: vars.get("CHROME_PATH").map(str::to_string),
    };

    debug!(?config, "Configuration resolved");
    Ok(config)
}

fn check_url(name: &'static str, value: &str) -> ConfigResult<()> {
    Url::parse(value)
        .map(|_| ())
        .map_err(|e| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        })
}

/// Raw settings with empty values treated as absent.
struct Settings(HashMap<String, String>);

impl Settings {
    fn new<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self(
            vars.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    fn get(&self, name: &str) -> Option<&str> {
        self.0
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, name: &'static str) -> ConfigResult<&str> {
        self.get(name).ok_or(ConfigError::Missing(vec![name]))
    }

    fn parse_or<T>(&self, name: &'static str, default: T) -> ConfigResult<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(name) {
            None => Ok(default),
            Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
                name,
                reason: format!("'{raw}': {e}"),
            }),
        }
    }

    fn parse_positive_or(&self, name: &'static str, default: u32) -> ConfigResult<u32> {
        let value = self.parse_or(name, default)?;
        if value == 0 {
            return Err(ConfigError::Invalid {
                name,
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(value)
    }

    fn secs_or(&self, name: &'static str, default: Duration) -> ConfigResult<Duration> {
        self.parse_or(name, default.as_secs())
            .map(Duration::from_secs)
    }
}

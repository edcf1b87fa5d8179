//! ffmpeg command line construction.

use pagecast_ipc::{AudioSinkHandle, ComposedDestination, CropGeometry, DisplayHandle, EncoderTuning};

use crate::{AUDIO_CHANNELS, FFMPEG_BIN, KEYFRAME_INTERVAL_SECS, X264_PRESET};

/// Inputs, geometry and output for one encoder invocation.
#[derive(Debug, Clone)]
pub struct EncoderSpec {
    /// Display to grab.
    pub display: DisplayHandle,

    /// Sink whose monitor source is captured.
    pub audio: AudioSinkHandle,

    /// Crop and scale-back geometry.
    pub crop: CropGeometry,

    /// Rate and bitrate settings.
    pub tuning: EncoderTuning,

    /// Push target.
    pub destination: ComposedDestination,
}

impl EncoderSpec {
    fn video_filter(&self) -> Option<String> {
        if self.crop.is_identity() {
            return None;
        }
        let c = &self.crop;
        Some(format!(
            "crop={}:{}:{}:{},scale={}:{}",
            c.width, c.height, c.x, c.y, c.output_width, c.output_height
        ))
    }
}

/// Arguments for the encoder, including the secret destination.
pub fn ffmpeg_args(spec: &EncoderSpec) -> Vec<String> {
    build_args(spec, spec.destination.expose())
}

/// The full command line with the stream key masked, for logs.
pub fn describe(spec: &EncoderSpec) -> String {
    let mut parts = vec![FFMPEG_BIN.to_string()];
    parts.extend(build_args(spec, spec.destination.redacted()));
    parts.join(" ")
}

fn build_args(spec: &EncoderSpec, destination: String) -> Vec<String> {
    let t = &spec.tuning;
    let gop = t.framerate * KEYFRAME_INTERVAL_SECS;

    let mut args: Vec<String> = vec![
        "-hide_banner".into(),
        "-loglevel".into(),
        "warning".into(),
        "-nostdin".into(),
        // Video: the whole display, no cursor.
        "-thread_queue_size".into(),
        "512".into(),
        "-f".into(),
        "x11grab".into(),
        "-draw_mouse".into(),
        "0".into(),
        "-framerate".into(),
        t.framerate.to_string(),
        "-video_size".into(),
        format!("{}x{}", spec.display.width, spec.display.height),
        "-i".into(),
        spec.display.grab_input(),
        // Audio: the sink's monitor.
        "-thread_queue_size".into(),
        "512".into(),
        "-f".into(),
        "pulse".into(),
        "-i".into(),
        spec.audio.monitor_source(),
    ];

    if let Some(filter) = spec.video_filter() {
        args.extend(["-vf".into(), filter]);
    }

    args.extend([
        "-c:v".into(),
        "libx264".into(),
        "-preset".into(),
        X264_PRESET.into(),
        "-tune".into(),
        "zerolatency".into(),
        "-pix_fmt".into(),
        "yuv420p".into(),
        "-g".into(),
        gop.to_string(),
        "-keyint_min".into(),
        gop.to_string(),
        "-b:v".into(),
        format!("{}k", t.video_bitrate_kbps),
        "-maxrate".into(),
        format!("{}k", t.video_bitrate_kbps),
        "-bufsize".into(),
        format!("{}k", t.video_bitrate_kbps * 2),
        "-c:a".into(),
        "aac".into(),
        "-b:a".into(),
        format!("{}k", t.audio_bitrate_kbps),
        "-ar".into(),
        t.audio_sample_rate.to_string(),
        "-ac".into(),
        AUDIO_CHANNELS.to_string(),
        "-f".into(),
        "flv".into(),
        destination,
    ]);

    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagecast_ipc::CropInsets;

    fn spec(insets: CropInsets) -> EncoderSpec {
        EncoderSpec {
            display: DisplayHandle {
                id: ":99".into(),
                width: 1920,
                height: 1080,
            },
            audio: AudioSinkHandle {
                sink_name: "pagecast".into(),
                healthy: true,
            },
            crop: CropGeometry::compute(1920, 1080, insets).unwrap(),
            tuning: EncoderTuning::default(),
            destination: ComposedDestination::compose("rtmp://x/live", "abc"),
        }
    }

    fn value_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1))
            .map(String::as_str)
    }

    #[test]
    fn test_inputs_and_destination() {
        let args = ffmpeg_args(&spec(CropInsets::default()));
        assert_eq!(value_after(&args, "-video_size"), Some("1920x1080"));
        assert_eq!(value_after(&args, "-draw_mouse"), Some("0"));
        assert!(args.contains(&":99.0+0,0".to_string()));
        assert!(args.contains(&"pagecast.monitor".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("rtmp://x/live/abc"));
        assert_eq!(value_after(&args, "-vf"), None);
    }

    #[test]
    fn test_crop_then_scale_back() {
        let args = ffmpeg_args(&spec(CropInsets {
            top: 100,
            bottom: 50,
            left: 20,
        }));
        assert_eq!(
            value_after(&args, "-vf"),
            Some("crop=1900:930:20:100,scale=1920:1080")
        );
    }

    #[test]
    fn test_low_latency_tuning() {
        let args = ffmpeg_args(&spec(CropInsets::default()));
        assert_eq!(value_after(&args, "-preset"), Some("veryfast"));
        assert_eq!(value_after(&args, "-g"), Some("60"));
        assert_eq!(value_after(&args, "-maxrate"), Some("3000k"));
        assert_eq!(value_after(&args, "-bufsize"), Some("6000k"));
        assert_eq!(value_after(&args, "-ar"), Some("44100"));
        assert!(args.windows(2).any(|w| w[0] == "-f" && w[1] == "flv"));
    }

    #[test]
    fn test_description_is_redacted() {
        let text = describe(&spec(CropInsets::default()));
        assert!(text.starts_with("ffmpeg "));
        assert!(text.ends_with("rtmp://x/live/****"));
        assert!(!text.contains("/abc"));
    }
}

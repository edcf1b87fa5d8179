//! Opaque handles produced during bootstrap.

use serde::{Deserialize, Serialize};

/// Reference to the active virtual display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayHandle {
    /// X display identifier, e.g. `:99`.
    pub id: String,

    /// Width in pixels.
    pub width: u32,

    /// Height in pixels.
    pub height: u32,
}

impl DisplayHandle {
    /// Display number without the leading colon.
    pub fn number(&self) -> &str {
        self.id.trim_start_matches(':')
    }

    /// Input descriptor for x11grab, capturing from the screen origin.
    pub fn grab_input(&self) -> String {
        format!("{}.0+0,0", self.id)
    }
}

/// Reference to the virtual audio sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioSinkHandle {
    /// Sink name as known to the audio daemon.
    pub sink_name: String,

    /// Whether every setup step succeeded. A degraded sink may capture silence.
    pub healthy: bool,
}

impl AudioSinkHandle {
    /// Name of the monitor source mirroring this sink.
    pub fn monitor_source(&self) -> String {
        format!("{}.monitor", self.sink_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_handle_inputs() {
        let display = DisplayHandle {
            id: ":99".into(),
            width: 1920,
            height: 1080,
        };
        assert_eq!(display.number(), "99");
        assert_eq!(display.grab_input(), ":99.0+0,0");
    }

    #[test]
    fn test_monitor_source() {
        let sink = AudioSinkHandle {
            sink_name: "pagecast".into(),
            healthy: true,
        };
        assert_eq!(sink.monitor_source(), "pagecast.monitor");
    }
}

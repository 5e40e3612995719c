//! Stream launch parameters.
//!
//! The values are chosen by the caller (UI or config file); GameLink never
//! derives them.  They are turned into command-line flags for the external
//! streaming client by [`StreamParams::to_cli_args`].

use serde::{Deserialize, Serialize};

/// How the streaming client presents its window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    #[default]
    Fullscreen,
    Windowed,
    Borderless,
}

impl DisplayMode {
    pub fn as_flag_value(self) -> &'static str {
        match self {
            DisplayMode::Fullscreen => "fullscreen",
            DisplayMode::Windowed => "windowed",
            DisplayMode::Borderless => "borderless",
        }
    }
}

/// Video decoder selection passed to the streaming client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VideoDecoder {
    #[default]
    Auto,
    Hardware,
    Software,
}

impl VideoDecoder {
    pub fn as_flag_value(self) -> &'static str {
        match self {
            VideoDecoder::Auto => "auto",
            VideoDecoder::Hardware => "hardware",
            VideoDecoder::Software => "software",
        }
    }
}

/// Effective parameters for one streaming session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamParams {
    /// Name of the host application to launch (e.g. `"Desktop"`).
    #[serde(default = "default_app")]
    pub app: String,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default = "default_bitrate_kbps")]
    pub bitrate_kbps: u32,
    #[serde(default)]
    pub display_mode: DisplayMode,
    /// Play audio on the guest.  `false` leaves audio on the host.
    #[serde(default = "default_true")]
    pub audio: bool,
    #[serde(default)]
    pub decoder: VideoDecoder,
}

fn default_app() -> String {
    "Desktop".to_string()
}
fn default_width() -> u32 {
    1920
}
fn default_height() -> u32 {
    1080
}
fn default_fps() -> u32 {
    60
}
fn default_bitrate_kbps() -> u32 {
    20_000
}
fn default_true() -> bool {
    true
}

impl Default for StreamParams {
    fn default() -> Self {
        Self {
            app: default_app(),
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
            bitrate_kbps: default_bitrate_kbps(),
            display_mode: DisplayMode::default(),
            audio: default_true(),
            decoder: VideoDecoder::default(),
        }
    }
}

impl StreamParams {
    /// Flags appended after `stream <host> <app>` on the client command line.
    pub fn to_cli_args(&self) -> Vec<String> {
        let audio_flag = if self.audio {
            "--no-audio-on-host"
        } else {
            "--audio-on-host"
        };
        vec![
            "--resolution".to_string(),
            format!("{}x{}", self.width, self.height),
            "--fps".to_string(),
            self.fps.to_string(),
            "--bitrate".to_string(),
            self.bitrate_kbps.to_string(),
            "--display-mode".to_string(),
            self.display_mode.as_flag_value().to_string(),
            audio_flag.to_string(),
            "--video-decoder".to_string(),
            self.decoder.as_flag_value().to_string(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_params_produce_expected_flags() {
        let args = StreamParams::default().to_cli_args();
        assert_eq!(
            args,
            vec![
                "--resolution",
                "1920x1080",
                "--fps",
                "60",
                "--bitrate",
                "20000",
                "--display-mode",
                "fullscreen",
                "--no-audio-on-host",
                "--video-decoder",
                "auto",
            ]
        );
    }

    #[test]
    fn test_audio_off_keeps_audio_on_host() {
        let params = StreamParams {
            audio: false,
            decoder: VideoDecoder::Software,
            display_mode: DisplayMode::Windowed,
            ..StreamParams::default()
        };
        let args = params.to_cli_args();
        assert!(args.contains(&"--audio-on-host".to_string()));
        assert!(args.contains(&"software".to_string()));
        assert!(args.contains(&"windowed".to_string()));
    }
}

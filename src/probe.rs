//! Media probing
//!
//! Short ffmpeg runs against the source to learn what the remux needs to do.
//! Everything here is best effort: a probe that times out, fails to spawn or
//! finds nothing yields the permissive default.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;

use crate::config::ProbeConfig;
use crate::upstream::Upstream;

/// Codec names reported by ffmpeg, lowercased; empty when unknown
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodecInfo {
    pub video: String,
    pub audio: String,
}

impl CodecInfo {
    /// Copying video is only safe for H.264
    pub fn needs_video_transcode(&self) -> bool {
        !regex!(r"^(h264|avc1)$").is_match(&self.video)
    }
}

/// Field-order markers in ffmpeg's stream description
pub fn detect_interlace(stderr: &str) -> bool {
    regex!(r"(?i)\b(?:top|bottom) first\)|\b(?:tff|bff)\b").is_match(stderr)
}

pub fn parse_codecs(stderr: &str) -> CodecInfo {
    let capture = |re: &regex::Regex| {
        re.captures(stderr)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_lowercase())
            .unwrap_or_default()
    };
    CodecInfo {
        video: capture(regex!(r"Stream #\d+:\d+.*Video:\s*([a-zA-Z0-9_]+)")),
        audio: capture(regex!(r"Stream #\d+:\d+.*Audio:\s*([a-zA-Z0-9_]+)")),
    }
}

/// Resolve an executable name against PATH, or accept it as a path
pub fn locate_tool(name: &str) -> Option<PathBuf> {
    let candidate = PathBuf::from(name);
    if candidate.components().count() > 1 {
        return candidate.is_file().then_some(candidate);
    }
    std::env::var_os("PATH").and_then(|paths| {
        std::env::split_paths(&paths)
            .map(|dir| dir.join(name))
            .find(|path| path.is_file())
    })
}

pub struct MediaProber {
    ffmpeg: String,
    upstream: Arc<Upstream>,
    config: ProbeConfig,
}

impl MediaProber {
    pub fn new(ffmpeg: impl Into<String>, upstream: Arc<Upstream>, config: ProbeConfig) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            upstream,
            config,
        }
    }

    /// Whether the source video is interlaced
    pub async fn is_interlaced(&self, url: &str) -> bool {
        let args = self.probe_args(url, false, "1500000", "2000000");
        let kill_after = Duration::from_millis(self.config.interlace_kill_ms);
        match self.run(args, kill_after).await {
            Some(stderr) => detect_interlace(&stderr),
            None => false,
        }
    }

    /// Video and audio codec names of the source
    pub async fn codecs(&self, url: &str) -> CodecInfo {
        let args = self.probe_args(url, true, "4000000", "6000000");
        let kill_after = Duration::from_millis(self.config.codec_kill_ms);
        match self.run(args, kill_after).await {
            Some(stderr) => parse_codecs(&stderr),
            None => CodecInfo::default(),
        }
    }

    fn probe_args(
        &self,
        url: &str,
        hide_banner: bool,
        analyzeduration: &str,
        probesize: &str,
    ) -> Vec<String> {
        let mut args = Vec::new();
        if hide_banner {
            args.push("-hide_banner".to_string());
        }
        args.extend(self.upstream.ffmpeg_identity_args());
        args.extend(
            [
                "-analyzeduration",
                analyzeduration,
                "-probesize",
                probesize,
                "-i",
                url,
                "-t",
                "0.3",
                "-f",
                "null",
                "-",
            ]
            .iter()
            .map(|s| s.to_string()),
        );
        args
    }

    /// Run ffmpeg and collect stderr, killing it after `kill_after`.
    /// A killed run yields `None`; partial output is discarded.
    async fn run(&self, args: Vec<String>, kill_after: Duration) -> Option<String> {
        let mut child = match Command::new(&self.ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                tracing::debug!("Probe could not start {}: {}", self.ffmpeg, e);
                return None;
            }
        };

        let mut stderr = child.stderr.take()?;
        let mut output = Vec::new();
        let read = tokio::time::timeout(kill_after, stderr.read_to_end(&mut output)).await;
        let _ = child.start_kill();
        let _ = child.wait().await;

        if read.is_err() {
            tracing::debug!("Probe killed after {:?}", kill_after);
            return None;
        }
        Some(String::from_utf8_lossy(&output).into_owned())
    }
}

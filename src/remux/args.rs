//! ffmpeg command lines for live HLS remuxing

use std::path::Path;

/// What the remux has to do to the video track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VideoPlan {
    pub deinterlace: bool,
    pub transcode: bool,
}

impl VideoPlan {
    pub fn copies_video(&self) -> bool {
        !self.deinterlace && !self.transcode
    }
}

/// Segmenter settings of the HLS output
#[derive(Debug, Clone, Copy)]
pub struct HlsOutput {
    pub segment_secs: u32,
    pub list_size: u32,
}

fn push_all(args: &mut Vec<String>, items: &[&str]) {
    args.extend(items.iter().map(|s| s.to_string()));
}

/// Build the full argument list for one remux attempt of `input`
pub fn remux_args(
    identity: &[String],
    input: &str,
    plan: VideoPlan,
    output: HlsOutput,
    dir: &Path,
) -> Vec<String> {
    let mut args: Vec<String> = identity.to_vec();

    push_all(
        &mut args,
        &[
            "-rw_timeout",
            "30000000",
            "-reconnect",
            "1",
            "-reconnect_streamed",
            "1",
            "-reconnect_on_network_error",
            "1",
            "-reconnect_delay_max",
            "4",
            "-analyzeduration",
            "6000000",
            "-probesize",
            "8000000",
            "-ignore_unknown",
            "-fflags",
            "+igndts+genpts+discardcorrupt+nobuffer",
            "-flags",
            "low_delay",
            "-i",
            input,
            "-sn",
            "-dn",
            "-map",
            "0:v:0",
            "-map",
            "0:a:0?",
            "-c:a",
            "aac",
            "-ac",
            "2",
            "-ar",
            "48000",
            "-b:a",
            "128k",
        ],
    );

    if plan.copies_video() {
        push_all(&mut args, &["-c:v", "copy"]);
    } else {
        if plan.deinterlace {
            push_all(&mut args, &["-vf", "yadif=1:-1:0"]);
        }
        push_all(
            &mut args,
            &[
                "-c:v",
                "libx264",
                "-preset",
                "veryfast",
                "-tune",
                "zerolatency",
                "-crf",
                "23",
                "-g",
                "50",
                "-keyint_min",
                "25",
                "-sc_threshold",
                "0",
            ],
        );
    }

    let segment_secs = output.segment_secs.to_string();
    let list_size = output.list_size.to_string();
    let manifest = dir.join("out.m3u8");
    push_all(
        &mut args,
        &[
            "-copyts",
            "-start_at_zero",
            "-avoid_negative_ts",
            "make_zero",
            "-max_muxing_queue_size",
            "4096",
            "-mpegts_flags",
            "+initial_discontinuity",
            "-muxdelay",
            "0",
            "-muxpreload",
            "0",
            "-f",
            "hls",
            "-hls_time",
            &segment_secs,
            "-hls_list_size",
            &list_size,
            "-hls_flags",
            "delete_segments+append_list+split_by_time+independent_segments",
            "-hls_segment_type",
            "mpegts",
            "-start_number",
            "0",
            "-hls_allow_cache",
            "0",
        ],
    );
    args.push(manifest.to_string_lossy().into_owned());
    args
}

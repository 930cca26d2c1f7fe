//! Audio/video alignment and WAV muxing.
//!
//! The recording's PCM track starts on its own clock. Synchronization trims
//! or pre-pads the chunk list so that audio sample zero coincides with video
//! frame zero, then the whole track muxes into one WAV buffer at mount time.

pub mod wav;

use tracing::warn;

use crate::Timestamp;

/// One PCM chunk: capture timestamp plus interleaved 16-bit samples.
pub type AudioChunk = (Timestamp, Vec<i16>);

/// Align the audio chunks with the first video frame.
///
/// Positive drift trims `round(drift * rate)` frames from the front of the
/// chunk list; negative drift prepends that much silence. Either way the
/// surviving track is rebased onto the video clock, so afterwards the first
/// chunk timestamp sits within one sample period of the video start. A
/// drift beyond one second means the clocks never agreed, so the track is
/// left untouched with a warning.
pub fn sync_audio(
    first_frame_ts: Timestamp,
    chunks: &mut Vec<AudioChunk>,
    sample_rate: u32,
    channels: u32,
) {
    if chunks.is_empty() || sample_rate == 0 || channels == 0 {
        return;
    }

    let drift_ms = (chunks[0].0 - first_frame_ts) as f64 * 1e-6;
    if drift_ms.abs() > 1000.0 {
        warn!("Audio/video drift of {drift_ms:.0} ms is too large, not syncing audio");
        return;
    }

    let ns_per_frame = 1e9 / sample_rate as f64;

    if drift_ms > 0.0 {
        // Trim the lead-in; whole chunks may go
        let frames_to_remove = (drift_ms * sample_rate as f64 / 1000.0).round() as usize;
        let mut samples_to_remove = frames_to_remove * channels as usize;

        while samples_to_remove > 0 && !chunks.is_empty() {
            let front = &mut chunks[0];
            if front.1.len() <= samples_to_remove {
                samples_to_remove -= front.1.len();
                chunks.remove(0);
            } else {
                front.1.drain(..samples_to_remove);
                samples_to_remove = 0;
            }
        }

        // Rebase what survives onto the video clock; the sub-sample
        // remainder of the rounded trim is all that is left of the drift
        let residual_ns =
            (frames_to_remove as f64 * ns_per_frame - drift_ms * 1e6) as Timestamp;
        if let Some(front) = chunks.first_mut() {
            let shift = (first_frame_ts + residual_ns) - front.0;
            for chunk in chunks.iter_mut() {
                chunk.0 += shift;
            }
        }
    } else {
        // Lead in with silence starting exactly at the video start
        let silence_frames = (-drift_ms * sample_rate as f64 / 1000.0).round() as usize;
        let shift_ns = (-drift_ms * 1e6) as Timestamp;

        for chunk in chunks.iter_mut() {
            chunk.0 += shift_ns;
        }
        chunks.insert(
            0,
            (first_frame_ts, vec![0i16; silence_frames * channels as usize]),
        );
    }
}

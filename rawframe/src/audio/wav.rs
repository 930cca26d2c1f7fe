//! RIFF/WAVE writer with a broadcast-style iXML chunk.
//!
//! The iXML payload carries the sequence frame rate as a fraction
//! (MASTER_SPEED / CURRENT_SPEED / TIMECODE_RATE) so NLEs resolve the
//! audio against the image sequence without guessing.

use crate::audio::AudioChunk;

const PROJECT: &str = "RAW Video";
const NOTE: &str = "-";

fn ixml_metadata(fps_num: u32, fps_den: u32) -> String {
    format!(
        concat!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>",
            "<BWFXML>",
            "<IXML_VERSION>1.5</IXML_VERSION>",
            "<PROJECT>{project}</PROJECT>",
            "<NOTE>{note}</NOTE>",
            "<CIRCLED>FALSE</CIRCLED>",
            "<BLACKMAGIC-KEYWORDS></BLACKMAGIC-KEYWORDS>",
            "<TAPE>1</TAPE>",
            "<SCENE>1</SCENE>",
            "<BLACKMAGIC-SHOT>1</BLACKMAGIC-SHOT>",
            "<TAKE>1</TAKE>",
            "<BLACKMAGIC-ANGLE>ms</BLACKMAGIC-ANGLE>",
            "<SPEED>",
            "<MASTER_SPEED>{num}/{den}</MASTER_SPEED>",
            "<CURRENT_SPEED>{num}/{den}</CURRENT_SPEED>",
            "<TIMECODE_RATE>{num}/{den}</TIMECODE_RATE>",
            "<TIMECODE_FLAG>NDF</TIMECODE_FLAG>",
            "</SPEED>",
            "</BWFXML>",
        ),
        project = PROJECT,
        note = NOTE,
        num = fps_num,
        den = fps_den,
    )
}

fn push_chunk(out: &mut Vec<u8>, id: &[u8; 4], payload: &[u8]) {
    out.extend_from_slice(id);
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
    if payload.len() % 2 != 0 {
        out.push(0);
    }
}

/// Mux PCM chunks into a single 16-bit WAV buffer linked to the sequence
/// frame rate. Chunk timestamps are ignored; synchronization happens before
/// muxing.
pub fn write_wav(
    chunks: &[AudioChunk],
    channels: u16,
    sample_rate: u32,
    fps_num: u32,
    fps_den: u32,
) -> Vec<u8> {
    assert!(channels > 0 && sample_rate > 0, "invalid audio format");

    let ixml = ixml_metadata(fps_num, fps_den);

    let mut data = Vec::new();
    for (_, samples) in chunks {
        for s in samples {
            data.extend_from_slice(&s.to_le_bytes());
        }
    }

    // fmt payload: PCM, 16 bits per sample
    let block_align = channels * 2;
    let byte_rate = sample_rate * block_align as u32;
    let mut fmt = Vec::with_capacity(16);
    fmt.extend_from_slice(&1u16.to_le_bytes());
    fmt.extend_from_slice(&channels.to_le_bytes());
    fmt.extend_from_slice(&sample_rate.to_le_bytes());
    fmt.extend_from_slice(&byte_rate.to_le_bytes());
    fmt.extend_from_slice(&block_align.to_le_bytes());
    fmt.extend_from_slice(&16u16.to_le_bytes());

    let mut body = Vec::new();
    body.extend_from_slice(b"WAVE");
    push_chunk(&mut body, b"fmt ", &fmt);
    push_chunk(&mut body, b"iXML", ixml.as_bytes());
    push_chunk(&mut body, b"data", &data);

    let mut out = Vec::with_capacity(body.len() + 8);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(body.len() as u32).to_le_bytes());
    out.extend_from_slice(&body);

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn find_chunk<'a>(wav: &'a [u8], id: &[u8; 4]) -> Option<&'a [u8]> {
        // Skip RIFF header + WAVE id
        let mut offset = 12;
        while offset + 8 <= wav.len() {
            let size =
                u32::from_le_bytes(wav[offset + 4..offset + 8].try_into().unwrap()) as usize;
            if &wav[offset..offset + 4] == id {
                return wav.get(offset + 8..offset + 8 + size);
            }
            offset += 8 + size + size % 2;
        }
        None
    }

    #[test]
    fn test_header_and_sizes() {
        let chunks = vec![(0i64, vec![0i16; 960])];
        let wav = write_wav(&chunks, 2, 48_000, 2997, 100);

        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        let riff_size = u32::from_le_bytes(wav[4..8].try_into().unwrap()) as usize;
        assert_eq!(riff_size + 8, wav.len());
    }

    #[test]
    fn test_fmt_chunk() {
        let chunks = vec![(0i64, vec![0i16; 4])];
        let wav = write_wav(&chunks, 2, 48_000, 30, 1);

        let fmt = find_chunk(&wav, b"fmt ").expect("fmt chunk");
        assert_eq!(fmt.len(), 16);
        assert_eq!(u16::from_le_bytes(fmt[0..2].try_into().unwrap()), 1); // PCM
        assert_eq!(u16::from_le_bytes(fmt[2..4].try_into().unwrap()), 2);
        assert_eq!(u32::from_le_bytes(fmt[4..8].try_into().unwrap()), 48_000);
        assert_eq!(u16::from_le_bytes(fmt[14..16].try_into().unwrap()), 16);
    }

    #[test]
    fn test_data_concatenates_chunks() {
        let chunks = vec![(0i64, vec![1i16, 2, 3]), (1i64, vec![4i16, 5])];
        let wav = write_wav(&chunks, 1, 48_000, 30, 1);

        let data = find_chunk(&wav, b"data").expect("data chunk");
        let samples: Vec<i16> = data
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect();
        assert_eq!(samples, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_ixml_links_frame_rate() {
        let chunks = vec![(0i64, vec![0i16; 2])];
        let wav = write_wav(&chunks, 1, 48_000, 2997, 100);

        let ixml = find_chunk(&wav, b"iXML").expect("iXML chunk");
        let text = std::str::from_utf8(ixml).unwrap();
        assert!(text.contains("<MASTER_SPEED>2997/100</MASTER_SPEED>"));
        assert!(text.contains("<TIMECODE_RATE>2997/100</TIMECODE_RATE>"));
        assert!(text.contains("<PROJECT>RAW Video</PROJECT>"));
    }
}

//! In-memory WAV encode/decode for the wire format.
//!
//! The server protocol carries audio as base64-wrapped RIFF/WAV blobs, so
//! both directions go through `hound` over an in-memory cursor rather than
//! touching the filesystem.

use std::io::Cursor;

use anyhow::{Context, Result};

/// Decoded WAV payload: interleaved 16-bit PCM plus the format it came in.
#[derive(Debug, Clone)]
pub struct DecodedWav {
    pub pcm: Vec<i16>,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Encode interleaved i16 PCM into a complete WAV file in memory.
pub fn encode(pcm: &[i16], sample_rate: u32, channels: u16) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .context("Failed to start WAV writer")?;
        let mut samples = writer.get_i16_writer(pcm.len() as u32);
        for &sample in pcm {
            samples.write_sample(sample);
        }
        samples.flush().context("Failed to write WAV samples")?;
        writer.finalize().context("Failed to finalize WAV header")?;
    }
    Ok(cursor.into_inner())
}

/// Decode a WAV blob into interleaved i16 PCM.
///
/// Only 16-bit integer PCM is accepted; the server protocol never sends
/// anything else.
pub fn decode(bytes: &[u8]) -> Result<DecodedWav> {
    let mut reader =
        hound::WavReader::new(Cursor::new(bytes)).context("Failed to parse WAV header")?;
    let spec = reader.spec();

    anyhow::ensure!(
        spec.sample_format == hound::SampleFormat::Int && spec.bits_per_sample == 16,
        "Unsupported WAV format: {:?} @ {} bits",
        spec.sample_format,
        spec.bits_per_sample,
    );

    let pcm = reader
        .samples::<i16>()
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("Failed to read WAV samples")?;

    Ok(DecodedWav {
        pcm,
        sample_rate: spec.sample_rate,
        channels: spec.channels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_produces_riff_wave_header() {
        let pcm: Vec<i16> = vec![0, 1000, -1000, i16::MAX, i16::MIN];
        let bytes = encode(&pcm, 16000, 1).unwrap();

        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
        // 44-byte canonical header + 2 bytes per sample.
        assert_eq!(bytes.len(), 44 + pcm.len() * 2);
    }

    #[test]
    fn decode_recovers_pcm_and_format() {
        let pcm: Vec<i16> = (0..480).map(|i| (i * 37) as i16).collect();
        let bytes = encode(&pcm, 24000, 2).unwrap();

        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.sample_rate, 24000);
        assert_eq!(decoded.channels, 2);
        assert_eq!(decoded.pcm, pcm);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode(b"not a wav file").is_err());
    }
}

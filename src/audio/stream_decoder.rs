//! Response-audio decoders: server payload bytes → interleaved i16 PCM
//! ready for ALSA playback.

use anyhow::Result;

use super::wav;

/// A decoder that converts one server audio payload into interleaved i16 PCM
/// at the playback device's rate and channel count.
///
/// Implementations handle format parsing, resampling, and channel conversion
/// internally.
pub trait StreamDecoder: Send {
    fn decode(&mut self, data: &[u8]) -> Result<Vec<i16>>;
}

// ======================== WAV decoder ========================

/// Decodes WAV blobs, then adapts them to the playback format.
pub struct WavDecoder {
    target_rate: u32,
    target_channels: u32,
}

impl WavDecoder {
    pub fn new(target_rate: u32, target_channels: u32) -> Self {
        Self {
            target_rate,
            target_channels,
        }
    }
}

impl StreamDecoder for WavDecoder {
    fn decode(&mut self, data: &[u8]) -> Result<Vec<i16>> {
        let decoded = wav::decode(data)?;
        let resampled = resample(
            &decoded.pcm,
            decoded.channels as u32,
            decoded.sample_rate,
            self.target_rate,
        );
        Ok(convert_channels(
            &resampled,
            decoded.channels as u32,
            self.target_channels,
        ))
    }
}

// ======================== Raw PCM decoder ========================

/// Interprets payloads as raw little-endian s16 PCM at a fixed stream format.
pub struct PcmDecoder {
    stream_rate: u32,
    stream_channels: u32,
    target_rate: u32,
    target_channels: u32,
}

impl PcmDecoder {
    pub fn new(
        stream_rate: u32,
        stream_channels: u32,
        target_rate: u32,
        target_channels: u32,
    ) -> Self {
        Self {
            stream_rate,
            stream_channels,
            target_rate,
            target_channels,
        }
    }
}

impl StreamDecoder for PcmDecoder {
    fn decode(&mut self, data: &[u8]) -> Result<Vec<i16>> {
        if data.len() % 2 != 0 {
            log::warn!("PCM payload has odd length {}, dropping last byte", data.len());
        }
        let pcm: Vec<i16> = data
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        let resampled = resample(&pcm, self.stream_channels, self.stream_rate, self.target_rate);
        Ok(convert_channels(
            &resampled,
            self.stream_channels,
            self.target_channels,
        ))
    }
}

// ======================== Format adaptation ========================

/// Linear-interpolation resampler over interleaved PCM.
///
/// Speech payloads tolerate this fine; it keeps the playback path free of a
/// native resampler dependency.
fn resample(pcm: &[i16], channels: u32, from_rate: u32, to_rate: u32) -> Vec<i16> {
    if from_rate == to_rate || pcm.is_empty() || channels == 0 {
        return pcm.to_vec();
    }
    let channels = channels as usize;
    let in_frames = pcm.len() / channels;
    if in_frames == 0 {
        return Vec::new();
    }
    let out_frames =
        ((in_frames as u64 * to_rate as u64) / from_rate as u64).max(1) as usize;
    if out_frames == 1 || in_frames == 1 {
        let mut out = Vec::with_capacity(out_frames * channels);
        for _ in 0..out_frames {
            out.extend_from_slice(&pcm[..channels]);
        }
        return out;
    }
    let step = (in_frames - 1) as f64 / (out_frames - 1) as f64;

    let mut out = Vec::with_capacity(out_frames * channels);
    for i in 0..out_frames {
        let pos = i as f64 * step;
        let idx = pos as usize;
        let frac = pos - idx as f64;
        let next = (idx + 1).min(in_frames - 1);
        for c in 0..channels {
            let a = pcm[idx * channels + c] as f64;
            let b = pcm[next * channels + c] as f64;
            out.push((a + (b - a) * frac).round() as i16);
        }
    }
    out
}

/// Convert interleaved PCM between channel counts: downmix by averaging,
/// upmix by wrapping source channels.
fn convert_channels(pcm: &[i16], from: u32, to: u32) -> Vec<i16> {
    if from == to || from == 0 || to == 0 {
        return pcm.to_vec();
    }
    let from = from as usize;
    let to = to as usize;
    let frames = pcm.len() / from;
    let mut out = vec![0i16; frames * to];

    if to == 1 {
        for i in 0..frames {
            let mut sum: i32 = 0;
            for c in 0..from {
                sum += pcm[i * from + c] as i32;
            }
            out[i] = (sum / from as i32) as i16;
        }
    } else {
        for i in 0..frames {
            for c in 0..to {
                out[i * to + c] = pcm[i * from + (c % from)];
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wav_decoder_passes_matching_format_through() {
        let pcm: Vec<i16> = (0..160).map(|i| (i * 100) as i16).collect();
        let blob = wav::encode(&pcm, 16000, 1).unwrap();

        let mut decoder = WavDecoder::new(16000, 1);
        assert_eq!(decoder.decode(&blob).unwrap(), pcm);
    }

    #[test]
    fn wav_decoder_upmixes_mono_to_stereo() {
        let pcm: Vec<i16> = vec![1, 2, 3];
        let blob = wav::encode(&pcm, 16000, 1).unwrap();

        let mut decoder = WavDecoder::new(16000, 2);
        assert_eq!(decoder.decode(&blob).unwrap(), vec![1, 1, 2, 2, 3, 3]);
    }

    #[test]
    fn pcm_decoder_parses_little_endian() {
        let mut decoder = PcmDecoder::new(16000, 1, 16000, 1);
        let data = [0x00, 0x01, 0xFF, 0x7F]; // 256, 32767
        assert_eq!(decoder.decode(&data).unwrap(), vec![256, 32767]);
    }

    #[test]
    fn resample_preserves_endpoints() {
        let pcm: Vec<i16> = vec![0, 1000];
        let out = resample(&pcm, 1, 16000, 48000);
        assert_eq!(out.first(), Some(&0));
        assert_eq!(out.last(), Some(&1000));
        assert_eq!(out.len(), 6);
    }

    #[test]
    fn stereo_downmix_averages() {
        assert_eq!(convert_channels(&[100, 200, -50, 50], 2, 1), vec![150, 0]);
    }
}

//! The main AudioSystem that manages the capture and playback threads.
//!
//! Uses std::thread (NOT tokio tasks) for real-time audio I/O to avoid
//! contention with async network tasks. The echo processor lives entirely
//! inside the capture thread and is invoked once per ALSA period.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tokio::sync::mpsc;

use anyhow::Result;

use super::alsa_device;
use super::echo::EchoProcessor;
use super::stream_decoder::{PcmDecoder, StreamDecoder, WavDecoder};

/// Audio system configuration.
#[derive(Debug, Clone)]
pub struct AudioConfig {
    /// ALSA capture device name (e.g. "default", "plughw:0,0")
    pub capture_device: String,
    /// ALSA playback device name
    pub playback_device: String,
    /// Desired ALSA sample rate for capture (may be negotiated by hardware)
    pub sample_rate: u32,
    /// Desired ALSA channel count for capture
    pub channels: u32,
    /// Duration of one outbound PCM chunk in ms (e.g. 250)
    pub chunk_duration_ms: u32,
    /// Capture effect name: "echo" or "passthrough"
    pub effect: String,
    /// Echo delay line capacity in samples
    pub echo_buffer_size: usize,
    /// Echo feedback gain (0.0 - 1.0)
    pub echo_feedback: f32,
    /// Format of server response audio: "wav" or "pcm"
    pub response_format: String,
    /// Desired ALSA playback sample rate
    pub playback_sample_rate: u32,
    /// Desired ALSA playback channel count
    pub playback_channels: u32,
    /// Desired ALSA playback period size (0 = let ALSA decide)
    pub playback_period_size: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            capture_device: "default".to_string(),
            playback_device: "default".to_string(),
            sample_rate: 16000,
            channels: 1,
            chunk_duration_ms: 250,
            effect: "echo".to_string(),
            echo_buffer_size: super::echo::DEFAULT_BUFFER_SIZE,
            echo_feedback: super::echo::DEFAULT_FEEDBACK,
            response_format: "wav".to_string(),
            playback_sample_rate: 24000,
            playback_channels: 1,
            playback_period_size: 1024,
        }
    }
}

/// Events emitted by the capture thread.
#[derive(Debug)]
pub enum CaptureEvent {
    /// Sent once after the device is open, with the negotiated format.
    Started { sample_rate: u32, channels: u32 },
    /// One chunk of processed interleaved i16 PCM.
    Chunk(Vec<i16>),
}

/// The audio system manages capture and playback in dedicated OS threads.
///
/// - Capture thread: ALSA capture → echo effect → chunking → `capture_tx`
/// - Playback thread: `play_rx` → response decode → ALSA playback
pub struct AudioSystem {
    running: Arc<AtomicBool>,
    capture_handle: Option<JoinHandle<()>>,
    play_handle: Option<JoinHandle<()>>,
}

impl AudioSystem {
    /// Start the audio system.
    ///
    /// * `config`     - Audio configuration
    /// * `capture_tx` - Sender for processed PCM chunks from capture
    /// * `play_rx`    - Receiver for server audio payloads to decode and play
    pub fn start(
        config: AudioConfig,
        capture_tx: mpsc::Sender<CaptureEvent>,
        play_rx: mpsc::Receiver<Vec<u8>>,
    ) -> Result<Self> {
        let running = Arc::new(AtomicBool::new(true));

        log::info!(
            "AudioSystem starting — capture: \"{}\", playback: \"{}\", rate: {}Hz, ch: {}, effect: {} (buffer {}, feedback {})",
            config.capture_device,
            config.playback_device,
            config.sample_rate,
            config.channels,
            config.effect,
            config.echo_buffer_size,
            config.echo_feedback,
        );

        let capture_handle = {
            let running = running.clone();
            let config = config.clone();
            thread::Builder::new()
                .name("audio-capture".into())
                .spawn(move || {
                    if let Err(e) = capture_thread(&config, capture_tx, &running) {
                        log::error!("Capture thread error: {}", e);
                    }
                })?
        };

        let play_handle = {
            let running = running.clone();
            let config = config.clone();
            thread::Builder::new()
                .name("audio-play".into())
                .spawn(move || {
                    // Small delay to let the capture device initialize first
                    thread::sleep(std::time::Duration::from_secs(1));
                    if let Err(e) = play_thread(&config, play_rx, &running) {
                        log::error!("Playback thread error: {}", e);
                    }
                })?
        };

        Ok(Self {
            running,
            capture_handle: Some(capture_handle),
            play_handle: Some(play_handle),
        })
    }

    /// Signal threads to stop and wait for the capture thread to finish.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(h) = self.capture_handle.take() {
            let _ = h.join();
        }
        // Playback thread exits when the payload sender is dropped; detach it
        // here to avoid blocking on an in-flight write.
        self.play_handle.take();
    }
}

impl Drop for AudioSystem {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Instantiate the capture effect by its configured name.
///
/// The effect sits between the capture device and the outbound chunker; an
/// unknown name is a configuration error.
fn create_effect(config: &AudioConfig, channels: usize) -> Result<EchoProcessor> {
    match config.effect.as_str() {
        "echo" => Ok(EchoProcessor::new(
            channels,
            config.echo_buffer_size,
            config.echo_feedback,
        )),
        "passthrough" => Ok(EchoProcessor::passthrough(channels, config.echo_buffer_size)),
        other => anyhow::bail!("Unsupported capture effect: {}", other),
    }
}

// ======================== Capture thread ========================

fn capture_thread(
    config: &AudioConfig,
    capture_tx: mpsc::Sender<CaptureEvent>,
    running: &AtomicBool,
) -> Result<()> {
    // 1. Open ALSA capture device
    let (pcm, params) =
        alsa_device::open_capture(&config.capture_device, config.sample_rate, config.channels)?;

    let actual_rate = params.sample_rate;
    let actual_channels = params.channels as usize;
    let period_size = params.period_size;

    // Tell the session loop what format the chunks will be in.
    if capture_tx
        .blocking_send(CaptureEvent::Started {
            sample_rate: actual_rate,
            channels: params.channels,
        })
        .is_err()
    {
        return Ok(());
    }

    // 2. Build the capture effect (one delay line per channel)
    let mut effect = create_effect(config, actual_channels)?;
    log::debug!(
        "Capture effect ready: {} channels, {} sample delay, feedback {}",
        effect.channels(),
        effect.capacity(),
        effect.feedback(),
    );

    // Per-channel f32 scratch buffers, one input and one output frame each
    let mut in_frames: Vec<Vec<f32>> =
        (0..actual_channels).map(|_| vec![0.0f32; period_size]).collect();
    let mut out_frames: Vec<Vec<f32>> =
        (0..actual_channels).map(|_| vec![0.0f32; period_size]).collect();

    // 3. Chunking: fixed-duration chunks of interleaved samples
    let chunk_frames = (actual_rate * config.chunk_duration_ms / 1000) as usize;
    let chunk_samples = chunk_frames.max(1) * actual_channels;
    let mut accum_buf: Vec<i16> = Vec::with_capacity(chunk_samples * 2);

    // ALSA read buffer (interleaved i16, one period)
    let mut read_buf = vec![0i16; period_size * actual_channels];

    let io = pcm.io_i16()?;

    log::info!(
        "Capture started: rate={}, ch={}, period={}, chunk_frames={}",
        actual_rate,
        actual_channels,
        period_size,
        chunk_frames,
    );

    while running.load(Ordering::Relaxed) {
        // Read one period from ALSA
        match io.readi(&mut read_buf) {
            Ok(frames) => {
                // Split interleaved i16 → per-channel f32
                for i in 0..frames {
                    for ch in 0..actual_channels {
                        in_frames[ch][i] =
                            read_buf[i * actual_channels + ch] as f32 / 32768.0;
                    }
                }

                // Run the effect, one frame per channel
                {
                    let inputs: Vec<&[f32]> =
                        in_frames.iter().map(|b| &b[..frames]).collect();
                    let mut outputs: Vec<&mut [f32]> =
                        out_frames.iter_mut().map(|b| &mut b[..frames]).collect();
                    effect.process(&inputs, &mut outputs);
                }

                // Merge per-channel f32 → interleaved i16, clamping the
                // feedback-boosted mix back into sample range
                for i in 0..frames {
                    for ch in 0..actual_channels {
                        let s = out_frames[ch][i].clamp(-1.0, 1.0);
                        read_buf[i * actual_channels + ch] = (s * 32767.0) as i16;
                    }
                }

                // Accumulate processed PCM and ship complete chunks
                accum_buf.extend_from_slice(&read_buf[..frames * actual_channels]);
                while accum_buf.len() >= chunk_samples {
                    let chunk = accum_buf[..chunk_samples].to_vec();
                    if capture_tx.blocking_send(CaptureEvent::Chunk(chunk)).is_err() {
                        log::warn!("Failed to send capture chunk, receiver dropped");
                        return Ok(());
                    }
                    accum_buf.drain(..chunk_samples);
                }
            }
            Err(e) => {
                log::warn!("ALSA capture error: {}, recovering...", e);
                if let Err(e2) = pcm.prepare() {
                    log::error!("Failed to recover PCM capture: {}", e2);
                    break;
                }
            }
        }
    }

    log::info!("Capture stopped");
    Ok(())
}

// ======================== Playback thread ========================

/// Factory function: create a decoder based on the configured response format.
fn create_decoder(
    config: &AudioConfig,
    alsa_rate: u32,
    alsa_channels: u32,
) -> Result<Box<dyn StreamDecoder>> {
    match config.response_format.as_str() {
        "wav" => Ok(Box::new(WavDecoder::new(alsa_rate, alsa_channels))),
        "pcm" => Ok(Box::new(PcmDecoder::new(
            config.playback_sample_rate,
            config.playback_channels,
            alsa_rate,
            alsa_channels,
        ))),
        other => anyhow::bail!("Unsupported response format: {}", other),
    }
}

fn play_thread(
    config: &AudioConfig,
    mut play_rx: mpsc::Receiver<Vec<u8>>,
    running: &AtomicBool,
) -> Result<()> {
    // 1. Open ALSA playback device
    let period_size_opt = if config.playback_period_size > 0 {
        Some(config.playback_period_size)
    } else {
        None
    };
    let (pcm, params) = alsa_device::open_playback(
        &config.playback_device,
        config.playback_sample_rate,
        config.playback_channels,
        period_size_opt,
    )?;

    let actual_rate = params.sample_rate;
    let actual_channels = params.channels;

    // 2. Initialize decoder via factory
    let mut decoder = create_decoder(config, actual_rate, actual_channels)?;

    let io = pcm.io_i16()?;

    log::info!(
        "Playback started: response_format={}, rate={}, ch={}",
        config.response_format,
        actual_rate,
        actual_channels,
    );

    while running.load(Ordering::Relaxed) {
        // Block until we receive an audio payload (or channel closes)
        match play_rx.blocking_recv() {
            Some(payload) => match decoder.decode(&payload) {
                Ok(pcm_data) => {
                    if pcm_data.is_empty() {
                        continue;
                    }
                    // Write decoded PCM to ALSA with a retry loop to handle
                    // short writes and XRUN recovery without losing frames.
                    let total_frames = pcm_data.len() / actual_channels as usize;
                    let mut frames_written = 0;
                    while frames_written < total_frames {
                        let offset = frames_written * actual_channels as usize;
                        match io.writei(&pcm_data[offset..]) {
                            Ok(n) => {
                                frames_written += n;
                            }
                            Err(e) => {
                                log::warn!("ALSA playback error: {}, recovering...", e);
                                if let Err(e2) = pcm.prepare() {
                                    log::error!("Failed to recover PCM playback: {}", e2);
                                    break;
                                }
                            }
                        }
                    }
                }
                Err(e) => {
                    log::error!("Response audio decode error: {}", e);
                }
            },
            None => {
                log::info!("Playback channel closed");
                break;
            }
        }
    }

    log::info!("Playback stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effect_factory_accepts_known_names() {
        let mut config = AudioConfig::default();
        assert_eq!(create_effect(&config, 2).unwrap().channels(), 2);

        config.effect = "passthrough".to_string();
        assert_eq!(create_effect(&config, 1).unwrap().feedback(), 0.0);

        config.effect = "reverb".to_string();
        assert!(create_effect(&config, 1).is_err());
    }

    #[test]
    fn decoder_factory_rejects_unknown_format() {
        let mut config = AudioConfig::default();
        assert!(create_decoder(&config, 24000, 1).is_ok());
        config.response_format = "mp3".to_string();
        assert!(create_decoder(&config, 24000, 1).is_err());
    }
}

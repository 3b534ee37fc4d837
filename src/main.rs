mod audio;
mod config;
mod net_link;
mod protocol;
mod session;
mod uploader;

use audio::{AudioConfig, AudioSystem, CaptureEvent};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use config::Config;
use mac_address::get_mac_address;
use net_link::{NetCommand, NetEvent, NetLink};
use protocol::{ServerMessage, UploadResponse};
use session::{Session, SessionState};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::mpsc;
use tokio::time::Instant;
use uuid::Uuid;

const CLIENT_ID_FILE: &str = "voicechat_client_id.txt";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let mut config = Config::new().unwrap_or_default();

    // Device id defaults to the MAC address so the server can tell clients apart.
    if config.device_id == "unknown-device" {
        config.device_id = match get_mac_address() {
            Ok(Some(mac)) => mac.to_string().to_lowercase(),
            _ => Uuid::new_v4().to_string(),
        };
    }

    // Client id persists across restarts via a local file.
    if config.client_id == "unknown-client" {
        if let Ok(content) = std::fs::read_to_string(CLIENT_ID_FILE) {
            let trimmed = content.trim();
            if !trimmed.is_empty() {
                config.client_id = trimmed.to_string();
            }
        }
    }
    if config.client_id == "unknown-client" {
        config.client_id = Uuid::new_v4().to_string();
        if let Err(e) = std::fs::write(CLIENT_ID_FILE, &config.client_id) {
            log::warn!("Failed to save client id to {}: {}", CLIENT_ID_FILE, e);
        }
    }
    log::info!(
        "Client identity: device_id={}, client_id={}",
        config.device_id,
        config.client_id
    );

    let stream_mode = config.mode == "stream";

    // Channels between the session loop, the network link, and the audio threads
    let (tx_net_event, mut rx_net_event) = mpsc::channel::<NetEvent>(100);
    let (tx_net_cmd, rx_net_cmd) = mpsc::channel::<NetCommand>(100);
    let (tx_capture, mut rx_capture) = mpsc::channel::<CaptureEvent>(100);
    let (tx_play, rx_play) = mpsc::channel::<Vec<u8>>(100);
    // Record-mode uploads run as spawned tasks and report back here, so the
    // loop keeps servicing capture chunks and Ctrl+C during the round trip.
    let (tx_upload, mut rx_upload) = mpsc::channel::<anyhow::Result<UploadResponse>>(4);

    // Stream mode talks to the server over a persistent WebSocket; record
    // mode uploads per utterance over HTTP and never opens the socket.
    if stream_mode {
        let net_link = NetLink::new(config.clone(), tx_net_event.clone(), rx_net_cmd);
        tokio::spawn(async move {
            net_link.run().await;
        });
    }

    let audio_config = AudioConfig {
        capture_device: config.capture_device.to_string(),
        playback_device: config.playback_device.to_string(),
        sample_rate: config.sample_rate,
        channels: config.channels,
        chunk_duration_ms: config.chunk_duration_ms,
        effect: config.effect.to_string(),
        echo_buffer_size: config.echo_buffer_size,
        echo_feedback: config.echo_feedback,
        response_format: config.response_format.to_string(),
        playback_sample_rate: config.playback_sample_rate,
        playback_channels: config.playback_channels,
        playback_period_size: config.playback_period_size,
    };
    let mut audio_system = AudioSystem::start(audio_config, tx_capture, rx_play)?;

    // Enter toggles the mic, mirroring the record button of the web widget.
    let mut stdin_lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    let mut session = Session::new();
    // Rough end-of-playback estimate; the mic stays muted until then.
    let mut speaking_until: Option<Instant> = None;

    println!(
        "Voicechat client started ({} mode). Press Enter to start/stop talking, Ctrl+C to quit.",
        config.mode
    );

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                println!("Received Ctrl+C, shutting down...");
                break;
            }

            // Events from the WebSocket link (stream mode only)
            Some(event) = rx_net_event.recv() => {
                match event {
                    NetEvent::Text(text) => {
                        match serde_json::from_str::<ServerMessage>(&text) {
                            Ok(msg) => handle_server_message(
                                msg,
                                &mut session,
                                &tx_play,
                                &mut speaking_until,
                                &config,
                            ).await,
                            Err(e) => log::warn!("Unparseable server message: {} ({})", text, e),
                        }
                    }
                    NetEvent::Connected => {
                        log::info!("WebSocket connected");
                        if session.state == SessionState::NetworkError {
                            session.state = SessionState::Idle;
                        }
                    }
                    NetEvent::Disconnected => {
                        log::warn!("WebSocket disconnected");
                        session.state = SessionState::NetworkError;
                    }
                }
            }

            // Processed audio from the capture thread
            Some(event) = rx_capture.recv() => {
                match event {
                    CaptureEvent::Started { sample_rate, channels } => {
                        log::info!("Capture format: {} Hz, {} ch", sample_rate, channels);
                        session.capture_rate = sample_rate;
                        session.capture_channels = channels;
                    }
                    CaptureEvent::Chunk(pcm) => {
                        // Mic is gated off unless we are listening; this also
                        // drops chunks while the response is playing so the
                        // speaker output does not feed back into the mic.
                        if session.state != SessionState::Listening {
                            continue;
                        }
                        if stream_mode {
                            if let Err(e) = send_stream_chunk(&pcm, &session, &tx_net_cmd).await {
                                log::warn!("Failed to stream chunk: {}", e);
                            }
                        } else if session.is_recording() {
                            session.push_chunk(&pcm);
                        }
                    }
                }
            }

            // Enter toggles listening on and off. The branch is disabled once
            // stdin hits EOF; a finished stream would otherwise complete on
            // every iteration and spin the loop.
            line = stdin_lines.next_line(), if stdin_open => {
                if poll_stdin(line, &mut stdin_open).is_some() {
                    toggle_mic(&mut session, stream_mode, &config, &tx_upload).await;
                }
            }

            // A record-mode upload finished
            Some(result) = rx_upload.recv() => {
                handle_upload_result(result, &mut session, &tx_play, &mut speaking_until, &config).await;
            }

            // Estimated end of response playback: reopen the mic
            _ = tokio::time::sleep_until(speaking_until.unwrap_or_else(Instant::now)),
                if speaking_until.is_some() =>
            {
                speaking_until = None;
                if session.state == SessionState::Speaking {
                    session.state = SessionState::Idle;
                    println!("Ready. Press Enter to talk.");
                }
            }
        }
    }

    audio_system.stop();
    Ok(())
}

/// Unpack one stdin poll result. Returns the line to act on; clears
/// `stdin_open` at EOF so the caller stops polling a finished stream.
fn poll_stdin(line: std::io::Result<Option<String>>, stdin_open: &mut bool) -> Option<String> {
    match line {
        Ok(Some(l)) => Some(l),
        Ok(None) => {
            log::info!("stdin closed, mic toggling disabled");
            *stdin_open = false;
            None
        }
        Err(e) => {
            log::warn!("stdin error: {}", e);
            None
        }
    }
}

/// Handle one parsed server event.
async fn handle_server_message(
    msg: ServerMessage,
    session: &mut Session,
    tx_play: &mpsc::Sender<Vec<u8>>,
    speaking_until: &mut Option<Instant>,
    config: &Config,
) {
    match msg.msg_type.as_str() {
        "stream-response" => {
            if let Some(transcript) = &msg.transcript {
                println!("You said: {}", transcript);
            }
            if let Some(text) = &msg.text {
                println!("Assistant: {}", text);
            }
            if let Some(audio_b64) = &msg.audio_base64 {
                queue_response_audio(audio_b64, session, tx_play, speaking_until, config).await;
            } else if session.state == SessionState::Processing {
                session.state = SessionState::Idle;
            }
        }
        "stream-error" => {
            log::error!(
                "Server error: {}",
                msg.error.as_deref().unwrap_or("unknown")
            );
            if session.state == SessionState::Processing {
                session.state = SessionState::Idle;
            }
        }
        "hello" => {
            log::debug!("Server hello acknowledged (session {:?})", msg.session_id);
        }
        other => {
            log::debug!("Unhandled message type: {}", other);
        }
    }
}

/// Decode the base64 response audio and hand it to the playback thread.
async fn queue_response_audio(
    audio_b64: &str,
    session: &mut Session,
    tx_play: &mpsc::Sender<Vec<u8>>,
    speaking_until: &mut Option<Instant>,
    config: &Config,
) {
    let payload = match BASE64.decode(audio_b64) {
        Ok(bytes) => bytes,
        Err(e) => {
            log::error!("Invalid base64 response audio: {}", e);
            return;
        }
    };

    let secs = estimate_playback_secs(&payload, config);
    *speaking_until = Some(Instant::now() + std::time::Duration::from_secs_f64(secs + 0.25));

    log::info!("Playing response audio: {} bytes (~{:.1}s)", payload.len(), secs);
    session.state = SessionState::Speaking;

    if tx_play.send(payload).await.is_err() {
        log::error!("Playback channel closed");
        session.state = SessionState::Idle;
        *speaking_until = None;
    }
}

/// Estimated playback time of a response payload, used for mic gating.
///
/// WAV payloads declare their own rate and channel count in the header, so
/// the estimate comes from there; raw PCM (and unparseable payloads) fall
/// back to a size estimate at the configured playback format.
fn estimate_playback_secs(payload: &[u8], config: &Config) -> f64 {
    if config.response_format == "wav" {
        if let Ok(decoded) = audio::wav::decode(payload) {
            let frames = decoded.pcm.len() / decoded.channels.max(1) as usize;
            return frames as f64 / decoded.sample_rate.max(1) as f64;
        }
    }
    let samples = payload.len() / 2;
    samples as f64
        / (config.playback_sample_rate as f64 * config.playback_channels.max(1) as f64)
}

/// WAV-wrap one capture chunk, base64 it, and send it down the socket.
async fn send_stream_chunk(
    pcm: &[i16],
    session: &Session,
    tx_net_cmd: &mpsc::Sender<NetCommand>,
) -> anyhow::Result<()> {
    if !session.capture_ready() {
        anyhow::bail!("capture format not yet known");
    }
    let wav = audio::wav::encode(pcm, session.capture_rate, session.capture_channels as u16)?;
    let event = protocol::StreamAudioEvent::new(BASE64.encode(&wav));
    let json = serde_json::to_string(&event)?;
    tx_net_cmd.send(NetCommand::SendText(json)).await?;
    Ok(())
}

/// Act on one finished record-mode upload.
async fn handle_upload_result(
    result: anyhow::Result<UploadResponse>,
    session: &mut Session,
    tx_play: &mpsc::Sender<Vec<u8>>,
    speaking_until: &mut Option<Instant>,
    config: &Config,
) {
    match result {
        Ok(response) => {
            if let Some(transcript) = &response.transcript {
                println!("You said: {}", transcript);
            }
            if let Some(text) = &response.text {
                println!("Assistant: {}", text);
            }
            if let Some(audio_b64) = &response.audio_base64 {
                queue_response_audio(audio_b64, session, tx_play, speaking_until, config).await;
            } else if session.state == SessionState::Processing {
                session.state = SessionState::Idle;
            }
        }
        Err(e) => {
            log::error!("Upload failed: {}", e);
            if session.state == SessionState::Processing {
                session.state = SessionState::Idle;
            }
        }
    }
}

/// Enter pressed: flip between idle and listening. In record mode, stopping
/// also hands the utterance to a spawned upload task.
async fn toggle_mic(
    session: &mut Session,
    stream_mode: bool,
    config: &Config,
    tx_upload: &mpsc::Sender<anyhow::Result<UploadResponse>>,
) {
    match session.state {
        SessionState::Idle => {
            if !session.capture_ready() {
                println!("Microphone not ready yet.");
                return;
            }
            if !stream_mode {
                session.start_recording();
            }
            session.state = SessionState::Listening;
            println!("Listening... press Enter to stop.");
        }
        SessionState::Listening => {
            if stream_mode {
                session.state = SessionState::Idle;
                println!("Stopped. Press Enter to talk.");
                return;
            }

            // Record mode: wrap up the utterance and upload it off-loop so
            // capture chunks and signals keep flowing during the round trip.
            session.state = SessionState::Processing;
            let pcm = session.finish_recording();
            if pcm.is_empty() {
                log::warn!("Empty utterance, nothing to upload");
                session.state = SessionState::Idle;
                return;
            }
            println!("Uploading...");
            let result = audio::wav::encode(
                &pcm,
                session.capture_rate,
                session.capture_channels as u16,
            );
            let wav = match result {
                Ok(wav) => wav,
                Err(e) => {
                    log::error!("WAV encode failed: {}", e);
                    session.state = SessionState::Idle;
                    return;
                }
            };
            let config = config.clone();
            let tx_upload = tx_upload.clone();
            tokio::spawn(async move {
                let result = uploader::upload_utterance(&config, &wav).await;
                let _ = tx_upload.send(result).await;
            });
        }
        SessionState::Processing | SessionState::Speaking => {
            println!("Busy with the current response, hold on...");
        }
        SessionState::NetworkError => {
            println!("Not connected, waiting for the server...");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(response_format: &'static str) -> Config {
        Config {
            capture_device: "default",
            playback_device: "default",
            sample_rate: 16000,
            channels: 1,
            chunk_duration_ms: 250,
            playback_sample_rate: 24000,
            playback_channels: 1,
            playback_period_size: 1024,
            response_format,
            effect: "echo",
            echo_buffer_size: 2048,
            echo_feedback: 0.5,
            mode: "record",
            ws_url: "ws://127.0.0.1:5000/stream",
            http_url: "http://127.0.0.1:5000/upload",
            token: "test-token",
            device_id: "test-device".to_string(),
            client_id: "test-client".to_string(),
        }
    }

    #[test]
    fn stdin_eof_disables_polling() {
        let mut stdin_open = true;

        assert_eq!(
            poll_stdin(Ok(Some(String::new())), &mut stdin_open),
            Some(String::new())
        );
        assert!(stdin_open);

        // EOF must flip the flag so the select branch stops firing.
        assert_eq!(poll_stdin(Ok(None), &mut stdin_open), None);
        assert!(!stdin_open);
    }

    #[test]
    fn stdin_error_keeps_polling() {
        let mut stdin_open = true;
        let err = std::io::Error::new(std::io::ErrorKind::Other, "transient");
        assert_eq!(poll_stdin(Err(err), &mut stdin_open), None);
        assert!(stdin_open);
    }

    #[test]
    fn playback_estimate_uses_wav_header_rate() {
        // Half a second at 8 kHz mono. The configured playback rate (24 kHz)
        // must not leak into the estimate for a self-describing payload.
        let config = test_config("wav");
        let pcm = vec![0i16; 4000];
        let wav = audio::wav::encode(&pcm, 8000, 1).unwrap();
        let secs = estimate_playback_secs(&wav, &config);
        assert!((secs - 0.5).abs() < 1e-6);
    }

    #[test]
    fn playback_estimate_falls_back_to_configured_format() {
        let config = test_config("pcm");
        // 24000 s16le samples at the configured 24 kHz mono: one second.
        let payload = vec![0u8; 48000];
        let secs = estimate_playback_secs(&payload, &config);
        assert!((secs - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn upload_error_returns_session_to_idle() {
        let config = test_config("wav");
        let mut session = Session::new();
        session.state = SessionState::Processing;
        let (tx_play, _rx_play) = mpsc::channel::<Vec<u8>>(4);
        let mut speaking_until = None;

        handle_upload_result(
            Err(anyhow::anyhow!("connection refused")),
            &mut session,
            &tx_play,
            &mut speaking_until,
            &config,
        )
        .await;

        assert_eq!(session.state, SessionState::Idle);
        assert!(speaking_until.is_none());
    }

    #[tokio::test]
    async fn upload_response_without_audio_returns_to_idle() {
        let config = test_config("wav");
        let mut session = Session::new();
        session.state = SessionState::Processing;
        let (tx_play, _rx_play) = mpsc::channel::<Vec<u8>>(4);
        let mut speaking_until = None;

        let response = UploadResponse {
            transcript: Some("hello".to_string()),
            text: Some("hi there".to_string()),
            audio_base64: None,
        };
        handle_upload_result(
            Ok(response),
            &mut session,
            &tx_play,
            &mut speaking_until,
            &config,
        )
        .await;

        assert_eq!(session.state, SessionState::Idle);
        assert!(speaking_until.is_none());
    }

    #[tokio::test]
    async fn upload_response_audio_reaches_playback() {
        let config = test_config("wav");
        let mut session = Session::new();
        session.state = SessionState::Processing;
        let (tx_play, mut rx_play) = mpsc::channel::<Vec<u8>>(4);
        let mut speaking_until = None;

        let pcm = vec![0i16; 800];
        let wav = audio::wav::encode(&pcm, 8000, 1).unwrap();
        let response = UploadResponse {
            transcript: None,
            text: None,
            audio_base64: Some(BASE64.encode(&wav)),
        };
        handle_upload_result(
            Ok(response),
            &mut session,
            &tx_play,
            &mut speaking_until,
            &config,
        )
        .await;

        assert_eq!(session.state, SessionState::Speaking);
        assert!(speaking_until.is_some());
        assert_eq!(rx_play.recv().await.unwrap(), wav);
    }
}

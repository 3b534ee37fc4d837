use std::fs;
use std::path::Path;

use serde::Deserialize;

#[derive(Deserialize)]
struct Config {
    application: Application,
    audio: Audio,
    echo: Echo,
    network: Network,
}

#[derive(Deserialize)]
struct Application {
    name: String,
    version: String,
}

#[derive(Deserialize)]
struct Audio {
    capture_device: String,
    playback_device: String,
    sample_rate: u32,
    channels: u32,
    chunk_duration_ms: u32,
    playback_sample_rate: u32,
    playback_channels: u32,
    playback_period_size: usize,
    response_format: String,
}

#[derive(Deserialize)]
struct Echo {
    effect: String,
    buffer_size: usize,
    feedback: f32,
}

#[derive(Deserialize)]
struct Network {
    mode: String,
    ws_url: String,
    http_url: String,
    token: String,
    device_id: String,
    client_id: String,
}

// Read config.toml at compile time and bake it in as environment variables.
fn main() {
    println!("cargo:rerun-if-changed=config.toml");

    let config_path = Path::new("config.toml");
    if !config_path.exists() {
        panic!("config.toml not found!");
    }

    let config_str = fs::read_to_string(config_path).expect("Failed to read config.toml");
    let config: Config = toml::from_str(&config_str).expect("Failed to parse config.toml");

    // Application info
    println!("cargo:rustc-env=APP_NAME={}", config.application.name);
    println!("cargo:rustc-env=APP_VERSION={}", config.application.version);

    // Audio pipeline
    println!("cargo:rustc-env=CAPTURE_DEVICE={}", config.audio.capture_device);
    println!("cargo:rustc-env=PLAYBACK_DEVICE={}", config.audio.playback_device);
    println!("cargo:rustc-env=SAMPLE_RATE={}", config.audio.sample_rate);
    println!("cargo:rustc-env=CHANNELS={}", config.audio.channels);
    println!("cargo:rustc-env=CHUNK_DURATION_MS={}", config.audio.chunk_duration_ms);
    println!(
        "cargo:rustc-env=PLAYBACK_SAMPLE_RATE={}",
        config.audio.playback_sample_rate
    );
    println!("cargo:rustc-env=PLAYBACK_CHANNELS={}", config.audio.playback_channels);
    println!(
        "cargo:rustc-env=PLAYBACK_PERIOD_SIZE={}",
        config.audio.playback_period_size
    );
    println!("cargo:rustc-env=RESPONSE_FORMAT={}", config.audio.response_format);

    // Echo effect
    println!("cargo:rustc-env=EFFECT={}", config.echo.effect);
    println!("cargo:rustc-env=ECHO_BUFFER_SIZE={}", config.echo.buffer_size);
    println!("cargo:rustc-env=ECHO_FEEDBACK={}", config.echo.feedback);

    // Network
    println!("cargo:rustc-env=MODE={}", config.network.mode);
    println!("cargo:rustc-env=WS_URL={}", config.network.ws_url);
    println!("cargo:rustc-env=HTTP_URL={}", config.network.http_url);
    println!("cargo:rustc-env=TOKEN={}", config.network.token);
    println!("cargo:rustc-env=DEVICE_ID={}", config.network.device_id);
    println!("cargo:rustc-env=CLIENT_ID={}", config.network.client_id);
}

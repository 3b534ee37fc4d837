#[derive(Debug, Clone)]
pub struct Config {
    // Audio pipeline
    pub capture_device: &'static str,
    pub playback_device: &'static str,
    pub sample_rate: u32,
    pub channels: u32,
    pub chunk_duration_ms: u32,
    pub playback_sample_rate: u32,
    pub playback_channels: u32,
    pub playback_period_size: usize,
    pub response_format: &'static str,

    // Echo effect
    pub effect: &'static str,
    pub echo_buffer_size: usize,
    pub echo_feedback: f32,

    // Network (static part)
    pub mode: &'static str,
    pub ws_url: &'static str,
    pub http_url: &'static str,
    pub token: &'static str,

    // Client identity (dynamic, may be rewritten at startup)
    pub device_id: String,
    pub client_id: String,
}

impl Config {
    /// Build the configuration from environment variables set at compile
    /// time. All values come from config.toml via build.rs.
    pub fn new() -> Result<Self, &'static str> {
        Ok(Self {
            capture_device: env!("CAPTURE_DEVICE"),
            playback_device: env!("PLAYBACK_DEVICE"),
            sample_rate: env!("SAMPLE_RATE")
                .parse()
                .map_err(|_| "Failed to parse SAMPLE_RATE")?,
            channels: env!("CHANNELS")
                .parse()
                .map_err(|_| "Failed to parse CHANNELS")?,
            chunk_duration_ms: env!("CHUNK_DURATION_MS")
                .parse()
                .map_err(|_| "Failed to parse CHUNK_DURATION_MS")?,
            playback_sample_rate: env!("PLAYBACK_SAMPLE_RATE")
                .parse()
                .map_err(|_| "Failed to parse PLAYBACK_SAMPLE_RATE")?,
            playback_channels: env!("PLAYBACK_CHANNELS")
                .parse()
                .map_err(|_| "Failed to parse PLAYBACK_CHANNELS")?,
            playback_period_size: env!("PLAYBACK_PERIOD_SIZE")
                .parse()
                .map_err(|_| "Failed to parse PLAYBACK_PERIOD_SIZE")?,
            response_format: env!("RESPONSE_FORMAT"),

            effect: env!("EFFECT"),
            echo_buffer_size: env!("ECHO_BUFFER_SIZE")
                .parse()
                .map_err(|_| "Failed to parse ECHO_BUFFER_SIZE")?,
            echo_feedback: env!("ECHO_FEEDBACK")
                .parse()
                .map_err(|_| "Failed to parse ECHO_FEEDBACK")?,

            mode: env!("MODE"),
            ws_url: env!("WS_URL"),
            http_url: env!("HTTP_URL"),
            token: env!("TOKEN"),

            device_id: env!("DEVICE_ID").to_string(),
            client_id: env!("CLIENT_ID").to_string(),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new().expect("Failed to create default Config from build-time environment variables")
    }
}

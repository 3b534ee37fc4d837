//! Real-time delay/echo processor for the capture path.
//!
//! A fixed-capacity circular delay line per channel with feedback mixing.
//! The per-sample transform runs inside the ALSA capture loop, so it must
//! never allocate, block, or perform I/O once constructed.

/// Default delay line capacity in samples.
pub const DEFAULT_BUFFER_SIZE: usize = 2048;

/// Default feedback gain applied to the delayed signal.
pub const DEFAULT_FEEDBACK: f32 = 0.5;

/// Fixed-capacity circular buffer realizing a delay of exactly `capacity` samples.
///
/// The write position advances by one per sample and wraps modulo capacity;
/// it never resets after construction except through [`DelayLine::clear`].
#[derive(Clone)]
pub struct DelayLine {
    buffer: Vec<f32>,
    write_pos: usize,
}

impl DelayLine {
    pub fn new(capacity: usize) -> Self {
        // A zero-length buffer would make the modulo wrap meaningless.
        let capacity = capacity.max(1);
        Self {
            buffer: vec![0.0; capacity],
            write_pos: 0,
        }
    }

    /// The sample written `capacity` steps ago, i.e. the slot the next write
    /// will overwrite.
    #[inline]
    pub fn read(&self) -> f32 {
        self.buffer[self.write_pos]
    }

    /// Overwrite the oldest slot with `input` and advance the write position.
    #[inline]
    pub fn write(&mut self, input: f32) {
        self.buffer[self.write_pos] = input;
        self.write_pos = (self.write_pos + 1) % self.buffer.len();
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Current write position, equal to the total number of samples written
    /// modulo capacity.
    pub fn position(&self) -> usize {
        self.write_pos
    }

    pub fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
    }
}

/// Echo effect: `out = in + feedback * delayed`.
///
/// Each channel owns its own delay line so multi-channel input never leaks
/// across channels. The delay line carries the wet mix, so a unit impulse
/// returns attenuated by another factor of `feedback` on every trip through
/// the buffer (f, f², f³, ...).
pub struct EchoProcessor {
    lines: Vec<DelayLine>,
    feedback: f32,
}

impl EchoProcessor {
    /// Create a processor for `channels` independent channels.
    ///
    /// `feedback` is clamped to [0.0, 1.0]; 0.0 degenerates to pass-through.
    pub fn new(channels: usize, capacity: usize, feedback: f32) -> Self {
        let channels = channels.max(1);
        Self {
            lines: (0..channels).map(|_| DelayLine::new(capacity)).collect(),
            feedback: feedback.clamp(0.0, 1.0),
        }
    }

    /// Pass-through configuration: the delay lines still advance, but the
    /// delayed signal is mixed in with zero gain.
    pub fn passthrough(channels: usize, capacity: usize) -> Self {
        Self::new(channels, capacity, 0.0)
    }

    pub fn channels(&self) -> usize {
        self.lines.len()
    }

    /// Delay length in samples (identical for every channel).
    pub fn capacity(&self) -> usize {
        self.lines.first().map_or(0, |l| l.capacity())
    }

    pub fn feedback(&self) -> f32 {
        self.feedback
    }

    /// Write position of one channel's delay line, for diagnostics.
    pub fn position(&self, channel: usize) -> Option<usize> {
        self.lines.get(channel).map(|l| l.position())
    }

    /// Process one multi-channel frame set.
    ///
    /// `inputs` and `outputs` hold one frame per channel; input and output
    /// frames for a channel must have equal length. Channels beyond the
    /// configured count, or with no matching output frame, are skipped.
    ///
    /// Returns `true` ("keep processing") in every case. Missing channel data
    /// is a silent no-op that leaves the delay lines untouched; the render
    /// host must never be torn down over a degenerate frame.
    pub fn process(&mut self, inputs: &[&[f32]], outputs: &mut [&mut [f32]]) -> bool {
        if inputs.is_empty() || outputs.is_empty() {
            return true;
        }

        for (channel, input) in inputs.iter().enumerate() {
            let Some(output) = outputs.get_mut(channel) else {
                continue;
            };
            let Some(line) = self.lines.get_mut(channel) else {
                continue;
            };
            let n = input.len().min(output.len());
            for i in 0..n {
                let mixed = input[i] + self.feedback * line.read();
                line.write(mixed);
                output[i] = mixed;
            }
        }

        true
    }

    /// Zero all delay lines and reset their write positions.
    pub fn clear(&mut self) {
        for line in &mut self.lines {
            line.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn process_mono(proc_: &mut EchoProcessor, input: &[f32]) -> Vec<f32> {
        let mut output = vec![0.0f32; input.len()];
        let inputs = [input];
        let mut out_ref: &mut [f32] = &mut output;
        let continue_ = proc_.process(&inputs, std::slice::from_mut(&mut out_ref));
        assert!(continue_);
        output
    }

    #[test]
    fn zero_feedback_is_passthrough() {
        let mut echo = EchoProcessor::passthrough(1, 64);
        let input: Vec<f32> = (0..128).map(|i| (i as f32 / 128.0) - 0.5).collect();
        let output = process_mono(&mut echo, &input);
        assert_eq!(output, input);
    }

    #[test]
    fn impulse_decays_by_feedback_per_pass() {
        let capacity = 32;
        let feedback = 0.5;
        let mut echo = EchoProcessor::new(1, capacity, feedback);

        let mut impulse = vec![0.0f32; capacity];
        impulse[0] = 1.0;
        let first = process_mono(&mut echo, &impulse);
        assert_eq!(first[0], 1.0);
        assert!(first[1..].iter().all(|&s| s == 0.0));

        // One buffer length later the impulse returns scaled by f, then f².
        let second = process_mono(&mut echo, &vec![0.0f32; capacity]);
        assert!((second[0] - feedback).abs() < 1e-6);

        let third = process_mono(&mut echo, &vec![0.0f32; capacity]);
        assert!((third[0] - feedback * feedback).abs() < 1e-6);
    }

    #[test]
    fn write_position_counts_samples_modulo_capacity() {
        let mut echo = EchoProcessor::new(1, 100, 0.3);
        // 3 frames of 64 samples = 192 samples total, chunked arbitrarily.
        for len in [64usize, 64, 64] {
            let frame = vec![0.25f32; len];
            process_mono(&mut echo, &frame);
        }
        assert_eq!(echo.position(0), Some(192 % 100));
    }

    #[test]
    fn empty_frame_is_a_noop() {
        let mut echo = EchoProcessor::new(1, 16, 0.5);
        process_mono(&mut echo, &[]);
        assert_eq!(echo.position(0), Some(0));
    }

    #[test]
    fn chunking_does_not_change_output() {
        let capacity = 48;
        let input: Vec<f32> = (0..256).map(|i| ((i * 7) % 13) as f32 / 13.0 - 0.5).collect();

        let mut whole = EchoProcessor::new(1, capacity, 0.5);
        let expected = process_mono(&mut whole, &input);

        let mut chunked = EchoProcessor::new(1, capacity, 0.5);
        let mut got = Vec::new();
        got.extend(process_mono(&mut chunked, &input[..128]));
        got.extend(process_mono(&mut chunked, &input[128..]));

        assert_eq!(expected, got);
    }

    #[test]
    fn missing_channel_data_signals_continue_without_mutation() {
        let mut echo = EchoProcessor::new(2, 16, 0.5);

        assert!(echo.process(&[], &mut []));
        assert_eq!(echo.position(0), Some(0));
        assert_eq!(echo.position(1), Some(0));

        // Input present but no matching output frame: that channel is skipped.
        let input = [0.5f32; 8];
        let inputs: [&[f32]; 2] = [&input, &input];
        let mut out0 = [0.0f32; 8];
        let mut out_ref: &mut [f32] = &mut out0;
        assert!(echo.process(&inputs, std::slice::from_mut(&mut out_ref)));
        assert_eq!(echo.position(0), Some(8));
        assert_eq!(echo.position(1), Some(0));
    }

    #[test]
    fn channels_do_not_share_state() {
        let capacity = 8;
        let mut echo = EchoProcessor::new(2, capacity, 1.0);

        // Impulse on channel 0 only, then silence for one buffer length.
        let left = {
            let mut f = vec![0.0f32; capacity];
            f[0] = 1.0;
            f
        };
        let right = vec![0.0f32; capacity];
        let mut out_l = vec![0.0f32; capacity];
        let mut out_r = vec![0.0f32; capacity];
        {
            let inputs: [&[f32]; 2] = [&left, &right];
            let mut outputs = [&mut out_l[..], &mut out_r[..]];
            echo.process(&inputs, &mut outputs);
        }
        let silence = vec![0.0f32; capacity];
        {
            let inputs: [&[f32]; 2] = [&silence, &silence];
            let mut outputs = [&mut out_l[..], &mut out_r[..]];
            echo.process(&inputs, &mut outputs);
        }

        // The echo must come back on the left channel only.
        assert_eq!(out_l[0], 1.0);
        assert!(out_r.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn clear_resets_state_and_position() {
        let mut echo = EchoProcessor::new(1, 16, 0.8);
        process_mono(&mut echo, &[1.0; 10]);
        echo.clear();
        assert_eq!(echo.position(0), Some(0));

        // After a clear the line must not echo anything from before.
        let out = process_mono(&mut echo, &[0.0; 16]);
        assert!(out.iter().all(|&s| s == 0.0));
    }
}

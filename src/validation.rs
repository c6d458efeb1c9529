//! Input validation
//!
//! Upload admission checks: file size, audio container signatures, prompt
//! length, and a header-only duration probe. No full decode happens in the
//! control plane; durations come from container metadata alone.

use crate::error::{PipelineError, PipelineResult};

pub const MAX_AUDIO_BYTES: usize = 10 * 1024 * 1024;
pub const PROMPT_MIN_CHARS: usize = 50;
pub const PROMPT_MAX_CHARS: usize = 500;

/// Supported audio containers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Mp3,
    Wav,
    Flac,
    Ogg,
}

impl AudioFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "audio/mpeg",
            AudioFormat::Wav => "audio/wav",
            AudioFormat::Flac => "audio/flac",
            AudioFormat::Ogg => "audio/ogg",
        }
    }
}

/// Probed upload metadata
#[derive(Debug, Clone, Copy)]
pub struct AudioInfo {
    pub format: AudioFormat,
    pub duration_secs: f64,
}

/// Validate a creative prompt: 50-500 characters after trimming
pub fn validate_prompt(prompt: &str) -> PipelineResult<()> {
    let length = prompt.trim().chars().count();
    if length == 0 {
        return Err(PipelineError::Validation("Prompt is required".into()));
    }
    if length < PROMPT_MIN_CHARS {
        return Err(PipelineError::Validation(format!(
            "Prompt must be at least {PROMPT_MIN_CHARS} characters long (current: {length})"
        )));
    }
    if length > PROMPT_MAX_CHARS {
        return Err(PipelineError::Validation(format!(
            "Prompt must be at most {PROMPT_MAX_CHARS} characters long (current: {length})"
        )));
    }
    Ok(())
}

/// Validate an uploaded audio object and probe its duration
pub fn probe_audio(bytes: &[u8]) -> PipelineResult<AudioInfo> {
    if bytes.is_empty() {
        return Err(PipelineError::Validation("File is empty".into()));
    }
    if bytes.len() > MAX_AUDIO_BYTES {
        return Err(PipelineError::Validation(format!(
            "File size ({:.2} MB) exceeds maximum of {} MB",
            bytes.len() as f64 / (1024.0 * 1024.0),
            MAX_AUDIO_BYTES / (1024 * 1024)
        )));
    }

    let format = detect_format(bytes).ok_or_else(|| {
        PipelineError::Validation(
            "Invalid audio file format. Supported formats: MP3, WAV, FLAC, OGG".into(),
        )
    })?;

    let duration_secs = match format {
        AudioFormat::Mp3 => mp3_duration(bytes),
        AudioFormat::Wav => wav_duration(bytes),
        AudioFormat::Flac => flac_duration(bytes),
        AudioFormat::Ogg => ogg_duration(bytes),
    }
    .ok_or_else(|| PipelineError::Validation("Failed to extract audio duration".into()))?;

    if !duration_secs.is_finite() || duration_secs <= 0.0 {
        return Err(PipelineError::Validation(
            "Failed to extract audio duration".into(),
        ));
    }

    Ok(AudioInfo {
        format,
        duration_secs,
    })
}

fn detect_format(bytes: &[u8]) -> Option<AudioFormat> {
    if bytes.starts_with(b"RIFF") && bytes.get(8..12) == Some(b"WAVE") {
        return Some(AudioFormat::Wav);
    }
    if bytes.starts_with(b"fLaC") {
        return Some(AudioFormat::Flac);
    }
    if bytes.starts_with(b"OggS") {
        return Some(AudioFormat::Ogg);
    }
    if bytes.starts_with(b"ID3") {
        return Some(AudioFormat::Mp3);
    }
    // Bare MPEG frame sync
    if bytes.len() >= 2 && bytes[0] == 0xFF && matches!(bytes[1], 0xFB | 0xF3 | 0xF2 | 0xFA | 0xE3)
    {
        return Some(AudioFormat::Mp3);
    }
    None
}

fn read_u32_le(bytes: &[u8], offset: usize) -> Option<u32> {
    bytes
        .get(offset..offset + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

/// WAV: byte rate from the fmt chunk, payload size from the data chunk
fn wav_duration(bytes: &[u8]) -> Option<f64> {
    let mut offset = 12;
    let mut byte_rate: Option<u32> = None;
    while offset + 8 <= bytes.len() {
        let chunk_id = bytes.get(offset..offset + 4)?;
        let chunk_size = read_u32_le(bytes, offset + 4)? as usize;
        match chunk_id {
            b"fmt " => {
                byte_rate = read_u32_le(bytes, offset + 16);
            }
            b"data" => {
                let rate = byte_rate?;
                if rate == 0 {
                    return None;
                }
                return Some(chunk_size as f64 / rate as f64);
            }
            _ => {}
        }
        // Chunks are word-aligned
        offset += 8 + chunk_size + (chunk_size & 1);
    }
    None
}

/// FLAC: sample rate and total samples from the STREAMINFO block
fn flac_duration(bytes: &[u8]) -> Option<f64> {
    // 4-byte magic, 4-byte block header, then STREAMINFO
    let info = bytes.get(8..8 + 18)?;
    let sample_rate =
        ((info[10] as u64) << 12) | ((info[11] as u64) << 4) | ((info[12] as u64) >> 4);
    let total_samples = (((info[13] & 0x0F) as u64) << 32)
        | ((info[14] as u64) << 24)
        | ((info[15] as u64) << 16)
        | ((info[16] as u64) << 8)
        | (info[17] as u64);
    if sample_rate == 0 || total_samples == 0 {
        return None;
    }
    Some(total_samples as f64 / sample_rate as f64)
}

/// OGG/Vorbis: sample rate from the identification header, length from the
/// granule position of the last page
fn ogg_duration(bytes: &[u8]) -> Option<f64> {
    // "\x01vorbis" + version(4) + channels(1) + rate(4 LE)
    let id_offset = bytes
        .windows(7)
        .take(4096)
        .position(|w| w == b"\x01vorbis")?;
    let sample_rate = read_u32_le(bytes, id_offset + 12)?;
    if sample_rate == 0 {
        return None;
    }

    let last_page = bytes
        .windows(4)
        .rposition(|w| w == b"OggS")?;
    let granule = bytes.get(last_page + 6..last_page + 14)?;
    let total_samples = u64::from_le_bytes([
        granule[0], granule[1], granule[2], granule[3], granule[4], granule[5], granule[6],
        granule[7],
    ]);
    if total_samples == 0 {
        return None;
    }
    Some(total_samples as f64 / sample_rate as f64)
}

/// MP3: constant-bitrate estimate from the first frame header
fn mp3_duration(bytes: &[u8]) -> Option<f64> {
    let mut offset = 0;
    if bytes.starts_with(b"ID3") {
        // Syncsafe tag size at bytes 6..10
        let size = bytes.get(6..10)?;
        let tag_len = ((size[0] as usize) << 21)
            | ((size[1] as usize) << 14)
            | ((size[2] as usize) << 7)
            | (size[3] as usize);
        offset = 10 + tag_len;
    }

    while offset + 4 <= bytes.len() {
        if bytes[offset] == 0xFF && bytes[offset + 1] & 0xE0 == 0xE0 {
            break;
        }
        offset += 1;
    }
    if offset + 4 > bytes.len() {
        return None;
    }

    let header = &bytes[offset..offset + 4];
    let version = (header[1] >> 3) & 0x03; // 3 = MPEG1, 2 = MPEG2, 0 = MPEG2.5
    let layer = (header[1] >> 1) & 0x03; // 1 = Layer III
    if layer != 1 {
        return None;
    }
    let bitrate_index = (header[2] >> 4) as usize;
    if bitrate_index == 0 || bitrate_index == 15 {
        return None;
    }

    const MPEG1_L3: [u32; 15] = [
        0, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320,
    ];
    const MPEG2_L3: [u32; 15] = [0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160];
    let bitrate_kbps = if version == 3 {
        MPEG1_L3[bitrate_index]
    } else {
        MPEG2_L3[bitrate_index]
    };
    if bitrate_kbps == 0 {
        return None;
    }

    let audio_bytes = (bytes.len() - offset) as f64;
    Some(audio_bytes * 8.0 / (bitrate_kbps as f64 * 1000.0))
}

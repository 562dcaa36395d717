//! G.711 μ-law codec and the 24 kHz → 8 kHz downsampler.
//!
//! Twilio media streams carry μ-law mono at 8 kHz in both directions; the
//! TTS service produces 16-bit PCM at 24 kHz. Decoding happens on every
//! inbound media message, encoding on every outbound packet.

const BIAS: i16 = 0x84;
const CLIP: i16 = 32_635;

/// Encode one linear PCM sample to μ-law.
pub fn encode_sample(sample: i16) -> u8 {
    let sign: u8 = if sample < 0 { 0x80 } else { 0 };
    let mut magnitude = if sample < 0 {
        // avoid overflow on i16::MIN
        (sample as i32).unsigned_abs().min(CLIP as u32) as i16
    } else {
        sample.min(CLIP)
    };
    magnitude += BIAS;

    // segment is the position of the highest set bit above bit 5
    let mut segment: u8 = 7;
    let mut probe = 0x4000;
    while segment > 0 && (magnitude & probe) == 0 {
        segment -= 1;
        probe >>= 1;
    }

    let mantissa = ((magnitude >> (segment + 3)) & 0x0F) as u8;
    !(sign | (segment << 4) | mantissa)
}

/// Decode one μ-law byte to linear PCM.
pub fn decode_sample(byte: u8) -> i16 {
    let byte = !byte;
    let sign = byte & 0x80;
    let segment = (byte >> 4) & 0x07;
    let mantissa = byte & 0x0F;

    let magnitude = (((mantissa as i16) << 3) + BIAS) << segment;
    let magnitude = magnitude - BIAS;
    if sign != 0 {
        -magnitude
    } else {
        magnitude
    }
}

/// Decode a μ-law buffer to little-endian 16-bit PCM bytes.
pub fn decode(mulaw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(mulaw.len() * 2);
    for &b in mulaw {
        out.extend_from_slice(&decode_sample(b).to_le_bytes());
    }
    out
}

/// Encode little-endian 16-bit PCM bytes to μ-law.
pub fn encode(pcm: &[u8]) -> Vec<u8> {
    pcm.chunks_exact(2)
        .map(|c| encode_sample(i16::from_le_bytes([c[0], c[1]])))
        .collect()
}

/// Downsample 24 kHz 16-bit PCM to 8 kHz by averaging each group of three
/// samples — a cheap low-pass that is plenty for telephone band audio.
pub fn downsample_24k_to_8k(pcm: &[u8]) -> Vec<u8> {
    let samples: Vec<i16> = pcm
        .chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]))
        .collect();
    let mut out = Vec::with_capacity(samples.len() / 3 * 2);
    for group in samples.chunks_exact(3) {
        let avg = ((group[0] as i32 + group[1] as i32 + group[2] as i32) / 3) as i16;
        out.extend_from_slice(&avg.to_le_bytes());
    }
    out
}

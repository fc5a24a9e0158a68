//! G.711 μ-law codec
//!
//! Both directions are table driven. The decode table holds all 256
//! expansions; the encode path looks up the segment (exponent) from the
//! top byte of the biased magnitude, which is the same as scanning for the
//! highest set bit below 0x4000.

const BIAS: i32 = 0x84;
const CLIP: i32 = 32635;

static DECODE_TABLE: [i16; 256] = build_decode_table();
static EXPONENT_TABLE: [u8; 256] = build_exponent_table();

const fn expand(byte: u8) -> i16 {
    let inverted = !byte;
    let sign = inverted & 0x80;
    let exponent = ((inverted >> 4) & 0x07) as i32;
    let mantissa = (inverted & 0x0F) as i32;
    let magnitude = (((mantissa << 3) + BIAS) << exponent) - BIAS;
    if sign != 0 {
        (-magnitude) as i16
    } else {
        magnitude as i16
    }
}

const fn build_decode_table() -> [i16; 256] {
    let mut table = [0i16; 256];
    let mut i = 0;
    while i < 256 {
        table[i] = expand(i as u8);
        i += 1;
    }
    table
}

const fn build_exponent_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        let mut exponent = 0u8;
        let mut v = i >> 1;
        while v > 0 {
            exponent += 1;
            v >>= 1;
        }
        table[i] = exponent;
        i += 1;
    }
    table
}

/// Expand one μ-law byte to a linear sample
#[inline]
pub fn mulaw_to_pcm16(byte: u8) -> i16 {
    DECODE_TABLE[byte as usize]
}

/// Compress one linear sample to μ-law
#[inline]
pub fn pcm16_to_mulaw(sample: i16) -> u8 {
    let mut magnitude = sample as i32;
    let sign: u8 = if magnitude < 0 {
        magnitude = -magnitude;
        0x80
    } else {
        0x00
    };
    if magnitude > CLIP {
        magnitude = CLIP;
    }
    magnitude += BIAS;

    let exponent = EXPONENT_TABLE[((magnitude >> 7) & 0xFF) as usize];
    let mantissa = ((magnitude >> (exponent as u32 + 3)) & 0x0F) as u8;
    !(sign | (exponent << 4) | mantissa)
}

/// Decode a μ-law buffer
pub fn decode_mulaw(bytes: &[u8]) -> Vec<i16> {
    bytes.iter().map(|&b| mulaw_to_pcm16(b)).collect()
}

/// Encode a PCM buffer as μ-law
pub fn encode_mulaw(samples: &[i16]) -> Vec<u8> {
    samples.iter().map(|&s| pcm16_to_mulaw(s)).collect()
}

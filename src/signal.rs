//! Signal descriptors, the limit clamp and Intel (little-endian) bit packing.
//!
//! A frame payload is handled as one `u64` built with `u64::from_le_bytes`,
//! so bit `n` of the payload is bit `n % 8` of byte `n / 8`. A signal
//! occupies `[bit_offset, bit_offset + bit_length)` of that word.

use crate::config::{FRAME_BITS, FRAME_BYTES};
use crate::dispatch::{Getter, Setter};
use serde::Serialize;

/// Index into the flat tx or rx signal table.
pub type SignalIndex = usize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SignalDescriptor {
    pub name: &'static str,
    pub message_id: u16,
    pub bit_offset: u8,
    pub bit_length: u8,
    pub min: f64,
    pub max: f64,
    pub factor: f64,
    pub offset: f64,
    #[serde(skip)]
    pub getter: Option<Getter>,
    #[serde(skip)]
    pub setter: Option<Setter>,
}

impl SignalDescriptor {
    /// Unscaled bit field covering its full unsigned range.
    pub fn raw(name: &'static str, bit_offset: u8, bit_length: u8) -> Self {
        Self {
            name,
            message_id: 0,
            bit_offset,
            bit_length,
            min: 0.0,
            max: value_mask(bit_length) as f64,
            factor: 1.0,
            offset: 0.0,
            getter: None,
            setter: None,
        }
    }

    pub fn scaled(
        name: &'static str,
        bit_offset: u8,
        bit_length: u8,
        min: f64,
        max: f64,
        factor: f64,
        offset: f64,
    ) -> Self {
        Self {
            min,
            max,
            factor,
            offset,
            ..Self::raw(name, bit_offset, bit_length)
        }
    }

    #[must_use]
    pub fn with_getter(mut self, getter: Getter) -> Self {
        self.getter = Some(getter);
        self
    }

    #[must_use]
    pub fn with_setter(mut self, setter: Setter) -> Self {
        self.setter = Some(setter);
        self
    }

    pub fn fits_frame(&self) -> bool {
        self.bit_length > 0
            && self.bit_length <= FRAME_BITS
            && u16::from(self.bit_offset) + u16::from(self.bit_length) <= u16::from(FRAME_BITS)
    }

    /// Payload bits covered by this signal.
    pub fn frame_mask(&self) -> u64 {
        value_mask(self.bit_length) << self.bit_offset
    }

    pub fn clamp(&self, value: f64) -> f64 {
        clamp(value, self)
    }

    /// Clamp, then apply offset and factor: `(clamp(v) + offset) * factor`.
    ///
    /// The result is rounded to the nearest step and masked to the signal
    /// length; negative results saturate to zero.
    pub fn encode(&self, value: f64) -> u64 {
        let scaled = ((self.clamp(value) + self.offset) * self.factor).round();
        (scaled as u64) & value_mask(self.bit_length)
    }

    /// Inverse of [`encode`](Self::encode) for values inside `[min, max]`.
    pub fn decode(&self, raw: u64) -> f64 {
        let raw = raw & value_mask(self.bit_length);
        (raw as f64) / self.factor - self.offset
    }

    pub fn extract(&self, payload: u64) -> u64 {
        extract_bits(payload, self.bit_offset, self.bit_length)
    }

    pub fn insert(&self, payload: &mut u64, raw: u64) {
        insert_bits(payload, self.bit_offset, self.bit_length, raw);
    }
}

/// Saturate `value` to `[signal.min, signal.max]`.
///
/// Runs on the unscaled measurement, before offset and factor.
pub fn clamp(value: f64, signal: &SignalDescriptor) -> f64 {
    if value < signal.min {
        signal.min
    } else if value > signal.max {
        signal.max
    } else {
        value
    }
}

pub fn value_mask(bit_length: u8) -> u64 {
    if bit_length >= FRAME_BITS {
        u64::MAX
    } else {
        (1u64 << bit_length) - 1
    }
}

pub fn extract_bits(payload: u64, bit_offset: u8, bit_length: u8) -> u64 {
    if bit_offset >= FRAME_BITS {
        return 0;
    }
    (payload >> bit_offset) & value_mask(bit_length)
}

pub fn insert_bits(payload: &mut u64, bit_offset: u8, bit_length: u8, raw: u64) {
    if bit_offset >= FRAME_BITS {
        return;
    }
    let mask = value_mask(bit_length) << bit_offset;
    *payload = (*payload & !mask) | ((raw << bit_offset) & mask);
}

/// Interpret up to eight bytes as a payload word; missing bytes read as zero.
pub fn payload_from_bytes(data: &[u8]) -> u64 {
    let mut bytes = [0u8; FRAME_BYTES];
    let len = data.len().min(FRAME_BYTES);
    bytes[..len].copy_from_slice(&data[..len]);
    u64::from_le_bytes(bytes)
}

pub fn payload_to_bytes(payload: u64) -> [u8; FRAME_BYTES] {
    payload.to_le_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(bit_offset: u8, bit_length: u8, min: f64, max: f64, factor: f64, offset: f64) -> SignalDescriptor {
        SignalDescriptor {
            name: "test",
            message_id: 0x100,
            bit_offset,
            bit_length,
            min,
            max,
            factor,
            offset,
            getter: None,
            setter: None,
        }
    }

    #[test]
    fn test_clamp_saturates_at_bounds() {
        let signal = descriptor(0, 16, 0.0, 6553.5, 10.0, 0.0);

        assert_eq!(clamp(-5.0, &signal), 0.0);
        assert_eq!(clamp(7000.0, &signal), 6553.5);
        assert_eq!(clamp(120.25, &signal), 120.25);
        // Idempotent
        let once = clamp(9000.0, &signal);
        assert_eq!(clamp(once, &signal), once);
    }

    #[test]
    fn test_clamp_runs_before_scaling() {
        // Temperature layout: -128..527.35 degC, offset 128, factor 100
        let signal = descriptor(8, 16, -128.0, 527.35, 100.0, 128.0);

        assert_eq!(signal.encode(25.0), 15_300);
        assert_eq!(signal.encode(-200.0), 0);
        assert_eq!(signal.encode(600.0), 65_535);
    }

    #[test]
    fn test_negative_scaled_values_saturate_to_zero() {
        let signal = descriptor(0, 8, -10.0, 10.0, 1.0, 0.0);
        assert_eq!(signal.encode(-3.0), 0);
    }

    #[test]
    fn test_encode_masks_to_signal_length() {
        let signal = descriptor(0, 8, 0.0, 1000.0, 1.0, 0.0);
        assert_eq!(signal.encode(0x1FF as f64), 0xFF);
    }

    #[test]
    fn test_bit_insert_and_extract_little_endian() {
        let mut payload = 0u64;
        insert_bits(&mut payload, 8, 16, 0xABCD);
        insert_bits(&mut payload, 0, 8, 0x07);

        let bytes = payload_to_bytes(payload);
        assert_eq!(bytes[0], 0x07);
        assert_eq!(bytes[1], 0xCD);
        assert_eq!(bytes[2], 0xAB);
        assert_eq!(extract_bits(payload, 8, 16), 0xABCD);

        // Overwrite clears the previous field
        insert_bits(&mut payload, 8, 16, 0x0001);
        assert_eq!(extract_bits(payload, 8, 16), 0x0001);
        assert_eq!(extract_bits(payload, 0, 8), 0x07);
    }

    #[test]
    fn test_full_width_signal() {
        let mut payload = 0u64;
        insert_bits(&mut payload, 0, 64, u64::MAX - 1);
        assert_eq!(extract_bits(payload, 0, 64), u64::MAX - 1);
    }

    #[test]
    fn test_short_frames_are_zero_padded() {
        let payload = payload_from_bytes(&[0x1E, 0x01]);
        assert_eq!(payload, 0x011E);
    }

    #[test]
    fn test_frame_fit() {
        assert!(descriptor(32, 32, 0.0, 1.0, 1.0, 0.0).fits_frame());
        assert!(!descriptor(40, 32, 0.0, 1.0, 1.0, 0.0).fits_frame());
        assert!(!descriptor(0, 0, 0.0, 1.0, 1.0, 0.0).fits_frame());
    }
}

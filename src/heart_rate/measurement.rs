use std::time::Duration;

use thiserror::Error;

// Flags byte of the Heart Rate Measurement characteristic (0x2A37)
const FLAG_BPM_U16: u8 = 1 << 0;
const FLAG_CONTACT_DETECTED: u8 = 1 << 1;
const FLAG_CONTACT_SUPPORTED: u8 = 1 << 2;
const FLAG_ENERGY_EXPENDED: u8 = 1 << 3;
const FLAG_RR_INTERVALS: u8 = 1 << 4;

/// RR intervals are reported in 1/1024ths of a second
const RR_UNITS_PER_SEC: f64 = 1024.0;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Empty heart rate payload")]
    Empty,
    #[error("Heart rate payload truncated: expected at least {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
    #[error("Heart rate payload has a dangling byte in the RR interval section")]
    DanglingRrByte,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorContact {
    NotSupported,
    NotDetected,
    Detected,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HeartRateMeasurement {
    pub bpm: u16,
    pub sensor_contact: SensorContact,
    /// Kilojoules since the last reset, if the sensor reports it
    pub energy_expended: Option<u16>,
    pub rr_intervals: Vec<Duration>,
}

/// Decodes a Heart Rate Measurement notification using the standard layout.
///
/// Bit 0 of the flags byte picks an 8-bit or 16-bit (little-endian) BPM field.
/// Optional energy expended and RR interval fields follow, depending on the
/// remaining flag bits.
pub fn parse_hrm(data: &[u8]) -> Result<HeartRateMeasurement, ParseError> {
    let (&flags, rest) = data.split_first().ok_or(ParseError::Empty)?;

    let (bpm, mut rest) = if flags & FLAG_BPM_U16 != 0 {
        let (bytes, rest) = take(rest, 2, data.len())?;
        (u16::from_le_bytes([bytes[0], bytes[1]]), rest)
    } else {
        let (bytes, rest) = take(rest, 1, data.len())?;
        (u16::from(bytes[0]), rest)
    };

    let sensor_contact = match (
        flags & FLAG_CONTACT_SUPPORTED != 0,
        flags & FLAG_CONTACT_DETECTED != 0,
    ) {
        (false, _) => SensorContact::NotSupported,
        (true, false) => SensorContact::NotDetected,
        (true, true) => SensorContact::Detected,
    };

    let energy_expended = if flags & FLAG_ENERGY_EXPENDED != 0 {
        let (bytes, remaining) = take(rest, 2, data.len())?;
        rest = remaining;
        Some(u16::from_le_bytes([bytes[0], bytes[1]]))
    } else {
        None
    };

    let mut rr_intervals = Vec::new();
    if flags & FLAG_RR_INTERVALS != 0 {
        let chunks = rest.chunks_exact(2);
        if !chunks.remainder().is_empty() {
            return Err(ParseError::DanglingRrByte);
        }
        rr_intervals = chunks
            .map(|c| {
                let raw = u16::from_le_bytes([c[0], c[1]]);
                Duration::from_secs_f64(f64::from(raw) / RR_UNITS_PER_SEC)
            })
            .collect();
    }

    Ok(HeartRateMeasurement {
        bpm,
        sensor_contact,
        energy_expended,
        rr_intervals,
    })
}

/// Builds a standard payload, used by the simulated monitor.
pub fn encode_hrm(bpm: u16, rr_intervals: &[Duration]) -> Vec<u8> {
    let mut flags = FLAG_CONTACT_SUPPORTED | FLAG_CONTACT_DETECTED;
    let mut payload = Vec::with_capacity(3 + rr_intervals.len() * 2);
    payload.push(0);
    if let Ok(small) = u8::try_from(bpm) {
        payload.push(small);
    } else {
        flags |= FLAG_BPM_U16;
        payload.extend_from_slice(&bpm.to_le_bytes());
    }
    if !rr_intervals.is_empty() {
        flags |= FLAG_RR_INTERVALS;
        for rr in rr_intervals {
            let raw = (rr.as_secs_f64() * RR_UNITS_PER_SEC).round() as u16;
            payload.extend_from_slice(&raw.to_le_bytes());
        }
    }
    payload[0] = flags;
    payload
}

fn take(rest: &[u8], count: usize, total: usize) -> Result<(&[u8], &[u8]), ParseError> {
    if rest.len() < count {
        return Err(ParseError::Truncated {
            expected: total - rest.len() + count,
            actual: total,
        });
    }
    Ok(rest.split_at(count))
}

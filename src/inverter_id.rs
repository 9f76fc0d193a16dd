/// Fixed start of every identification frame.
const HEADER: [u8; 4] = [0x68, 0x02, 0x40, 0x30];
/// Fixed marker between the repeated serial and the checksum.
const MARKER: [u8; 2] = [0x01, 0x00];
const TRAILER: u8 = 0x16;
const CHECKSUM_SEED: u32 = 115;

/// Builds the identification frame the inverter expects before it answers with telemetry.
///
/// Layout: `68 02 40 30 | serial | serial | 01 00 | checksum | 16`, where `serial` is the serial
/// number's bytes with the least significant byte first, and `checksum` is the low byte of
/// `115 + 2 * sum(serial bytes)`.
///
/// Walking the hex rendering of the serial from the end two digits at a time gives the same bytes as
/// the minimal little-endian encoding, provided an odd digit count is left-padded with a zero. That
/// padding is the policy used here; a serial of 0 encodes as a single `0x00` byte.
pub fn identification_frame(serial: u64) -> Vec<u8> {
    let serial_bytes = reversed_serial_bytes(serial);

    let checksum = serial_bytes
        .iter()
        .fold(CHECKSUM_SEED, |acc, &byte| acc + 2 * u32::from(byte));

    let mut frame = Vec::with_capacity(HEADER.len() + 2 * serial_bytes.len() + MARKER.len() + 2);
    frame.extend_from_slice(&HEADER);
    frame.extend_from_slice(&serial_bytes);
    frame.extend_from_slice(&serial_bytes);
    frame.extend_from_slice(&MARKER);
    frame.push((checksum & 0xFF) as u8);
    frame.push(TRAILER);
    frame
}

/// Serial number bytes, least significant first, without high zero bytes (at least one byte).
fn reversed_serial_bytes(serial: u64) -> Vec<u8> {
    let significant_bits = u64::BITS - serial.leading_zeros();
    let len = significant_bits.div_ceil(8).max(1) as usize;
    serial.to_le_bytes()[..len].to_vec()
}

/// Renders bytes the way frames show up in the diagnostics, e.g. `[ 0x68 0x2 ](2)`.
pub fn hex_dump(bytes: &[u8]) -> String {
    let mut out = String::from("[ ");
    for byte in bytes {
        out.push_str(&format!("{byte:#x} "));
    }
    out.push_str(&format!("]({})", bytes.len()));
    out
}

//! SNTP (RFC 4330) packet handling
//!
//! Only the unicast client exchange is supported: one 48-byte request, one
//! reply, and the server's transmit timestamp taken as the current time.
//! Round-trip delay is ignored, which is well inside one second on a LAN.

use super::DateTime;
use crate::error::NetworkTimeError;

pub const NTP_PORT: u16 = 123;
pub const PACKET_LEN: usize = 48;

/// Seconds between 1900-01-01 and 1970-01-01
const NTP_UNIX_OFFSET: u64 = 2_208_988_800;
const ERA_SECONDS: u64 = 1 << 32;

const VERSION: u8 = 4;
const MODE_CLIENT: u8 = 3;
const MODE_SERVER: u8 = 4;
const LEAP_UNSYNCHRONIZED: u8 = 3;
const TRANSMIT_TIMESTAMP: usize = 40;

pub fn request() -> [u8; PACKET_LEN] {
    let mut packet = [0; PACKET_LEN];
    packet[0] = (VERSION << 3) | MODE_CLIENT;
    packet
}

pub fn parse_response(packet: &[u8]) -> Result<DateTime, NetworkTimeError> {
    if packet.len() < PACKET_LEN {
        return Err(NetworkTimeError::BadResponse("short packet"));
    }

    let leap = packet[0] >> 6;
    let mode = packet[0] & 0x07;
    let stratum = packet[1];
    if mode != MODE_SERVER {
        return Err(NetworkTimeError::BadResponse("not a server reply"));
    }
    // Stratum 0 is a kiss-o'-death packet
    if leap == LEAP_UNSYNCHRONIZED || stratum == 0 {
        return Err(NetworkTimeError::BadResponse("server not synchronized"));
    }

    let t = &packet[TRANSMIT_TIMESTAMP..TRANSMIT_TIMESTAMP + 4];
    let secs = u64::from(u32::from_be_bytes([t[0], t[1], t[2], t[3]]));
    if secs == 0 {
        return Err(NetworkTimeError::BadResponse("empty transmit timestamp"));
    }

    // Timestamps below the offset belong to era 1 (after 2036-02-07)
    let unix = if secs >= NTP_UNIX_OFFSET {
        secs - NTP_UNIX_OFFSET
    } else {
        secs + ERA_SECONDS - NTP_UNIX_OFFSET
    };
    Ok(DateTime::from_unix_secs(unix))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(leap: u8, stratum: u8, transmit_secs: u32) -> [u8; PACKET_LEN] {
        let mut packet = [0; PACKET_LEN];
        packet[0] = (leap << 6) | (VERSION << 3) | MODE_SERVER;
        packet[1] = stratum;
        packet[TRANSMIT_TIMESTAMP..TRANSMIT_TIMESTAMP + 4]
            .copy_from_slice(&transmit_secs.to_be_bytes());
        packet
    }

    #[test]
    fn request_is_a_v4_client_packet() {
        let packet = request();
        assert_eq!(packet[0], 0x23);
        assert!(packet[1..].iter().all(|b| *b == 0));
    }

    #[test]
    fn transmit_timestamp_becomes_wall_time() {
        let packet = reply(0, 2, 1_709_210_096 + 2_208_988_800);

        assert_eq!(
            parse_response(&packet),
            Ok(DateTime::new(2024, 2, 29, 12, 34, 56).unwrap())
        );
    }

    #[test]
    fn era_rollover_is_handled() {
        let packet = reply(0, 1, 16);

        assert_eq!(
            parse_response(&packet),
            Ok(DateTime::new(2036, 2, 7, 6, 28, 32).unwrap())
        );
    }

    #[test]
    fn unsynchronized_and_kiss_of_death_are_rejected() {
        assert!(parse_response(&reply(3, 2, 3_900_000_000)).is_err());
        assert!(parse_response(&reply(0, 0, 3_900_000_000)).is_err());
    }

    #[test]
    fn client_echo_and_short_packets_are_rejected() {
        assert!(parse_response(&request()).is_err());
        assert_eq!(
            parse_response(&[0x24; 12]),
            Err(NetworkTimeError::BadResponse("short packet"))
        );
    }
}

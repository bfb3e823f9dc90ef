//! Packet framing for the SCP wire protocol (§4.5 "Framing").
//!
//! Every command is `[CMD][LEN][PAYLOAD[LEN]][CHECKSUM]`, checksum
//! `0x4A + CMD + LEN + sum(PAYLOAD) (mod 256)`. Every response is two
//! bytes, `[CMD_ECHO][RESPONSE_CODE]`.

/// Closed response-code enum (§4.5/§7). The device's own vocabulary,
/// plus `Timeout`/`CommandErr`/`ChecksumErr` belong to the framing layer
/// rather than the device (see [`super::Error`]).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseCode {
    Ok,
    BadCommand,
    CommandErr,
    ChecksumErr,
    Timeout,
    NoTrack0,
    NoDriveSel,
    NoMotorSel,
    NotReady,
    NoIndex,
    ZeroRevs,
    ReadTooLong,
    BadLength,
    BadData,
    BoundaryOdd,
    WriteProtect,
    BadRam,
    NoDisk,
    BadBaud,
    BadCmdOnPort,
    Unknown(u8),
}

impl From<u8> for ResponseCode {
    fn from(v: u8) -> Self {
        match v {
            0x4F => ResponseCode::Ok,
            0x80 => ResponseCode::BadCommand,
            0x81 => ResponseCode::CommandErr,
            0x82 => ResponseCode::ChecksumErr,
            0x83 => ResponseCode::Timeout,
            0x84 => ResponseCode::NoTrack0,
            0x85 => ResponseCode::NoDriveSel,
            0x86 => ResponseCode::NoMotorSel,
            0x87 => ResponseCode::NotReady,
            0x88 => ResponseCode::NoIndex,
            0x89 => ResponseCode::ZeroRevs,
            0x8A => ResponseCode::ReadTooLong,
            0x8B => ResponseCode::BadLength,
            0x8C => ResponseCode::BadData,
            0x8D => ResponseCode::BoundaryOdd,
            0x8E => ResponseCode::WriteProtect,
            0x8F => ResponseCode::BadRam,
            0x90 => ResponseCode::NoDisk,
            0x91 => ResponseCode::BadBaud,
            0x92 => ResponseCode::BadCmdOnPort,
            other => ResponseCode::Unknown(other),
        }
    }
}

impl ResponseCode {
    pub fn is_ok(&self) -> bool {
        matches!(self, ResponseCode::Ok)
    }
}

/// Command byte constants (§4.5 "Commands").
pub mod cmd {
    pub const DRIVE_SELECT_A: u8 = 0x80;
    pub const DRIVE_SELECT_B: u8 = 0x81;
    pub const DRIVE_DESELECT_A: u8 = 0x82;
    pub const DRIVE_DESELECT_B: u8 = 0x83;
    pub const MOTOR_ON_A: u8 = 0x84;
    pub const MOTOR_ON_B: u8 = 0x85;
    pub const MOTOR_OFF_A: u8 = 0x86;
    pub const MOTOR_OFF_B: u8 = 0x87;
    pub const SEEK_TRACK0: u8 = 0x88;
    pub const STEP_TO_TRACK: u8 = 0x89;
    pub const SIDE_SELECT: u8 = 0x8A;
    pub const DENSITY_SELECT: u8 = 0x8B;
    pub const GET_STATUS: u8 = 0x8C;
    pub const GET_PARAMS: u8 = 0x90;
    pub const SET_PARAMS: u8 = 0x91;
    pub const READ_FLUX: u8 = 0xA0;
    pub const GET_FLUX_INFO: u8 = 0xA1;
    pub const WRITE_FLUX: u8 = 0xA2;
    pub const SEND_RAM_USB: u8 = 0xA8;
    pub const LOAD_RAM_USB: u8 = 0xA9;
    pub const SCPINFO: u8 = 0xD0;
}

const PREAMBLE: u8 = 0x4A;

/// `0x4A + CMD + LEN + sum(PAYLOAD) (mod 256)`.
pub fn checksum(command: u8, payload: &[u8]) -> u8 {
    let mut sum = PREAMBLE as u32 + command as u32 + payload.len() as u32;
    for &b in payload {
        sum += b as u32;
    }
    (sum & 0xFF) as u8
}

/// Build a full command packet.
pub fn build_packet(command: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 + payload.len() + 1);
    out.push(command);
    out.push(payload.len() as u8);
    out.extend_from_slice(payload);
    out.push(checksum(command, payload));
    out
}

/// Recompute a packet's checksum from its own bytes and compare against
/// the trailing checksum byte (§8 invariant 7).
pub fn verify_packet(packet: &[u8]) -> bool {
    let Some((&command, rest)) = packet.split_first() else { return false };
    let Some((&stored, payload)) = rest.split_last() else { return false };
    if payload.is_empty() {
        return false;
    }
    let len = payload[0] as usize;
    let payload = &payload[1..];
    len == payload.len() && checksum(command, payload) == stored
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Response {
    pub cmd_echo: u8,
    pub code: ResponseCode,
}

pub fn parse_response(bytes: [u8; 2]) -> Response {
    Response { cmd_echo: bytes[0], code: ResponseCode::from(bytes[1]) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_checksum_vector() {
        // SCPINFO with no payload: 0x4A + 0xD0 + 0x00 = 0x11A -> low byte 0x1A.
        assert_eq!(checksum(cmd::SCPINFO, &[]), 0x1A);
        let packet = build_packet(cmd::SCPINFO, &[]);
        assert_eq!(packet, vec![0xD0, 0x00, 0x1A]);
    }

    #[test]
    fn response_round_trip() {
        let response = parse_response([cmd::SCPINFO, 0x4F]);
        assert_eq!(response.cmd_echo, cmd::SCPINFO);
        assert!(response.code.is_ok());
    }

    #[test]
    fn every_issued_packet_verifies() {
        let packet = build_packet(cmd::SET_PARAMS, &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
        assert!(verify_packet(&packet));
        let mut tampered = packet.clone();
        *tampered.last_mut().unwrap() ^= 0xFF;
        assert!(!verify_packet(&tampered));
    }
}

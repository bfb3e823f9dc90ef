//! SCP device driver: commands, read/write-track protocols, port
//! detection, and retry policy (§4.5).

use std::io::{Read, Write};

use super::protocol::{self, cmd, ResponseCode};
use super::Error;
use crate::primitives::endian;

/// Any host serial handle that can be read from and written to
/// satisfies this crate's transport needs; VCP mode ignores baud, and
/// read timeouts are expected to be configured by the transport itself
/// (§4.5 "Physical layer").
pub trait SerialTransport: Read + Write {}
impl<T: Read + Write> SerialTransport for T {}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Drive {
    A,
    B,
}

/// Five big-endian 16-bit words (§4.5 "get-params / set-params"). This
/// crate orders them `select, step, motor, seek0, auto_off` as literally
/// written in §4.5; §9 notes firmware revisions disagree on whether
/// `select_delay` or `step_delay` comes first — validate against the
/// target device before relying on this order for a new firmware rev.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Params {
    pub select_delay: u16,
    pub step_delay: u16,
    pub motor_delay: u16,
    pub seek0_delay: u16,
    pub auto_off_delay: u16,
}

impl Params {
    fn to_bytes(self) -> [u8; 10] {
        let mut out = [0u8; 10];
        endian::put_be16(&mut out, 0, self.select_delay);
        endian::put_be16(&mut out, 2, self.step_delay);
        endian::put_be16(&mut out, 4, self.motor_delay);
        endian::put_be16(&mut out, 6, self.seek0_delay);
        endian::put_be16(&mut out, 8, self.auto_off_delay);
        out
    }

    fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            select_delay: endian::be16(bytes, 0),
            step_delay: endian::be16(bytes, 2),
            motor_delay: endian::be16(bytes, 4),
            seek0_delay: endian::be16(bytes, 6),
            auto_off_delay: endian::be16(bytes, 8),
        }
    }
}

/// Result of the read-track protocol (§4.5 "Read-track protocol").
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FluxCapture {
    pub flux_times: Vec<u64>,
    pub per_rev_index_times: Vec<u64>,
    pub per_rev_cell_counts: Vec<u32>,
}

/// Write-protect bit within the 16-bit status word (§4.5 "Safety").
const STATUS_WRITE_PROTECT_BIT: u16 = 0x0001;
const READ_FLUX_INDEX_FLAG: u8 = 0x01;

pub struct ScpDriver<T> {
    transport: T,
    selected_drive: Option<Drive>,
    motor_on: bool,
    last_status: u16,
}

impl<T: SerialTransport> ScpDriver<T> {
    pub fn new(transport: T) -> Self {
        Self { transport, selected_drive: None, motor_on: false, last_status: 0 }
    }

    /// Send one packet and read its 2-byte response. Does not
    /// interpret a non-OK code as an error — callers that want that
    /// behavior use [`Self::command_ok`].
    fn command(&mut self, command: u8, payload: &[u8]) -> Result<ResponseCode, Error> {
        let packet = protocol::build_packet(command, payload);
        self.transport.write_all(&packet).map_err(|_| Error::Transport)?;
        let mut response = [0u8; 2];
        self.transport.read_exact(&mut response).map_err(|e| {
            if e.kind() == std::io::ErrorKind::TimedOut || e.kind() == std::io::ErrorKind::WouldBlock {
                Error::Timeout
            } else {
                Error::Transport
            }
        })?;
        let parsed = protocol::parse_response(response);
        if parsed.cmd_echo != command {
            return Err(Error::CommandErr);
        }
        Ok(parsed.code)
    }

    fn command_ok(&mut self, command: u8, payload: &[u8]) -> Result<(), Error> {
        match self.command(command, payload)? {
            ResponseCode::Ok => Ok(()),
            other => Err(Error::Device(other)),
        }
    }

    fn read_trailing(&mut self, len: usize) -> Result<Vec<u8>, Error> {
        let mut buf = vec![0u8; len];
        self.transport.read_exact(&mut buf).map_err(|e| {
            if e.kind() == std::io::ErrorKind::TimedOut {
                Error::Timeout
            } else {
                Error::Transport
            }
        })?;
        Ok(buf)
    }

    pub fn drive_select(&mut self, drive: Drive) -> Result<(), Error> {
        let cmd = match drive {
            Drive::A => cmd::DRIVE_SELECT_A,
            Drive::B => cmd::DRIVE_SELECT_B,
        };
        self.command_ok(cmd, &[])?;
        self.selected_drive = Some(drive);
        Ok(())
    }

    pub fn drive_deselect(&mut self, drive: Drive) -> Result<(), Error> {
        let cmd = match drive {
            Drive::A => cmd::DRIVE_DESELECT_A,
            Drive::B => cmd::DRIVE_DESELECT_B,
        };
        self.command_ok(cmd, &[])?;
        if self.selected_drive == Some(drive) {
            self.selected_drive = None;
        }
        Ok(())
    }

    pub fn motor_on(&mut self, drive: Drive) -> Result<(), Error> {
        let cmd = match drive {
            Drive::A => cmd::MOTOR_ON_A,
            Drive::B => cmd::MOTOR_ON_B,
        };
        self.command_ok(cmd, &[])?;
        self.motor_on = true;
        Ok(())
    }

    pub fn motor_off(&mut self, drive: Drive) -> Result<(), Error> {
        let cmd = match drive {
            Drive::A => cmd::MOTOR_OFF_A,
            Drive::B => cmd::MOTOR_OFF_B,
        };
        self.command_ok(cmd, &[])?;
        self.motor_on = false;
        Ok(())
    }

    pub fn seek_track0(&mut self) -> Result<(), Error> {
        self.command_ok(cmd::SEEK_TRACK0, &[])
    }

    pub fn step_to_track(&mut self, track: u8) -> Result<(), Error> {
        self.command_ok(cmd::STEP_TO_TRACK, &[track])
    }

    pub fn select_side(&mut self, side: u8) -> Result<(), Error> {
        self.command_ok(cmd::SIDE_SELECT, &[side])
    }

    pub fn density_select(&mut self, density: u8) -> Result<(), Error> {
        self.command_ok(cmd::DENSITY_SELECT, &[density])
    }

    pub fn get_status(&mut self) -> Result<u16, Error> {
        self.command_ok(cmd::GET_STATUS, &[])?;
        let bytes = self.read_trailing(2)?;
        let status = endian::be16(&bytes, 0);
        self.last_status = status;
        Ok(status)
    }

    pub fn get_params(&mut self) -> Result<Params, Error> {
        self.command_ok(cmd::GET_PARAMS, &[])?;
        let bytes = self.read_trailing(10)?;
        Ok(Params::from_bytes(&bytes))
    }

    pub fn set_params(&mut self, params: Params) -> Result<(), Error> {
        self.command_ok(cmd::SET_PARAMS, &params.to_bytes())
    }

    fn is_write_protected(&self) -> bool {
        self.last_status & STATUS_WRITE_PROTECT_BIT != 0
    }

    fn issue_read_flux(&mut self, rev_count: u8) -> Result<(), Error> {
        self.command_ok(cmd::READ_FLUX, &[rev_count, READ_FLUX_INDEX_FLAG])
    }

    fn get_flux_info(&mut self) -> Result<Vec<(u32, u32)>, Error> {
        self.command_ok(cmd::GET_FLUX_INFO, &[])?;
        let bytes = self.read_trailing(40)?;
        let mut revs = Vec::with_capacity(5);
        for i in 0..5 {
            let offset = i * 8;
            let index_time = endian::be32(&bytes, offset);
            let cell_count = endian::be32(&bytes, offset + 4);
            if cell_count == 0 {
                break;
            }
            revs.push((index_time, cell_count));
        }
        Ok(revs)
    }

    fn send_ram_usb(&mut self, offset: u32, length: u32) -> Result<Vec<u8>, Error> {
        let mut payload = [0u8; 8];
        endian::put_be32(&mut payload, 0, offset);
        endian::put_be32(&mut payload, 4, length);
        self.command_ok(cmd::SEND_RAM_USB, &payload)?;
        self.read_trailing(length as usize)
    }

    fn load_ram_usb(&mut self, offset: u32, data: &[u8]) -> Result<(), Error> {
        let mut payload = [0u8; 8];
        endian::put_be32(&mut payload, 0, offset);
        endian::put_be32(&mut payload, 4, data.len() as u32);
        self.transport
            .write_all(&protocol::build_packet(cmd::LOAD_RAM_USB, &payload))
            .map_err(|_| Error::Transport)?;
        self.transport.write_all(data).map_err(|_| Error::Transport)?;
        let mut response = [0u8; 2];
        self.transport.read_exact(&mut response).map_err(|_| Error::Timeout)?;
        let parsed = protocol::parse_response(response);
        if parsed.cmd_echo != cmd::LOAD_RAM_USB {
            return Err(Error::CommandErr);
        }
        match parsed.code {
            ResponseCode::Ok => Ok(()),
            other => Err(Error::Device(other)),
        }
    }

    /// §4.5 "Read-track protocol": seek, select side, read flux info,
    /// bulk-transfer the flux stream, and split it back into
    /// per-revolution index times and cell counts.
    pub fn read_track(&mut self, track: u8, side: u8, rev_count: u8) -> Result<FluxCapture, Error> {
        self.step_to_track(track)?;
        self.select_side(side)?;
        self.issue_read_flux(rev_count)?;
        let revs = self.get_flux_info()?;
        let total_cells: u32 = revs.iter().map(|&(_, c)| c).sum();
        let raw = self.send_ram_usb(0, total_cells * 2)?;

        let mut flux_times = Vec::with_capacity(total_cells as usize);
        let mut running: u64 = 0;
        for chunk in raw.chunks_exact(2) {
            running += u16::from_be_bytes([chunk[0], chunk[1]]) as u64;
            flux_times.push(running);
        }

        let per_rev_index_times = revs.iter().map(|&(t, _)| t as u64).collect();
        let per_rev_cell_counts = revs.iter().map(|&(_, c)| c).collect();
        Ok(FluxCapture { flux_times, per_rev_index_times, per_rev_cell_counts })
    }

    /// §4.5 "Write-track protocol". Refuses to run if the last observed
    /// status byte reported write-protect.
    pub fn write_track(&mut self, flux_deltas: &[u16]) -> Result<(), Error> {
        if self.is_write_protected() {
            return Err(Error::Device(ResponseCode::WriteProtect));
        }
        let mut buf = Vec::with_capacity(flux_deltas.len() * 2);
        for &d in flux_deltas {
            buf.extend_from_slice(&d.to_be_bytes());
        }
        self.load_ram_usb(0, &buf)?;
        let mut payload = [0u8; 5];
        endian::put_be32(&mut payload, 0, flux_deltas.len() as u32);
        self.command_ok(cmd::WRITE_FLUX, &payload)
    }

    /// Scan for a responding SCP device: send SCPINFO, expect
    /// `[0xD0, OK]` followed by two version bytes (§4.5 "Detection").
    pub fn detect(&mut self) -> Result<(u8, u8), Error> {
        self.command_ok(cmd::SCPINFO, &[])?;
        let bytes = self.read_trailing(2)?;
        Ok((bytes[0], bytes[1]))
    }

    /// Per-track read with retry: re-seeks between attempts and never
    /// propagates an error out of the capture loop, instead reporting
    /// final per-track success/failure to `callback` (§4.5 "Retry
    /// policy").
    pub fn read_track_with_retry(
        &mut self,
        track: u8,
        side: u8,
        rev_count: u8,
        retries: u32,
        mut callback: impl FnMut(u8, u8, bool),
    ) -> Option<FluxCapture> {
        for attempt in 0..=retries {
            match self.read_track(track, side, rev_count) {
                Ok(capture) => {
                    callback(track, side, true);
                    return Some(capture);
                }
                Err(e) if attempt < retries => {
                    log::warn!("track {track} side {side} attempt {attempt} failed: {e}, re-seeking and retrying");
                    let _ = self.step_to_track(track);
                }
                Err(e) => {
                    log::warn!("track {track} side {side} exhausted {retries} retries: {e}");
                    callback(track, side, false);
                }
            }
        }
        None
    }

    /// Turns motors off and deselects drives on any exit path, ignoring
    /// individual command failures since this is itself the cleanup
    /// path (§5 "Cancellation").
    pub fn close(&mut self) {
        if self.motor_on {
            if let Some(drive) = self.selected_drive {
                let _ = self.motor_off(drive);
            }
        }
        if let Some(drive) = self.selected_drive {
            let _ = self.drive_deselect(drive);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io;

    struct MockTransport {
        inbound: VecDeque<u8>,
        outbound: Vec<u8>,
    }

    impl MockTransport {
        fn new() -> Self {
            Self { inbound: VecDeque::new(), outbound: Vec::new() }
        }
        fn push_response(&mut self, bytes: &[u8]) {
            self.inbound.extend(bytes);
        }
    }

    impl Read for MockTransport {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = buf.len().min(self.inbound.len());
            if n == 0 {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "no data"));
            }
            for slot in buf.iter_mut().take(n) {
                *slot = self.inbound.pop_front().unwrap();
            }
            Ok(n)
        }
    }

    impl Write for MockTransport {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.outbound.extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn s6_scpinfo_probe_round_trips() {
        let mut transport = MockTransport::new();
        transport.push_response(&[cmd::SCPINFO, 0x4F, 7, 3]);
        let mut driver = ScpDriver::new(transport);
        let (hw, fw) = driver.detect().unwrap();
        assert_eq!((hw, fw), (7, 3));
    }

    #[test]
    fn set_then_get_params_round_trips() {
        let params = Params { select_delay: 10, step_delay: 20, motor_delay: 30, seek0_delay: 40, auto_off_delay: 50 };
        let mut transport = MockTransport::new();
        transport.push_response(&[cmd::SET_PARAMS, 0x4F]);
        transport.push_response(&[cmd::GET_PARAMS, 0x4F]);
        transport.push_response(&params.to_bytes());
        let mut driver = ScpDriver::new(transport);
        driver.set_params(params).unwrap();
        let got = driver.get_params().unwrap();
        assert_eq!(got, params);
    }

    #[test]
    fn write_refused_when_write_protected() {
        let transport = MockTransport::new();
        let mut driver = ScpDriver::new(transport);
        driver.last_status = STATUS_WRITE_PROTECT_BIT;
        let result = driver.write_track(&[100, 200]);
        assert!(matches!(result, Err(Error::Device(ResponseCode::WriteProtect))));
    }

    #[test]
    fn command_echo_mismatch_is_command_err() {
        let mut transport = MockTransport::new();
        transport.push_response(&[0xFF, 0x4F]);
        let mut driver = ScpDriver::new(transport);
        let result = driver.seek_track0();
        assert!(matches!(result, Err(Error::CommandErr)));
    }
}

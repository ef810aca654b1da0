//! In-process device simulator
//!
//! [`SimulatedDevice`] is a [`TransportLink`] that behaves like the unit's
//! firmware command loop. Written bytes are cut into 16-byte frames exactly
//! as the firmware reads them, and every reply line is queued for the next
//! `read_line`.
//!
//! Modelled behavior:
//! - boots into the passthrough chain `[Input -> Output, Output]`
//! - `'a'` clears the running chain and opens an upload; `'f'` appends a
//!   record; a second `'a'` validates and starts the chain
//! - `'d'` dumps the chain one record per request
//! - ten write-once storage blocks
//! - a frame that does not belong to an open upload or download ends it and
//!   is handled as a normal command
//!
//! Filter processing itself is not simulated.

use std::collections::VecDeque;

use core::fmt::Write as _;
use core::time::Duration;

use fxchain_hal::{LinkConfig, TransportError, TransportLink};
use fxchain_protocol::messages::{
    ACK_APPLY, ACK_END_FILTERS, ACK_FILTER, ACK_HALT, ACK_LOADED, ACK_NOOP, ACK_SAVED, ACK_SET,
    OP_APPLY, OP_DOWNLOAD, OP_FILTER, OP_GET_FREQUENCY, OP_HALT, OP_LOAD, OP_NOOP, OP_SAVE,
    OP_SET_FREQUENCY, PREFIX_DOWNLOAD, PREFIX_GET,
};
use fxchain_protocol::{FRAME_LEN, RECORD_LEN, WIRE_OFFSET};
use log::trace;

/// Storage blocks the firmware provides
pub const BLOCK_COUNT: usize = 10;

/// Sample frequency the firmware timer starts with
pub const BOOT_FREQUENCY_HZ: u16 = 20_000;

/// Reply for a block index the device does not have
pub const REPLY_NO_SUCH_BLOCK: &str = "ERROR";

/// Reply for a load from a block never written
pub const REPLY_BLOCK_EMPTY: &str = "Block empty";

/// Reply for a save to a block already written
pub const REPLY_BLOCK_WRITTEN: &str = "Error";

type Record = [u8; RECORD_LEN];

/// Multi-frame exchange the firmware is in the middle of
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Idle,
    Upload,
    Download { next: usize },
}

/// Firmware-equivalent device behind a [`TransportLink`]
#[derive(Debug, Clone)]
pub struct SimulatedDevice {
    config: LinkConfig,
    open: bool,
    muted: bool,
    rx: Vec<u8>,
    tx: VecDeque<Vec<u8>>,
    mode: Mode,
    chain: Vec<Record>,
    running: bool,
    frequency: u16,
    blocks: [Option<Vec<Record>>; BLOCK_COUNT],
}

impl Default for SimulatedDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedDevice {
    pub fn new() -> Self {
        Self::with_config(LinkConfig::default())
    }

    pub fn with_config(config: LinkConfig) -> Self {
        Self {
            config,
            open: false,
            muted: false,
            rx: Vec::new(),
            tx: VecDeque::new(),
            mode: Mode::Idle,
            chain: passthrough(),
            running: true,
            frequency: BOOT_FREQUENCY_HZ,
            blocks: Default::default(),
        }
    }

    /// Drop the connection as if the cable was pulled
    pub fn unplug(&mut self) {
        self.open = false;
        self.rx.clear();
        self.tx.clear();
    }

    /// Stop answering; commands are still processed
    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    /// Raw records of the current chain
    pub fn chain(&self) -> &[Record] {
        &self.chain
    }

    /// Whether the last upload or load started processing
    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn frequency(&self) -> u16 {
        self.frequency
    }

    /// Raw records stored in `block`, if it was ever written
    pub fn block(&self, block: usize) -> Option<&[Record]> {
        self.blocks.get(block)?.as_deref()
    }

    fn reply(&mut self, line: &[u8]) {
        trace!("sim <- \"{}\"", line.escape_ascii());
        if !self.muted {
            self.tx.push_back(line.to_vec());
        }
    }

    fn handle_frame(&mut self, frame: &[u8; FRAME_LEN]) {
        trace!("sim -> \"{}\"", frame.escape_ascii());
        match self.mode {
            Mode::Upload => match frame[0] {
                OP_FILTER => {
                    let mut record = [0u8; RECORD_LEN];
                    record.copy_from_slice(&frame[1..1 + RECORD_LEN]);
                    self.chain.push(record);
                    self.reply(ACK_FILTER.as_bytes());
                    return;
                }
                OP_APPLY => {
                    self.mode = Mode::Idle;
                    self.finish_upload();
                    return;
                }
                _ => self.mode = Mode::Idle,
            },
            Mode::Download { next } => {
                if frame[0] == OP_DOWNLOAD {
                    self.send_record(next);
                    return;
                }
                self.mode = Mode::Idle;
            }
            Mode::Idle => {}
        }

        self.handle_command(frame);
    }

    fn handle_command(&mut self, frame: &[u8; FRAME_LEN]) {
        match frame[0] {
            OP_NOOP => self.reply(ACK_NOOP.as_bytes()),
            OP_HALT => {
                self.chain = passthrough();
                self.running = true;
                self.reply(ACK_HALT.as_bytes());
            }
            OP_GET_FREQUENCY => {
                let mut line = heapless::String::<16>::new();
                let _ = write!(line, "{}{}", PREFIX_GET, self.frequency);
                self.reply(line.as_bytes());
            }
            OP_SET_FREQUENCY => {
                // Digits up to the NUL; the firmware does no validation
                self.frequency = frame[1..]
                    .iter()
                    .take_while(|&&b| b != 0)
                    .fold(0u16, |acc, &b| {
                        acc.wrapping_mul(10).wrapping_add(b.wrapping_sub(b'0') as u16)
                    });
                self.reply(ACK_SET.as_bytes());
            }
            OP_DOWNLOAD => {
                let mut line = heapless::String::<16>::new();
                let _ = write!(line, "{}{}", PREFIX_DOWNLOAD, self.chain.len());
                self.reply(line.as_bytes());
                if !self.chain.is_empty() {
                    self.mode = Mode::Download { next: 0 };
                }
            }
            OP_APPLY => {
                // The count byte is ignored; the chain ends at the next 'a'
                self.chain.clear();
                self.running = false;
                self.mode = Mode::Upload;
                self.reply(ACK_APPLY.as_bytes());
            }
            OP_LOAD => self.load(frame[1] as usize),
            OP_SAVE => self.save(frame[1] as usize),
            // Unknown opcodes get no answer
            _ => {}
        }
    }

    fn send_record(&mut self, index: usize) {
        let Some(record) = self.chain.get(index).copied() else {
            self.mode = Mode::Idle;
            return;
        };

        let mut line = Vec::with_capacity(PREFIX_DOWNLOAD.len() + RECORD_LEN);
        line.extend_from_slice(PREFIX_DOWNLOAD.as_bytes());
        line.extend(record.iter().map(|b| b.wrapping_add(WIRE_OFFSET)));
        self.reply(&line);

        self.mode = if index + 1 < self.chain.len() {
            Mode::Download { next: index + 1 }
        } else {
            Mode::Idle
        };
    }

    fn finish_upload(&mut self) {
        match route_error(&self.chain) {
            None => {
                self.running = true;
                self.reply(ACK_END_FILTERS.as_bytes());
            }
            Some(code) => {
                let mut line = heapless::String::<16>::new();
                let _ = write!(line, "Error: {}", code);
                self.reply(line.as_bytes());
            }
        }
    }

    fn load(&mut self, block: usize) {
        match self.blocks.get(block) {
            None => self.reply(REPLY_NO_SUCH_BLOCK.as_bytes()),
            Some(None) => self.reply(REPLY_BLOCK_EMPTY.as_bytes()),
            Some(Some(stored)) => {
                self.chain = stored.clone();
                self.running = true;
                self.reply(ACK_LOADED.as_bytes());
            }
        }
    }

    fn save(&mut self, block: usize) {
        let chain = self.chain.clone();
        match self.blocks.get_mut(block) {
            None => self.reply(REPLY_NO_SUCH_BLOCK.as_bytes()),
            Some(slot) if slot.is_some() => self.reply(REPLY_BLOCK_WRITTEN.as_bytes()),
            Some(slot) => {
                *slot = Some(chain);
                self.reply(ACK_SAVED.as_bytes());
            }
        }
    }
}

/// The chain the firmware runs at boot and after halt
fn passthrough() -> Vec<Record> {
    vec![[0, 0, 1, 0, 0, 0, 0, 0], [1, 1, 0, 0, 0, 0, 0, 0]]
}

/// Firmware check for filters routed to themselves
///
/// Outputs are resolved to chain positions by id; an id that is not in the
/// chain, or that resolves to position 0, means "no next filter". Returns
/// 2 for a self-routed first output and 4 for the second.
fn route_error(chain: &[Record]) -> Option<u16> {
    let position = |id: u8| chain.iter().position(|r| r[1] == id).unwrap_or(0);

    for record in chain {
        let own = position(record[1]);
        for (slot, code) in [(2, 2), (3, 4)] {
            let next = position(record[slot]);
            if next != 0 && next == own {
                return Some(code);
            }
        }
    }
    None
}

impl TransportLink for SimulatedDevice {
    fn open(&mut self) -> Result<(), TransportError> {
        self.open = true;
        Ok(())
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.open = false;
        self.rx.clear();
        self.tx.clear();
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        if !self.open {
            return Err(TransportError::NotOpen);
        }

        self.rx.extend_from_slice(data);
        while self.rx.len() >= FRAME_LEN {
            let mut frame = [0u8; FRAME_LEN];
            frame.copy_from_slice(&self.rx[..FRAME_LEN]);
            self.rx.drain(..FRAME_LEN);
            self.handle_frame(&frame);
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        if self.open {
            Ok(())
        } else {
            Err(TransportError::NotOpen)
        }
    }

    fn read_line(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize, TransportError> {
        if !self.open {
            return Err(TransportError::NotOpen);
        }

        // Nothing queued means the real device would stay silent until the
        // timeout; no need to sleep through it here
        let Some(line) = self.tx.pop_front() else {
            return Ok(0);
        };
        let n = line.len().min(buf.len());
        buf[..n].copy_from_slice(&line[..n]);
        Ok(n)
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn config(&self) -> &LinkConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_device() -> SimulatedDevice {
        let mut device = SimulatedDevice::new();
        device.open().unwrap();
        device
    }

    fn frame(payload: &[u8]) -> [u8; FRAME_LEN] {
        let mut frame = [b'0'; FRAME_LEN];
        frame[..payload.len()].copy_from_slice(payload);
        frame
    }

    fn exchange(device: &mut SimulatedDevice, payload: &[u8]) -> Vec<u8> {
        device.write(&frame(payload)).unwrap();
        let mut buf = [0u8; 64];
        let n = device.read_line(&mut buf, Duration::ZERO).unwrap();
        buf[..n].to_vec()
    }

    #[test]
    fn test_boot_state() {
        let device = SimulatedDevice::new();
        assert_eq!(device.chain(), passthrough().as_slice());
        assert_eq!(device.frequency(), 20_000);
        assert!(!device.is_open());
    }

    #[test]
    fn test_closed_link_rejects_io() {
        let mut device = SimulatedDevice::new();
        assert_eq!(device.write(b"0"), Err(TransportError::NotOpen));
        let mut buf = [0u8; 8];
        assert_eq!(
            device.read_line(&mut buf, Duration::ZERO),
            Err(TransportError::NotOpen)
        );
    }

    #[test]
    fn test_frames_split_across_writes() {
        let mut device = open_device();
        device.write(b"00000000").unwrap();
        let mut buf = [0u8; 16];
        assert_eq!(device.read_line(&mut buf, Duration::ZERO), Ok(0));

        device.write(b"00000000").unwrap();
        let n = device.read_line(&mut buf, Duration::ZERO).unwrap();
        assert_eq!(&buf[..n], b"Noop");
    }

    #[test]
    fn test_frequency() {
        let mut device = open_device();
        assert_eq!(exchange(&mut device, b"g"), b"Get:20000");
        assert_eq!(exchange(&mut device, b"s44000\0"), b"Set");
        assert_eq!(exchange(&mut device, b"g"), b"Get:44000");
    }

    #[test]
    fn test_upload_and_dump() {
        let mut device = open_device();
        assert_eq!(exchange(&mut device, &[b'a', 2]), b"Apply");
        assert!(!device.is_running());
        assert_eq!(exchange(&mut device, &[b'f', 0, 0, 1, 0, 0, 0, 0, 0]), b"Filter");
        assert_eq!(exchange(&mut device, &[b'f', 1, 1, 0, 0, 9, 0, 0, 0]), b"Filter");
        assert_eq!(exchange(&mut device, b"a"), b"End filters");
        assert!(device.is_running());

        assert_eq!(exchange(&mut device, b"d"), b"Download:2");
        assert_eq!(exchange(&mut device, b"d"), b"Download:  !     ");
        assert_eq!(exchange(&mut device, b"d"), b"Download:!!  )   ");
        // Dump finished; the next 'd' starts over
        assert_eq!(exchange(&mut device, b"d"), b"Download:2");
    }

    #[test]
    fn test_other_command_ends_dump() {
        let mut device = open_device();
        assert_eq!(exchange(&mut device, b"d"), b"Download:2");
        assert_eq!(exchange(&mut device, b"0"), b"Noop");
        assert_eq!(exchange(&mut device, b"d"), b"Download:2");
    }

    #[test]
    fn test_self_route_codes() {
        let mut device = open_device();
        exchange(&mut device, &[b'a', 3]);
        exchange(&mut device, &[b'f', 0, 0, 5, 0, 0, 0, 0, 0]);
        exchange(&mut device, &[b'f', 2, 5, 5, 1, 0, 0, 0, 0]);
        exchange(&mut device, &[b'f', 1, 1, 0, 0, 0, 0, 0, 0]);
        assert_eq!(exchange(&mut device, b"a"), b"Error: 2");
        assert!(!device.is_running());
    }

    #[test]
    fn test_route_error() {
        let ok = [[0, 0, 2, 0, 0, 0, 0, 0], [2, 2, 1, 0, 0, 0, 0, 0], [1, 1, 0, 0, 0, 0, 0, 0]];
        assert_eq!(route_error(&ok), None);

        let second = [[0, 0, 2, 0, 0, 0, 0, 0], [2, 2, 1, 2, 0, 0, 0, 0], [1, 1, 0, 0, 0, 0, 0, 0]];
        assert_eq!(route_error(&second), Some(4));

        // Routing to the Input resolves to position 0, which means "none"
        let to_input = [[0, 0, 0, 0, 0, 0, 0, 0], [1, 1, 0, 0, 0, 0, 0, 0]];
        assert_eq!(route_error(&to_input), None);
    }

    #[test]
    fn test_blocks() {
        let mut device = open_device();
        assert_eq!(exchange(&mut device, &[b'z', 0]), b"Block empty");
        assert_eq!(exchange(&mut device, &[b'z', 10]), b"ERROR");
        assert_eq!(exchange(&mut device, &[b'x', 10]), b"ERROR");
        assert_eq!(exchange(&mut device, &[b'x', 9]), b"Saved");
        assert_eq!(exchange(&mut device, &[b'x', 9]), b"Error");
        assert_eq!(device.block(9), Some(passthrough().as_slice()));
        assert_eq!(exchange(&mut device, &[b'z', 9]), b"Loaded");
    }

    #[test]
    fn test_halt_restores_passthrough() {
        let mut device = open_device();
        exchange(&mut device, &[b'a', 0]);
        exchange(&mut device, b"a");
        assert!(device.chain().is_empty());

        assert_eq!(exchange(&mut device, b"h"), b"Halt");
        assert_eq!(device.chain(), passthrough().as_slice());
    }

    #[test]
    fn test_muted_device_still_processes() {
        let mut device = open_device();
        device.set_muted(true);
        assert_eq!(exchange(&mut device, b"s8000\0"), b"");
        assert_eq!(device.frequency(), 8000);
    }
}

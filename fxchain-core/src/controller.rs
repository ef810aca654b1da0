//! Device controller
//!
//! The controller is the only owner of a device connection. It:
//! - Performs the handshake and tracks the session state
//! - Checks arguments before anything is sent
//! - Runs the apply and download sequences over the command channel
//! - Records the last failure
//!
//! Every operation except [`connect`](DeviceController::connect) requires a
//! connected session and fails with [`ControllerError::NotConnected`]
//! without touching the link otherwise.

use fxchain_hal::{TransportError, TransportLink};
use fxchain_protocol::messages::{
    ACK_HALT, ACK_LOADED, ACK_NOOP, ACK_SAVED, ACK_SET, MAX_FREQUENCY_HZ, MIN_FREQUENCY_HZ,
    PREFIX_DOWNLOAD,
};
use fxchain_protocol::reply::{expect_ack, parse_frequency};
use fxchain_protocol::{
    ApplySequence, Command, DownloadSequence, FilterDefinition, FilterList, Response,
};
use log::{info, warn};

use crate::channel::CommandChannel;
use crate::error::{ControllerError, RangeError};
use crate::session::{DeviceSession, Event, State};

/// A validated on-device storage slot index (0-255)
///
/// Which slots actually exist is up to the device; the firmware answers
/// `"ERROR"` for the ones it lacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StorageBlock(u8);

impl StorageBlock {
    pub fn new(index: u32) -> Result<Self, RangeError> {
        u8::try_from(index)
            .map(StorageBlock)
            .map_err(|_| RangeError::Block(index))
    }

    pub fn index(self) -> u8 {
        self.0
    }
}

impl TryFrom<u32> for StorageBlock {
    type Error = RangeError;

    fn try_from(index: u32) -> Result<Self, Self::Error> {
        Self::new(index)
    }
}

/// Protocol client for one device
pub struct DeviceController<L: TransportLink> {
    channel: CommandChannel<L>,
    session: DeviceSession,
}

impl<L: TransportLink> DeviceController<L> {
    /// Wrap a link; nothing is opened or sent until [`connect`](Self::connect)
    pub fn new(link: L) -> Self {
        Self {
            channel: CommandChannel::new(link),
            session: DeviceSession::new(),
        }
    }

    /// Open the link if needed and perform the no-op handshake
    ///
    /// On a wrong or missing reply the link stays open and the session is
    /// left disconnected.
    pub fn connect(&mut self) -> Result<(), ControllerError> {
        let result = self.handshake();
        if result.is_err() {
            self.session.handle(Event::HandshakeFailed);
        }
        self.finish(result)
    }

    /// Stop the running chain; the device falls back to passthrough
    pub fn halt(&mut self) -> Result<(), ControllerError> {
        let result = self.acknowledged(Command::Halt, ACK_HALT);
        if result.is_ok() {
            self.session.handle(Event::HaltAcknowledged);
        }
        self.finish(result)
    }

    /// Close the link
    ///
    /// Succeeds if the link reports closed afterwards, whatever `close`
    /// itself returned.
    pub fn disconnect(&mut self) -> Result<(), ControllerError> {
        let result = self.close_link();
        self.finish(result)
    }

    /// Upload `filters` in order and start them
    ///
    /// Takes `N + 2` exchanges. The first unexpected reply aborts the
    /// upload; the device keeps whatever it accepted up to that point and
    /// the running state is left as it was.
    pub fn set_filters(&mut self, filters: &[FilterDefinition]) -> Result<(), ControllerError> {
        let result = self.apply(filters);
        self.finish(result)
    }

    /// Set the sample frequency (1-44000 Hz)
    pub fn set_frequency(&mut self, hz: u32) -> Result<(), ControllerError> {
        let result = self.ensure_connected().and_then(|_| {
            let hz = u16::try_from(hz)
                .ok()
                .filter(|_| (MIN_FREQUENCY_HZ..=MAX_FREQUENCY_HZ).contains(&hz))
                .ok_or(RangeError::Frequency(hz))?;
            self.acknowledged(Command::SetFrequency { hz }, ACK_SET)
        });
        self.finish(result)
    }

    /// Read back the sample frequency
    pub fn get_frequency(&mut self) -> Result<u32, ControllerError> {
        let result = self
            .exchange(Command::GetFrequency)
            .and_then(|response| Ok(parse_frequency(&response)?));
        self.finish(result)
    }

    /// Read the device's current chain, in device order
    pub fn download(&mut self) -> Result<FilterList, ControllerError> {
        let result = self.fetch_chain();
        self.finish(result)
    }

    /// Save the device's current chain to `block`
    pub fn save(&mut self, block: u32) -> Result<(), ControllerError> {
        let result = self.ensure_connected().and_then(|_| {
            let block = StorageBlock::new(block)?;
            self.acknowledged(
                Command::Save {
                    block: block.index(),
                },
                ACK_SAVED,
            )
        });
        self.finish(result)
    }

    /// Load the chain stored in `block`
    ///
    /// The session state is unchanged; only an apply marks it running.
    pub fn load(&mut self, block: u32) -> Result<(), ControllerError> {
        let result = self.ensure_connected().and_then(|_| {
            let block = StorageBlock::new(block)?;
            self.acknowledged(
                Command::Load {
                    block: block.index(),
                },
                ACK_LOADED,
            )
        });
        self.finish(result)
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    pub fn is_running(&self) -> bool {
        self.session.is_running()
    }

    pub fn state(&self) -> State {
        self.session.state()
    }

    /// Most recent failure of any operation
    pub fn last_error(&self) -> Option<&ControllerError> {
        self.session.last_error()
    }

    /// Forget the recorded failure
    pub fn clear_error(&mut self) {
        self.session.clear_error();
    }

    pub fn session(&self) -> &DeviceSession {
        &self.session
    }

    pub fn channel(&self) -> &CommandChannel<L> {
        &self.channel
    }

    pub fn link(&self) -> &L {
        self.channel.link()
    }

    pub fn link_mut(&mut self) -> &mut L {
        self.channel.link_mut()
    }

    pub fn into_link(self) -> L {
        self.channel.into_link()
    }

    fn handshake(&mut self) -> Result<(), ControllerError> {
        if !self.channel.link().is_open() {
            self.channel.link_mut().open()?;
            info!("link opened");
        }
        if !self.channel.link().is_open() {
            return Err(TransportError::NotOpen.into());
        }

        let response = self.channel.send(&Command::Noop)?;
        expect_ack(&response, ACK_NOOP)?;
        self.session.handle(Event::HandshakeSucceeded);
        info!("device connected");
        Ok(())
    }

    fn close_link(&mut self) -> Result<(), ControllerError> {
        self.ensure_connected()?;

        let closed = self.channel.link_mut().close();
        if self.channel.link().is_open() {
            return Err(closed.err().unwrap_or(TransportError::Close).into());
        }
        if let Err(e) = closed {
            warn!("close reported {} but link is closed", e);
        }

        self.session.handle(Event::Closed);
        info!("device disconnected");
        Ok(())
    }

    fn apply(&mut self, filters: &[FilterDefinition]) -> Result<(), ControllerError> {
        self.ensure_connected()?;
        let mut sequence =
            ApplySequence::new(filters).map_err(|e| RangeError::FilterCount(e.count))?;

        while let Some(command) = sequence.next_command() {
            let response = self.channel.send(&command)?;
            sequence.accept(&response)?;
        }

        self.session.handle(Event::FiltersApplied);
        info!(
            "applied {} filters in {} exchanges",
            filters.len(),
            sequence.exchanges()
        );
        Ok(())
    }

    fn fetch_chain(&mut self) -> Result<FilterList, ControllerError> {
        self.ensure_connected()?;
        let mut sequence = DownloadSequence::new();

        while let Some(command) = sequence.next_command() {
            let response = self.channel.send(&command)?;
            sequence.accept(&response)?;
        }

        // The loop only ends early through `?`
        sequence
            .into_filters()
            .ok_or_else(|| ControllerError::ProtocolMismatch {
                expected: PREFIX_DOWNLOAD,
                received: Response::empty(),
            })
    }

    /// Send one command and return the raw reply
    fn exchange(&mut self, command: Command<'_>) -> Result<Response, ControllerError> {
        self.ensure_connected()?;
        Ok(self.channel.send(&command)?)
    }

    /// Send one command that must be answered with exactly `ack`
    fn acknowledged(
        &mut self,
        command: Command<'_>,
        ack: &'static str,
    ) -> Result<(), ControllerError> {
        let response = self.exchange(command)?;
        expect_ack(&response, ack)?;
        Ok(())
    }

    fn ensure_connected(&mut self) -> Result<(), ControllerError> {
        if self.session.is_connected() && !self.channel.link().is_open() {
            self.session.handle(Event::LinkLost);
        }
        if self.session.is_connected() {
            Ok(())
        } else {
            Err(ControllerError::NotConnected)
        }
    }

    /// Record a failure and notice a link that went away under it
    fn finish<T>(&mut self, result: Result<T, ControllerError>) -> Result<T, ControllerError> {
        if let Err(e) = &result {
            warn!("{}", e);
            if e.is_transport() && !self.channel.link().is_open() {
                self.session.handle(Event::LinkLost);
            }
            self.session.record_error(e.clone());
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimulatedDevice;
    use core::time::Duration;
    use fxchain_hal::LinkConfig;
    use fxchain_protocol::{FilterKind, Malformed};
    use std::collections::VecDeque;

    /// Link that answers every read with the next scripted line
    struct ScriptedLink {
        config: LinkConfig,
        open: bool,
        open_fails: bool,
        written: Vec<Vec<u8>>,
        replies: VecDeque<Vec<u8>>,
    }

    impl ScriptedLink {
        fn new(replies: &[&[u8]]) -> Self {
            Self {
                config: LinkConfig::default(),
                open: false,
                open_fails: false,
                written: Vec::new(),
                replies: replies.iter().map(|r| r.to_vec()).collect(),
            }
        }
    }

    impl TransportLink for ScriptedLink {
        fn open(&mut self) -> Result<(), TransportError> {
            if self.open_fails {
                return Err(TransportError::Open);
            }
            self.open = true;
            Ok(())
        }

        fn close(&mut self) -> Result<(), TransportError> {
            self.open = false;
            Ok(())
        }

        fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
            if !self.open {
                return Err(TransportError::NotOpen);
            }
            self.written.push(data.to_vec());
            Ok(())
        }

        fn flush(&mut self) -> Result<(), TransportError> {
            Ok(())
        }

        fn read_line(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize, TransportError> {
            let line = self.replies.pop_front().unwrap_or_default();
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

    fn connected(replies: &[&[u8]]) -> DeviceController<ScriptedLink> {
        let mut script: Vec<&[u8]> = Vec::new();
        script.push(b"Noop");
        script.extend_from_slice(replies);
        let mut controller = DeviceController::new(ScriptedLink::new(&script));
        controller.connect().unwrap();
        controller
    }

    fn three_filters() -> [FilterDefinition; 3] {
        [
            FilterDefinition::input().with_outputs(&[2]).unwrap(),
            FilterDefinition::new(FilterKind::Delay, 2)
                .unwrap()
                .with_outputs(&[1])
                .unwrap(),
            FilterDefinition::output(),
        ]
    }

    #[test]
    fn test_connect_opens_and_handshakes() {
        let controller = connected(&[]);
        assert!(controller.is_connected());
        assert_eq!(controller.state(), State::Connected);
        assert_eq!(controller.link().written, vec![b"0000000000000000".to_vec()]);
    }

    #[test]
    fn test_wrong_handshake_leaves_link_open() {
        let mut controller = DeviceController::new(ScriptedLink::new(&[b"Nope"]));
        let err = controller.connect().unwrap_err();

        assert!(matches!(
            err,
            ControllerError::ProtocolMismatch { expected: "Noop", .. }
        ));
        assert!(controller.link().is_open());
        assert!(!controller.is_connected());
        assert_eq!(controller.last_error(), Some(&err));

        assert_eq!(controller.halt(), Err(ControllerError::NotConnected));
        assert_eq!(controller.link().written.len(), 1);
    }

    #[test]
    fn test_open_failure() {
        let mut link = ScriptedLink::new(&[b"Noop"]);
        link.open_fails = true;
        let mut controller = DeviceController::new(link);

        assert_eq!(
            controller.connect(),
            Err(ControllerError::Transport(TransportError::Open))
        );
        assert!(!controller.is_connected());
        assert!(controller.link().written.is_empty());
    }

    #[test]
    fn test_operations_require_connection() {
        let mut controller = DeviceController::new(ScriptedLink::new(&[]));

        assert_eq!(controller.halt(), Err(ControllerError::NotConnected));
        assert_eq!(controller.disconnect(), Err(ControllerError::NotConnected));
        assert_eq!(
            controller.set_filters(&three_filters()),
            Err(ControllerError::NotConnected)
        );
        assert_eq!(controller.set_frequency(0), Err(ControllerError::NotConnected));
        assert_eq!(controller.get_frequency(), Err(ControllerError::NotConnected));
        assert_eq!(controller.download(), Err(ControllerError::NotConnected));
        assert_eq!(controller.save(0), Err(ControllerError::NotConnected));
        assert_eq!(controller.load(0), Err(ControllerError::NotConnected));
        assert!(controller.link().written.is_empty());
    }

    #[test]
    fn test_apply_takes_n_plus_two_exchanges() {
        let mut controller = connected(&[b"Apply", b"Filter", b"Filter", b"Filter", b"End filters"]);
        controller.set_filters(&three_filters()).unwrap();

        assert!(controller.is_running());
        // Handshake plus N + 2
        assert_eq!(controller.channel().exchanges(), 1 + 5);

        let written = &controller.link().written;
        assert_eq!(&written[1][..2], &[b'a', 3]);
        assert_eq!(&written[2][..9], &[b'f', 0, 0, 2, 0, 0, 0, 0, 0]);
        assert_eq!(&written[3][..9], &[b'f', 8, 2, 1, 0, 0, 0, 0, 0]);
        assert_eq!(written[5], b"a000000000000000".to_vec());
    }

    #[test]
    fn test_apply_aborts_on_bad_filter_ack() {
        let mut controller = connected(&[b"Apply", b"Filter", b"Error", b"Filter", b"End filters"]);
        let err = controller.set_filters(&three_filters()).unwrap_err();

        assert!(matches!(
            err,
            ControllerError::ProtocolMismatch { expected: "Filter", .. }
        ));
        // Begin, filter #1, filter #2; nothing after the bad reply
        assert_eq!(controller.channel().exchanges(), 1 + 3);
        assert_eq!(controller.link().written.len(), 4);
        assert!(!controller.is_running());
        assert!(controller.is_connected());
    }

    #[test]
    fn test_failed_apply_keeps_running_flag() {
        let mut controller = connected(&[
            b"Apply",
            b"End filters",
            b"Apply",
            b"Error: 2",
        ]);
        controller.set_filters(&[]).unwrap();
        assert!(controller.is_running());

        let err = controller.set_filters(&[]).unwrap_err();
        assert_eq!(err.device_error_code(), Some(2));
        assert!(controller.is_running());
    }

    #[test]
    fn test_apply_count_limit() {
        let filters = [FilterDefinition::output(); 256];
        let mut controller = connected(&[]);
        assert_eq!(
            controller.set_filters(&filters),
            Err(ControllerError::Range(RangeError::FilterCount(256)))
        );
        assert_eq!(controller.link().written.len(), 1);
    }

    #[test]
    fn test_frequency_range_checked_before_io() {
        let mut controller = connected(&[]);
        for hz in [0, 44_001, 70_000] {
            assert_eq!(
                controller.set_frequency(hz),
                Err(ControllerError::Range(RangeError::Frequency(hz)))
            );
        }
        assert_eq!(controller.link().written.len(), 1);
        assert_eq!(
            controller.last_error(),
            Some(&ControllerError::Range(RangeError::Frequency(70_000)))
        );
    }

    #[test]
    fn test_set_frequency_frame() {
        let mut controller = connected(&[b"Set"]);
        controller.set_frequency(8000).unwrap();
        assert_eq!(&controller.link().written[1][..6], b"s8000\0");
    }

    #[test]
    fn test_get_frequency_errors() {
        let mut controller = connected(&[b"Set", b"Get:abc"]);
        assert!(matches!(
            controller.get_frequency(),
            Err(ControllerError::ProtocolMismatch { expected: "Get:", .. })
        ));
        assert_eq!(
            controller.get_frequency(),
            Err(ControllerError::MalformedResponse(Malformed::BadNumber))
        );
    }

    #[test]
    fn test_download_two_records() {
        let mut controller = connected(&[b"Download:2", b"Download:  \"     ", b"Download:\"\"!     "]);
        let filters = controller.download().unwrap();

        assert_eq!(filters.len(), 2);
        assert_eq!(filters[0], FilterDefinition::input().with_outputs(&[2]).unwrap());
        assert_eq!(filters[1].kind(), FilterKind::Passthrough);
        assert_eq!(filters[1].id(), 2);
        assert_eq!(filters[1].outputs(), &[1, 0]);
        assert_eq!(controller.channel().exchanges(), 1 + 3);
    }

    #[test]
    fn test_download_failure_returns_nothing() {
        let mut controller = connected(&[b"Download:2", b"Download:  !     ", b""]);
        assert!(matches!(
            controller.download(),
            Err(ControllerError::ProtocolMismatch { expected: "Download:", .. })
        ));
    }

    #[test]
    fn test_block_range_checked_before_io() {
        let mut controller = connected(&[]);
        assert_eq!(
            controller.save(256),
            Err(ControllerError::Range(RangeError::Block(256)))
        );
        assert_eq!(
            controller.load(1000),
            Err(ControllerError::Range(RangeError::Block(1000)))
        );
        assert_eq!(controller.link().written.len(), 1);
    }

    #[test]
    fn test_save_and_load_frames() {
        let mut controller = connected(&[b"Saved", b"Loaded"]);
        controller.save(255).unwrap();
        controller.load(7).unwrap();

        assert_eq!(&controller.link().written[1][..2], &[b'x', 255]);
        assert_eq!(&controller.link().written[2][..2], &[b'z', 7]);
        assert!(!controller.is_running());
        assert_eq!(controller.state(), State::Connected);
    }

    #[test]
    fn test_load_keeps_running_state() {
        let mut controller = connected(&[b"Apply", b"End filters", b"Loaded"]);
        controller.set_filters(&[]).unwrap();
        controller.load(0).unwrap();
        assert_eq!(controller.state(), State::Running);
    }

    #[test]
    fn test_clear_error() {
        let mut controller = connected(&[b"Nope"]);
        assert!(controller.halt().is_err());
        assert!(controller.last_error().is_some());

        controller.clear_error();
        assert_eq!(controller.last_error(), None);
    }

    #[test]
    fn test_halt_clears_running() {
        let mut controller = connected(&[b"Apply", b"End filters", b"Halt"]);
        controller.set_filters(&[]).unwrap();
        controller.halt().unwrap();
        assert_eq!(controller.state(), State::Halted);
        assert!(!controller.is_running());
    }

    #[test]
    fn test_disconnect_closes_link() {
        let mut controller = connected(&[]);
        controller.disconnect().unwrap();
        assert!(!controller.link().is_open());
        assert_eq!(controller.state(), State::Disconnected);
        assert_eq!(controller.halt(), Err(ControllerError::NotConnected));
    }

    #[test]
    fn test_link_lost_disconnects() {
        let mut controller = connected(&[]);
        controller.link_mut().open = false;

        assert_eq!(controller.get_frequency(), Err(ControllerError::NotConnected));
        assert_eq!(controller.state(), State::Disconnected);
    }

    #[test]
    fn test_storage_block() {
        assert_eq!(StorageBlock::new(255).map(StorageBlock::index), Ok(255));
        assert_eq!(StorageBlock::try_from(256), Err(RangeError::Block(256)));
    }

    // End to end against the firmware simulator

    #[test]
    fn test_sim_frequency_echo() {
        let mut controller = DeviceController::new(SimulatedDevice::new());
        controller.connect().unwrap();

        for hz in [1, 44_000, 8_000] {
            controller.set_frequency(hz).unwrap();
            assert_eq!(controller.get_frequency(), Ok(hz));
        }
    }

    #[test]
    fn test_sim_apply_then_download() {
        let mut controller = DeviceController::new(SimulatedDevice::new());
        controller.connect().unwrap();

        let filters = three_filters();
        controller.set_filters(&filters).unwrap();
        let downloaded = controller.download().unwrap();
        assert_eq!(downloaded.as_slice(), &filters);
    }

    #[test]
    fn test_sim_long_chain_reads_back() {
        let mut controller = DeviceController::new(SimulatedDevice::new());
        controller.connect().unwrap();

        let mut filters = vec![FilterDefinition::input().with_outputs(&[2]).unwrap()];
        for id in 2..70u8 {
            let next = if id == 69 { 1 } else { id + 1 };
            filters.push(
                FilterDefinition::new(FilterKind::Zero, id)
                    .unwrap()
                    .with_outputs(&[next])
                    .unwrap(),
            );
        }
        filters.push(FilterDefinition::output());
        assert_eq!(filters.len(), 70);

        controller.set_filters(&filters).unwrap();
        let downloaded = controller.download().unwrap();
        assert_eq!(downloaded.as_slice(), filters.as_slice());
    }

    #[test]
    fn test_sim_boot_chain_is_passthrough() {
        let mut controller = DeviceController::new(SimulatedDevice::new());
        controller.connect().unwrap();
        let downloaded = controller.download().unwrap();
        assert_eq!(
            downloaded.as_slice(),
            &[FilterDefinition::input(), FilterDefinition::output()]
        );
    }

    #[test]
    fn test_sim_self_route_rejected() {
        let mut controller = DeviceController::new(SimulatedDevice::new());
        controller.connect().unwrap();

        let looped = [
            FilterDefinition::input().with_outputs(&[2]).unwrap(),
            FilterDefinition::new(FilterKind::Delay, 2)
                .unwrap()
                .with_outputs(&[1, 2])
                .unwrap(),
            FilterDefinition::output(),
        ];
        let err = controller.set_filters(&looped).unwrap_err();
        assert_eq!(err.device_error_code(), Some(4));
        assert!(!controller.is_running());
    }

    #[test]
    fn test_sim_save_load_cycle() {
        let mut controller = DeviceController::new(SimulatedDevice::new());
        controller.connect().unwrap();

        let filters = three_filters();
        controller.set_filters(&filters).unwrap();
        controller.save(3).unwrap();

        // Blocks are write-once
        let err = controller.save(3).unwrap_err();
        assert!(matches!(err, ControllerError::ProtocolMismatch { received, .. } if received.matches("Error")));

        controller.halt().unwrap();
        assert_eq!(controller.download().unwrap().len(), 2);

        controller.load(3).unwrap();
        assert!(!controller.is_running());
        assert_eq!(controller.state(), State::Halted);
        assert_eq!(controller.download().unwrap().as_slice(), &filters);
    }

    #[test]
    fn test_sim_block_errors() {
        let mut controller = DeviceController::new(SimulatedDevice::new());
        controller.connect().unwrap();

        let err = controller.load(0).unwrap_err();
        assert!(matches!(&err, ControllerError::ProtocolMismatch { received, .. } if received.matches("Block empty")));

        let err = controller.save(10).unwrap_err();
        assert!(matches!(&err, ControllerError::ProtocolMismatch { received, .. } if received.matches("ERROR")));
    }

    #[test]
    fn test_sim_unplugged_link_lost() {
        let mut controller = DeviceController::new(SimulatedDevice::new());
        controller.connect().unwrap();
        controller.link_mut().unplug();

        assert!(matches!(
            controller.halt(),
            Err(ControllerError::NotConnected)
        ));
        assert_eq!(controller.state(), State::Disconnected);
    }

    #[test]
    fn test_sim_silent_device_times_out() {
        let mut controller = DeviceController::new(SimulatedDevice::new());
        controller.connect().unwrap();
        controller.link_mut().set_muted(true);

        let err = controller.halt().unwrap_err();
        match err {
            ControllerError::ProtocolMismatch { expected, received } => {
                assert_eq!(expected, "Halt");
                assert!(received.is_empty());
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(controller.is_connected());
    }
}

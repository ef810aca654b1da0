//! Multi-frame exchanges as explicit state machines
//!
//! Uploading a chain and downloading one both take several
//! command/response round trips. The state machines here decide which
//! command goes next and judge each reply, without doing any I/O. The
//! caller loops:
//!
//! ```text
//! while let Some(cmd) = seq.next_command() {
//!     let reply = send(cmd);
//!     seq.accept(&reply)?;
//! }
//! ```
//!
//! The first bad reply moves the machine to `Aborted`; no further command
//! is produced. Nothing is retried and nothing is rolled back: the device
//! keeps whatever it had accepted so far.

use crate::filter::{FilterDefinition, FilterList, MAX_FILTERS};
use crate::frame::Response;
use crate::messages::{Command, ACK_APPLY, ACK_END_FILTERS, ACK_FILTER, PREFIX_DOWNLOAD};
use crate::record::decode_record;
use crate::reply::{expect_ack, expect_prefix, parse_decimal, Malformed, ReplyError};

/// Chain too long for the one-byte count in the begin frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TooManyFilters {
    pub count: usize,
}

/// Position in a chain upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ApplyStep {
    /// Send `'a'` + count, expect `"Apply"`
    Begin,
    /// Send filter `i`, expect `"Filter"`
    Filter(usize),
    /// Send `'a'`, expect `"End filters"`
    End,
    /// Every frame acknowledged
    Done,
    /// A reply did not match; nothing more is sent
    Aborted,
}

/// Chain upload: `Begin → Filter(0..N) → End → Done`
#[derive(Debug, Clone)]
pub struct ApplySequence<'a> {
    filters: &'a [FilterDefinition],
    step: ApplyStep,
    exchanges: usize,
}

impl<'a> ApplySequence<'a> {
    /// Start an upload of `filters`, in order
    pub fn new(filters: &'a [FilterDefinition]) -> Result<Self, TooManyFilters> {
        if filters.len() > u8::MAX as usize {
            return Err(TooManyFilters {
                count: filters.len(),
            });
        }
        Ok(Self {
            filters,
            step: ApplyStep::Begin,
            exchanges: 0,
        })
    }

    pub fn step(&self) -> ApplyStep {
        self.step
    }

    /// Replies accepted or rejected so far
    pub fn exchanges(&self) -> usize {
        self.exchanges
    }

    pub fn is_done(&self) -> bool {
        self.step == ApplyStep::Done
    }

    /// Total exchanges a successful upload takes (N + 2)
    pub fn total_exchanges(&self) -> usize {
        self.filters.len() + 2
    }

    /// The command to send in the current step
    pub fn next_command(&self) -> Option<Command<'a>> {
        match self.step {
            // Length checked in new()
            ApplyStep::Begin => Some(Command::BeginFilters {
                count: self.filters.len() as u8,
            }),
            ApplyStep::Filter(i) => Some(self.filters[i].to_command()),
            ApplyStep::End => Some(Command::EndFilters),
            ApplyStep::Done | ApplyStep::Aborted => None,
        }
    }

    /// Judge the reply to the current command and advance
    pub fn accept(&mut self, response: &Response) -> Result<(), ReplyError> {
        let expected = match self.step {
            ApplyStep::Begin => ACK_APPLY,
            ApplyStep::Filter(_) => ACK_FILTER,
            ApplyStep::End => ACK_END_FILTERS,
            ApplyStep::Done | ApplyStep::Aborted => return Err(ReplyError::Unsolicited),
        };
        self.exchanges += 1;

        if let Err(e) = expect_ack(response, expected) {
            self.step = ApplyStep::Aborted;
            return Err(e);
        }

        self.step = match self.step {
            ApplyStep::Begin => self.filter_step(0),
            ApplyStep::Filter(i) => self.filter_step(i + 1),
            _ => ApplyStep::Done,
        };
        Ok(())
    }

    fn filter_step(&self, index: usize) -> ApplyStep {
        if index < self.filters.len() {
            ApplyStep::Filter(index)
        } else {
            ApplyStep::End
        }
    }
}

/// Position in a chain download
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DownloadStep {
    /// Send `'d'`, expect `"Download:<count>"`
    Header,
    /// Send `'d'`, expect `"Download:<8 bytes>"` for record `index`
    Record { index: usize, count: usize },
    /// All records decoded
    Done,
    /// A reply was missing its prefix or could not be decoded
    Aborted,
}

/// Chain download: `Header → Record(0..N) → Done`
#[derive(Debug, Clone)]
pub struct DownloadSequence {
    step: DownloadStep,
    filters: FilterList,
    exchanges: usize,
}

impl Default for DownloadSequence {
    fn default() -> Self {
        Self::new()
    }
}

impl DownloadSequence {
    pub fn new() -> Self {
        Self {
            step: DownloadStep::Header,
            filters: FilterList::new(),
            exchanges: 0,
        }
    }

    pub fn step(&self) -> DownloadStep {
        self.step
    }

    pub fn exchanges(&self) -> usize {
        self.exchanges
    }

    pub fn is_done(&self) -> bool {
        self.step == DownloadStep::Done
    }

    /// Every step of a download sends the same command
    pub fn next_command(&self) -> Option<Command<'static>> {
        match self.step {
            DownloadStep::Header | DownloadStep::Record { .. } => Some(Command::Download),
            DownloadStep::Done | DownloadStep::Aborted => None,
        }
    }

    /// Judge and decode the reply to the current command
    pub fn accept(&mut self, response: &Response) -> Result<(), ReplyError> {
        if matches!(self.step, DownloadStep::Done | DownloadStep::Aborted) {
            return Err(ReplyError::Unsolicited);
        }
        self.exchanges += 1;

        match self.advance(response) {
            Ok(next) => {
                self.step = next;
                Ok(())
            }
            Err(e) => {
                self.step = DownloadStep::Aborted;
                self.filters.clear();
                Err(e)
            }
        }
    }

    fn advance(&mut self, response: &Response) -> Result<DownloadStep, ReplyError> {
        let body = expect_prefix(response, PREFIX_DOWNLOAD)?;

        match self.step {
            DownloadStep::Header => {
                let count = parse_decimal(body)?;
                if count as usize > MAX_FILTERS {
                    return Err(Malformed::TooManyFilters(count).into());
                }
                let count = count as usize;
                Ok(if count == 0 {
                    DownloadStep::Done
                } else {
                    DownloadStep::Record { index: 0, count }
                })
            }
            DownloadStep::Record { index, count } => {
                let raw = decode_record(body)?;
                let filter = FilterDefinition::from_raw(raw).map_err(Malformed::InvalidFilter)?;
                // Header step bounds count by the list capacity
                let _ = self.filters.push(filter);

                Ok(if index + 1 < count {
                    DownloadStep::Record {
                        index: index + 1,
                        count,
                    }
                } else {
                    DownloadStep::Done
                })
            }
            DownloadStep::Done | DownloadStep::Aborted => Err(ReplyError::Unsolicited),
        }
    }

    /// Decoded filters, once every record has arrived
    pub fn into_filters(self) -> Option<FilterList> {
        match self.step {
            DownloadStep::Done => Some(self.filters),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterKind;

    fn three_filters() -> [FilterDefinition; 3] {
        [
            FilterDefinition::input(),
            FilterDefinition::new(FilterKind::Delay, 2).unwrap(),
            FilterDefinition::output(),
        ]
    }

    fn ack(text: &str) -> Response {
        Response::from_bytes(text.as_bytes())
    }

    #[test]
    fn test_apply_happy_path() {
        let filters = three_filters();
        let mut seq = ApplySequence::new(&filters).unwrap();

        assert_eq!(
            seq.next_command(),
            Some(Command::BeginFilters { count: 3 })
        );
        seq.accept(&ack("Apply")).unwrap();

        for i in 0..3 {
            assert_eq!(seq.step(), ApplyStep::Filter(i));
            assert_eq!(seq.next_command(), Some(filters[i].to_command()));
            seq.accept(&ack("Filter")).unwrap();
        }

        assert_eq!(seq.next_command(), Some(Command::EndFilters));
        seq.accept(&ack("End filters")).unwrap();

        assert!(seq.is_done());
        assert_eq!(seq.next_command(), None);
        assert_eq!(seq.exchanges(), 5);
        assert_eq!(seq.total_exchanges(), 5);
    }

    #[test]
    fn test_apply_empty_goes_straight_to_end() {
        let mut seq = ApplySequence::new(&[]).unwrap();
        seq.accept(&ack("Apply")).unwrap();
        assert_eq!(seq.step(), ApplyStep::End);
        seq.accept(&ack("End filters")).unwrap();
        assert!(seq.is_done());
    }

    #[test]
    fn test_apply_aborts_on_first_mismatch() {
        let filters = three_filters();
        let mut seq = ApplySequence::new(&filters).unwrap();
        seq.accept(&ack("Apply")).unwrap();
        seq.accept(&ack("Filter")).unwrap();

        let err = seq.accept(&ack("Error")).unwrap_err();
        assert!(matches!(err, ReplyError::Mismatch { expected: "Filter", .. }));
        assert_eq!(seq.step(), ApplyStep::Aborted);
        assert_eq!(seq.next_command(), None);
        assert_eq!(seq.exchanges(), 3);
        assert_eq!(seq.accept(&ack("Filter")), Err(ReplyError::Unsolicited));
    }

    #[test]
    fn test_apply_device_rejects_chain() {
        let filters = three_filters();
        let mut seq = ApplySequence::new(&filters).unwrap();
        seq.accept(&ack("Apply")).unwrap();
        for _ in 0..3 {
            seq.accept(&ack("Filter")).unwrap();
        }
        let err = seq.accept(&ack("Error: 2")).unwrap_err();
        match err {
            ReplyError::Mismatch { expected, received } => {
                assert_eq!(expected, "End filters");
                assert_eq!(received.device_error_code(), Some(2));
            }
            _ => panic!("expected mismatch"),
        }
    }

    #[test]
    fn test_apply_count_limit() {
        let filters = [FilterDefinition::output(); 256];
        assert_eq!(
            ApplySequence::new(&filters).unwrap_err(),
            TooManyFilters { count: 256 }
        );
        assert!(ApplySequence::new(&filters[..255]).is_ok());
    }

    #[test]
    fn test_download_happy_path() {
        let mut seq = DownloadSequence::new();
        assert_eq!(seq.next_command(), Some(Command::Download));
        seq.accept(&ack("Download:2")).unwrap();
        assert_eq!(seq.step(), DownloadStep::Record { index: 0, count: 2 });

        // Input routed to Output
        seq.accept(&Response::from_bytes(b"Download:  !     ")).unwrap();
        // Output
        seq.accept(&Response::from_bytes(b"Download:!!      ")).unwrap();

        assert!(seq.is_done());
        assert_eq!(seq.exchanges(), 3);
        let filters = seq.into_filters().unwrap();
        assert_eq!(filters.len(), 2);
        assert_eq!(filters[0], FilterDefinition::input());
        assert_eq!(filters[1], FilterDefinition::output());
    }

    #[test]
    fn test_download_empty_chain() {
        let mut seq = DownloadSequence::new();
        seq.accept(&ack("Download:0")).unwrap();
        assert!(seq.is_done());
        assert_eq!(seq.into_filters().unwrap().len(), 0);
    }

    #[test]
    fn test_download_missing_prefix_aborts() {
        let mut seq = DownloadSequence::new();
        seq.accept(&ack("Download:2")).unwrap();
        let err = seq.accept(&ack("Noop")).unwrap_err();
        assert!(matches!(err, ReplyError::Mismatch { expected: "Download:", .. }));
        assert_eq!(seq.next_command(), None);
        assert!(seq.into_filters().is_none());
    }

    #[test]
    fn test_download_bad_header() {
        let mut seq = DownloadSequence::new();
        assert_eq!(
            seq.accept(&ack("Download:two")),
            Err(ReplyError::Malformed(Malformed::BadNumber))
        );

        let mut seq = DownloadSequence::new();
        assert_eq!(
            seq.accept(&ack("Download:256")),
            Err(ReplyError::Malformed(Malformed::TooManyFilters(256)))
        );
    }

    #[test]
    fn test_download_full_byte_count() {
        let record = crate::record::encode_record(&FilterDefinition::output().to_raw()).unwrap();
        let mut line = heapless::Vec::<u8, 32>::new();
        line.extend_from_slice(b"Download:").unwrap();
        line.extend_from_slice(&record).unwrap();

        let mut seq = DownloadSequence::new();
        seq.accept(&ack("Download:255")).unwrap();
        for _ in 0..255 {
            seq.accept(&Response::from_bytes(&line)).unwrap();
        }
        assert!(seq.is_done());
        assert_eq!(seq.exchanges(), 256);
        assert_eq!(seq.into_filters().unwrap().len(), 255);
    }

    #[test]
    fn test_download_bad_record() {
        let mut seq = DownloadSequence::new();
        seq.accept(&ack("Download:1")).unwrap();
        assert_eq!(
            seq.accept(&ack("Download:  !")),
            Err(ReplyError::Malformed(Malformed::BadRecordLength(3)))
        );
    }
}

//! Filter definitions
//!
//! A filter is one processing node of the device's chain. On the wire and
//! in device storage every filter is the same 8-byte record:
//!
//! ```text
//! [type][id][out0][out1][p0][p1][p2][p3]
//! ```
//!
//! Outputs are the ids of downstream filters (0 means "none"; the Input
//! filter is never a downstream target). Parameters are filter-specific.

use heapless::Vec;

use crate::messages::{Command, OUTPUT_SLOTS, PARAM_SLOTS};
use crate::record::RECORD_LEN;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Largest raw value that survives the +32 download offset
pub const MAX_WIRE_VALUE: u8 = 223;

/// Id of the Input filter
pub const INPUT_ID: u8 = 0;

/// Id of the Output filter
pub const OUTPUT_ID: u8 = 1;

/// First id available to user filters
pub const FIRST_USER_ID: u8 = 2;

/// Maximum filters a chain or download can hold
///
/// The begin-upload frame carries the count in one byte, so no chain the
/// client can upload is longer than this.
pub const MAX_FILTERS: usize = u8::MAX as usize;

/// A decoded sequence of filters, in device order
pub type FilterList = Vec<FilterDefinition, MAX_FILTERS>;

/// Errors from building or editing a filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FilterError {
    /// Type id outside the filter catalog
    UnknownKind(u8),
    /// Id does not fit the kind (Input must be 0, Output 1, others 2-223)
    InvalidId(u8),
    /// Output or parameter value above [`MAX_WIRE_VALUE`]
    ValueOutOfRange(u8),
    /// More than two outputs supplied
    TooManyOutputs,
    /// More than four parameters supplied
    TooManyParams,
    /// Slot index past the end of outputs or params
    SlotOutOfRange(usize),
    /// A comma-separated byte list could not be parsed
    InvalidList,
}

/// Filter types implemented by the device firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(u8)]
pub enum FilterKind {
    /// ADC sample source; always present, id 0
    Input = 0,
    /// DAC sink; always present, id 1
    Output = 1,
    Passthrough = 2,
    Zero = 3,
    Max = 4,
    Min = 5,
    SineGenerator = 6,
    Reverb = 7,
    Delay = 8,
    Mix = 9,
    Tremolo = 10,
    Flange = 11,
    UpwardCompressor = 12,
    DownwardCompressor = 13,
    NBitsQuantizer = 14,
    Distortion = 15,
    TriangleGenerator = 16,
    NoiseReduction = 17,
    AecLowPass = 18,
    AecHighPass = 19,
    AecAllPass = 20,
}

impl FilterKind {
    /// Every kind, indexed by type id
    pub const ALL: [FilterKind; 21] = [
        FilterKind::Input,
        FilterKind::Output,
        FilterKind::Passthrough,
        FilterKind::Zero,
        FilterKind::Max,
        FilterKind::Min,
        FilterKind::SineGenerator,
        FilterKind::Reverb,
        FilterKind::Delay,
        FilterKind::Mix,
        FilterKind::Tremolo,
        FilterKind::Flange,
        FilterKind::UpwardCompressor,
        FilterKind::DownwardCompressor,
        FilterKind::NBitsQuantizer,
        FilterKind::Distortion,
        FilterKind::TriangleGenerator,
        FilterKind::NoiseReduction,
        FilterKind::AecLowPass,
        FilterKind::AecHighPass,
        FilterKind::AecAllPass,
    ];

    /// Wire type id
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Look up a kind by wire type id
    pub fn from_u8(value: u8) -> Option<Self> {
        Self::ALL.get(value as usize).copied()
    }

    /// Human-readable name, as shown to users
    pub fn name(self) -> &'static str {
        match self {
            FilterKind::Input => "Input",
            FilterKind::Output => "Output",
            FilterKind::Passthrough => "Passthrough",
            FilterKind::Zero => "Zero",
            FilterKind::Max => "Max",
            FilterKind::Min => "Min",
            FilterKind::SineGenerator => "Sine Generator",
            FilterKind::Reverb => "Reverb",
            FilterKind::Delay => "Delay",
            FilterKind::Mix => "Mix",
            FilterKind::Tremolo => "Tremolo",
            FilterKind::Flange => "Flange",
            FilterKind::UpwardCompressor => "Upward Compressor",
            FilterKind::DownwardCompressor => "Downward Compressor",
            FilterKind::NBitsQuantizer => "N-bits Quantizer",
            FilterKind::Distortion => "Distortion",
            FilterKind::TriangleGenerator => "Triangle Generator",
            FilterKind::NoiseReduction => "Noise Reduction",
            FilterKind::AecLowPass => "AEC Low Pass",
            FilterKind::AecHighPass => "AEC High Pass",
            FilterKind::AecAllPass => "AEC All Pass",
        }
    }

    /// Look up a kind by name, ignoring case, spaces, dashes and underscores
    ///
    /// `"sine generator"`, `"SineGenerator"` and `"sine-generator"` all match.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| loose_eq(kind.name(), name))
    }

    /// Input and Output are fixed members of every chain
    pub fn is_reserved(self) -> bool {
        matches!(self, FilterKind::Input | FilterKind::Output)
    }

    /// Kinds a user can add to a chain
    pub fn selectable() -> impl Iterator<Item = FilterKind> {
        Self::ALL.iter().copied().filter(|k| !k.is_reserved())
    }
}

impl core::fmt::Display for FilterKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

fn loose_eq(a: &str, b: &str) -> bool {
    let significant = |c: &char| !matches!(c, ' ' | '-' | '_');
    let mut a = a.chars().filter(significant);
    let mut b = b.chars().filter(significant);
    loop {
        match (a.next(), b.next()) {
            (None, None) => return true,
            (Some(x), Some(y)) if x.eq_ignore_ascii_case(&y) => {}
            _ => return false,
        }
    }
}

/// One filter of a chain
///
/// Fields are validated on every construction and edit, so a value of this
/// type always encodes to a frame the device accepts and decodes back
/// unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FilterDefinition {
    kind: FilterKind,
    id: u8,
    outputs: [u8; OUTPUT_SLOTS],
    params: [u8; PARAM_SLOTS],
}

impl FilterDefinition {
    /// Create a filter with all outputs and params set to 0
    pub fn new(kind: FilterKind, id: u8) -> Result<Self, FilterError> {
        check_id(kind, id)?;
        Ok(Self {
            kind,
            id,
            outputs: [0; OUTPUT_SLOTS],
            params: [0; PARAM_SLOTS],
        })
    }

    /// The chain's Input filter, routed to the Output filter
    pub fn input() -> Self {
        Self {
            kind: FilterKind::Input,
            id: INPUT_ID,
            outputs: [OUTPUT_ID, 0],
            params: [0; PARAM_SLOTS],
        }
    }

    /// The chain's Output filter
    pub fn output() -> Self {
        Self {
            kind: FilterKind::Output,
            id: OUTPUT_ID,
            outputs: [0; OUTPUT_SLOTS],
            params: [0; PARAM_SLOTS],
        }
    }

    /// Builder form of [`set_outputs`](Self::set_outputs)
    pub fn with_outputs(mut self, outputs: &[u8]) -> Result<Self, FilterError> {
        self.set_outputs(outputs)?;
        Ok(self)
    }

    /// Builder form of [`set_params`](Self::set_params)
    pub fn with_params(mut self, params: &[u8]) -> Result<Self, FilterError> {
        self.set_params(params)?;
        Ok(self)
    }

    /// Replace the outputs; up to two ids, missing slots become 0
    pub fn set_outputs(&mut self, outputs: &[u8]) -> Result<(), FilterError> {
        if outputs.len() > OUTPUT_SLOTS {
            return Err(FilterError::TooManyOutputs);
        }
        check_values(outputs)?;
        self.outputs = [0; OUTPUT_SLOTS];
        self.outputs[..outputs.len()].copy_from_slice(outputs);
        Ok(())
    }

    /// Replace the params; up to four values, missing slots become 0
    pub fn set_params(&mut self, params: &[u8]) -> Result<(), FilterError> {
        if params.len() > PARAM_SLOTS {
            return Err(FilterError::TooManyParams);
        }
        check_values(params)?;
        self.params = [0; PARAM_SLOTS];
        self.params[..params.len()].copy_from_slice(params);
        Ok(())
    }

    /// Set a single output slot
    pub fn set_output(&mut self, slot: usize, value: u8) -> Result<(), FilterError> {
        check_values(&[value])?;
        let target = self
            .outputs
            .get_mut(slot)
            .ok_or(FilterError::SlotOutOfRange(slot))?;
        *target = value;
        Ok(())
    }

    /// Set a single parameter slot
    pub fn set_param(&mut self, slot: usize, value: u8) -> Result<(), FilterError> {
        check_values(&[value])?;
        let target = self
            .params
            .get_mut(slot)
            .ok_or(FilterError::SlotOutOfRange(slot))?;
        *target = value;
        Ok(())
    }

    pub fn kind(&self) -> FilterKind {
        self.kind
    }

    /// Wire type id
    pub fn type_id(&self) -> u8 {
        self.kind.as_u8()
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn outputs(&self) -> &[u8; OUTPUT_SLOTS] {
        &self.outputs
    }

    pub fn params(&self) -> &[u8; PARAM_SLOTS] {
        &self.params
    }

    /// The `'f'` command that uploads this filter
    ///
    /// Both outputs and all four params are always sent, so unset slots
    /// reach the device as 0 rather than as frame padding.
    pub fn to_command(&self) -> Command<'_> {
        Command::Filter {
            type_id: self.type_id(),
            id: self.id,
            outputs: &self.outputs,
            params: &self.params,
        }
    }

    /// The 8-byte storage record of this filter
    pub fn to_raw(&self) -> [u8; RECORD_LEN] {
        [
            self.type_id(),
            self.id,
            self.outputs[0],
            self.outputs[1],
            self.params[0],
            self.params[1],
            self.params[2],
            self.params[3],
        ]
    }

    /// Rebuild a filter from an 8-byte storage record
    pub fn from_raw(raw: [u8; RECORD_LEN]) -> Result<Self, FilterError> {
        let kind = FilterKind::from_u8(raw[0]).ok_or(FilterError::UnknownKind(raw[0]))?;
        Self::new(kind, raw[1])?
            .with_outputs(&raw[2..4])?
            .with_params(&raw[4..8])
    }
}

fn check_id(kind: FilterKind, id: u8) -> Result<(), FilterError> {
    let valid = match kind {
        FilterKind::Input => id == INPUT_ID,
        FilterKind::Output => id == OUTPUT_ID,
        _ => (FIRST_USER_ID..=MAX_WIRE_VALUE).contains(&id),
    };
    if valid {
        Ok(())
    } else {
        Err(FilterError::InvalidId(id))
    }
}

fn check_values(values: &[u8]) -> Result<(), FilterError> {
    match values.iter().find(|&&v| v > MAX_WIRE_VALUE) {
        Some(&v) => Err(FilterError::ValueOutOfRange(v)),
        None => Ok(()),
    }
}

/// Parse a comma-separated list of byte values, e.g. `"10,20,0,0"`
///
/// An empty (or all-whitespace) string yields an empty list. Values must
/// be in 0-223.
pub fn parse_byte_list<const N: usize>(text: &str) -> Result<Vec<u8, N>, FilterError> {
    let mut list = Vec::new();
    if text.trim().is_empty() {
        return Ok(list);
    }

    for item in text.split(',') {
        let value: u16 = item.trim().parse().map_err(|_| FilterError::InvalidList)?;
        let value = u8::try_from(value).map_err(|_| FilterError::InvalidList)?;
        check_values(&[value])?;
        list.push(value).map_err(|_| FilterError::InvalidList)?;
    }
    Ok(list)
}

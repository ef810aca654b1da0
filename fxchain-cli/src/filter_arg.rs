//! `--filter` argument syntax
//!
//! `KIND:ID[:OUTPUTS[:PARAMS]]`, for example `reverb:2:1:40,10` or
//! `sine-generator:3::120`. KIND is a catalog name (case, spaces, dashes
//! and underscores ignored) or a numeric type id. OUTPUTS and PARAMS are
//! comma-separated values in 0-223; missing slots are 0.

use std::str::FromStr;

use fxchain_core::{ChainError, FilterChain};
use fxchain_protocol::filter::{INPUT_ID, OUTPUT_ID};
use fxchain_protocol::{parse_byte_list, FilterDefinition, FilterError, FilterKind};
use thiserror::Error;

/// Why a `--filter` value was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterArgError {
    #[error("expected KIND:ID[:OUTPUTS[:PARAMS]]")]
    Syntax,
    #[error("unknown filter kind \"{0}\" (see `fxchain kinds`)")]
    UnknownKind(String),
    #[error("bad filter id \"{0}\"")]
    BadId(String),
    #[error("invalid filter: {0:?}")]
    Filter(FilterError),
}

impl From<FilterError> for FilterArgError {
    fn from(e: FilterError) -> Self {
        FilterArgError::Filter(e)
    }
}

/// One parsed `--filter` value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterArg(pub FilterDefinition);

impl FromStr for FilterArg {
    type Err = FilterArgError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(':');
        let kind = parts.next().map(str::trim).filter(|k| !k.is_empty());
        let id = parts.next().map(str::trim);
        let outputs = parts.next().unwrap_or("");
        let params = parts.next().unwrap_or("");
        if parts.next().is_some() {
            return Err(FilterArgError::Syntax);
        }
        let (Some(kind), Some(id)) = (kind, id) else {
            return Err(FilterArgError::Syntax);
        };

        let kind = parse_kind(kind)?;
        let id: u8 = id.parse().map_err(|_| FilterArgError::BadId(id.into()))?;
        let outputs = parse_byte_list::<2>(outputs)?;
        let params = parse_byte_list::<4>(params)?;

        let filter = FilterDefinition::new(kind, id)?
            .with_outputs(&outputs)?
            .with_params(&params)?;
        Ok(FilterArg(filter))
    }
}

fn parse_kind(text: &str) -> Result<FilterKind, FilterArgError> {
    let by_number = text.parse::<u8>().ok().and_then(FilterKind::from_u8);
    by_number
        .or_else(|| FilterKind::from_name(text))
        .ok_or_else(|| FilterArgError::UnknownKind(text.into()))
}

/// Assemble the chain to upload from `--filter` values
///
/// Input and Output may be given explicitly. When missing, an Input routed
/// to the first user filter (or to Output if there is none) is put first
/// and Output is appended.
pub fn build_chain(args: &[FilterArg]) -> Result<FilterChain, ChainError> {
    let mut list: Vec<FilterDefinition> = Vec::with_capacity(args.len() + 2);

    if !args.iter().any(|a| a.0.id() == INPUT_ID) {
        let first = args
            .iter()
            .map(|a| a.0.id())
            .find(|&id| id != OUTPUT_ID)
            .unwrap_or(OUTPUT_ID);
        let mut input = FilterDefinition::input();
        // Any user id is a valid output value
        let _ = input.set_outputs(&[first]);
        list.push(input);
    }
    list.extend(args.iter().map(|a| a.0));
    if !args.iter().any(|a| a.0.id() == OUTPUT_ID) {
        list.push(FilterDefinition::output());
    }

    FilterChain::from_definitions(&list)
}

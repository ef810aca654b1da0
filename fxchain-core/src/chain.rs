//! Editable filter chain
//!
//! The caller-side model of what gets uploaded. A chain always holds the
//! Input filter first and exactly one Output filter; every other filter is
//! added and removed by id. New ids come from a counter starting at 2 that
//! never hands out the same id twice, so a removed filter's id is not
//! silently reused by the next one added.

use fxchain_protocol::filter::{FIRST_USER_ID, INPUT_ID, OUTPUT_ID};
use fxchain_protocol::{FilterDefinition, FilterKind, FilterList, MAX_WIRE_VALUE};

/// Errors from building or editing a chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChainError {
    /// Input and Output cannot be added
    ReservedKind(FilterKind),
    /// Input and Output cannot be removed
    Protected(u8),
    /// No filter with this id
    NotFound(u8),
    /// Every id up to 223 has been handed out
    IdsExhausted,
    /// Chain capacity reached
    Full,
    /// First filter is missing or is not Input
    InputNotFirst,
    /// No Output filter in the list
    MissingOutput,
    /// Two filters share an id
    DuplicateId(u8),
}

/// Ordered filter chain with fixed Input and Output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterChain {
    filters: FilterList,
    next_id: u16,
}

impl Default for FilterChain {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterChain {
    /// `[Input -> Output, Output]`, the device's passthrough chain
    pub fn new() -> Self {
        let mut filters = FilterList::new();
        // Capacity is well above two
        let _ = filters.push(FilterDefinition::input());
        let _ = filters.push(FilterDefinition::output());
        Self {
            filters,
            next_id: FIRST_USER_ID as u16,
        }
    }

    /// Build a chain from a decoded list, e.g. a download
    pub fn from_definitions(list: &[FilterDefinition]) -> Result<Self, ChainError> {
        match list.first() {
            Some(first) if first.id() == INPUT_ID => {}
            _ => return Err(ChainError::InputNotFirst),
        }

        let mut filters = FilterList::new();
        for filter in list {
            if filters.iter().any(|f| f.id() == filter.id()) {
                return Err(ChainError::DuplicateId(filter.id()));
            }
            filters.push(*filter).map_err(|_| ChainError::Full)?;
        }

        if !filters.iter().any(|f| f.id() == OUTPUT_ID) {
            return Err(ChainError::MissingOutput);
        }

        let highest = filters.iter().map(|f| f.id()).max().unwrap_or(OUTPUT_ID);
        Ok(Self {
            filters,
            next_id: (highest as u16 + 1).max(FIRST_USER_ID as u16),
        })
    }

    /// Append a filter of `kind` with default outputs and params
    ///
    /// Returns the id it was given.
    pub fn add(&mut self, kind: FilterKind) -> Result<u8, ChainError> {
        if kind.is_reserved() {
            return Err(ChainError::ReservedKind(kind));
        }
        if self.filters.is_full() {
            return Err(ChainError::Full);
        }

        let id = u8::try_from(self.next_id)
            .ok()
            .filter(|&id| id <= MAX_WIRE_VALUE)
            .ok_or(ChainError::IdsExhausted)?;
        let filter = FilterDefinition::new(kind, id).map_err(|_| ChainError::IdsExhausted)?;

        self.filters.push(filter).map_err(|_| ChainError::Full)?;
        self.next_id += 1;
        Ok(id)
    }

    /// Remove the filter with `id`, returning it
    pub fn remove(&mut self, id: u8) -> Result<FilterDefinition, ChainError> {
        if id == INPUT_ID || id == OUTPUT_ID {
            return Err(ChainError::Protected(id));
        }
        let index = self.position(id).ok_or(ChainError::NotFound(id))?;
        Ok(self.filters.remove(index))
    }

    pub fn get(&self, id: u8) -> Option<&FilterDefinition> {
        self.filters.iter().find(|f| f.id() == id)
    }

    /// Mutable access for editing outputs and params
    ///
    /// The id and kind of a [`FilterDefinition`] cannot be changed through
    /// it, so the chain invariants hold across edits.
    pub fn get_mut(&mut self, id: u8) -> Option<&mut FilterDefinition> {
        self.filters.iter_mut().find(|f| f.id() == id)
    }

    /// Filters in upload order
    pub fn as_slice(&self) -> &[FilterDefinition] {
        &self.filters
    }

    pub fn iter(&self) -> core::slice::Iter<'_, FilterDefinition> {
        self.filters.iter()
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// Always false; kept for the `len`/`is_empty` pair
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    fn position(&self, id: u8) -> Option<usize> {
        self.filters.iter().position(|f| f.id() == id)
    }
}

impl<'a> IntoIterator for &'a FilterChain {
    type Item = &'a FilterDefinition;
    type IntoIter = core::slice::Iter<'a, FilterDefinition>;

    fn into_iter(self) -> Self::IntoIter {
        self.filters.iter()
    }
}

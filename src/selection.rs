//! Dataspaces and hyperslab selections.
//!
//! A [`Dataspace`] declares the shape of an array, either a dataset in the store or a buffer in
//! memory. A [`Hyperslab`] selects a run of rows `[offset, offset + extent)` along dimension 0
//! of a dataspace and the full range of every other dimension. Row-major storage makes every
//! hyperslab one contiguous run of elements.
//!
//! A dataspace's element count always fits in a `u64`, so counts and linear indices derived from
//! it never overflow.

use crate::error::{Error, Result};
use log::debug;
use std::fmt;

/// The shape of an array. A dataspace with no dimensions is a scalar holding one element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataspace {
    shape: Vec<u64>,
}

impl Dataspace {
    /// A dataspace holding one element.
    pub fn scalar() -> Self {
        Self { shape: Vec::new() }
    }

    /// A row-major array of the given shape.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the element count of one row or of the whole array does
    /// not fit in a `u64`.
    pub fn simple(shape: &[u64]) -> Result<Self> {
        let fits = shape
            .iter()
            .skip(1)
            .try_fold(1u64, |acc, &dim| acc.checked_mul(dim))
            .and_then(|row_len| row_len.checked_mul(shape.first().copied().unwrap_or(1)))
            .is_some();
        if !fits {
            return Err(Error::InvalidConfig(format!(
                "dataspace {shape:?} holds more than {} elements",
                u64::MAX
            )));
        }
        debug!("Creating dataspace {:?}", shape);
        Ok(Self {
            shape: shape.to_vec(),
        })
    }

    pub fn shape(&self) -> &[u64] {
        &self.shape
    }

    pub fn is_scalar(&self) -> bool {
        self.shape.is_empty()
    }

    /// Total number of elements.
    pub fn element_count(&self) -> u64 {
        self.shape.iter().product()
    }

    /// Number of rows along the partitioned dimension. A scalar has one row.
    pub fn rows(&self) -> u64 {
        self.shape.first().copied().unwrap_or(1)
    }

    /// Number of elements in one row.
    pub fn row_len(&self) -> u64 {
        self.shape.iter().skip(1).product()
    }

    /// Select every element of the dataspace.
    pub fn select_all(&self) -> Hyperslab<'_> {
        Hyperslab {
            space: self,
            offset: 0,
            extent: self.rows(),
        }
    }

    /// Select rows `[offset, offset + extent)`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfBounds`] if the rows lie beyond the end of dimension 0.
    pub fn select(&self, offset: u64, extent: u64) -> Result<Hyperslab<'_>> {
        let bound = self.rows();
        let in_bounds = offset
            .checked_add(extent)
            .is_some_and(|end| end <= bound && !(self.is_scalar() && offset != 0));
        if !in_bounds {
            return Err(Error::OutOfBounds {
                offset,
                extent,
                bound,
            });
        }
        debug!("Selecting rows [{}, {}) of {:?}", offset, offset + extent, self.shape);
        Ok(Hyperslab {
            space: self,
            offset,
            extent,
        })
    }

    /// Row-major linear index of `index`, or `None` if it lies outside the dataspace.
    pub fn linear_index(&self, index: &[u64]) -> Option<u64> {
        if index.len() != self.shape.len() {
            return None;
        }
        index
            .iter()
            .zip(&self.shape)
            .try_fold(0u64, |acc, (&i, &dim)| (i < dim).then(|| acc * dim + i))
    }
}

/// Select rows `[offset, offset + extent)` of `space`.
pub fn select(space: &Dataspace, offset: u64, extent: u64) -> Result<Hyperslab<'_>> {
    space.select(offset, extent)
}

/// A run of rows selected in a [`Dataspace`].
#[derive(Debug, Clone, Copy)]
pub struct Hyperslab<'s> {
    space: &'s Dataspace,
    offset: u64,
    extent: u64,
}

impl<'s> Hyperslab<'s> {
    pub fn space(&self) -> &'s Dataspace {
        self.space
    }

    /// First selected row.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Number of selected rows.
    pub fn extent(&self) -> u64 {
        self.extent
    }

    /// Number of selected elements.
    pub fn element_count(&self) -> u64 {
        self.extent * self.space.row_len()
    }

    /// The selected elements as a half-open range of row-major linear indices.
    pub fn linear_range(&self) -> std::ops::Range<u64> {
        let row_len = self.space.row_len();
        self.offset * row_len..(self.offset + self.extent) * row_len
    }
}

impl fmt::Display for Hyperslab<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rows [{}, {}) of {:?}",
            self.offset,
            self.offset + self.extent,
            self.space.shape
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_past_the_end_is_out_of_bounds() {
        let space = Dataspace::simple(&[6]).unwrap();
        let err = select(&space, 5, 3).unwrap_err();
        assert!(matches!(
            err,
            Error::OutOfBounds {
                offset: 5,
                extent: 3,
                bound: 6
            }
        ));
        assert_eq!(err.kind(), "OutOfBoundsError");
    }

    #[test]
    fn region_ending_at_the_bound_is_accepted() {
        let space = Dataspace::simple(&[6]).unwrap();
        let slab = select(&space, 3, 3).unwrap();
        assert_eq!(slab.linear_range(), 3..6);
        assert_eq!(slab.element_count(), 3);
    }

    #[test]
    fn empty_region_is_accepted_anywhere_in_bounds() {
        let space = Dataspace::simple(&[6]).unwrap();
        assert_eq!(select(&space, 6, 0).unwrap().element_count(), 0);
        assert!(select(&space, 7, 0).is_err());
    }

    #[test]
    fn overflowing_region_is_out_of_bounds() {
        let space = Dataspace::simple(&[6]).unwrap();
        assert!(select(&space, u64::MAX, 2).is_err());
    }

    #[test]
    fn rows_span_every_column() {
        let space = Dataspace::simple(&[4, 5]).unwrap();
        let slab = space.select(1, 2).unwrap();
        assert_eq!(slab.linear_range(), 5..15);
        assert_eq!(space.select_all().element_count(), 20);
    }

    #[test]
    fn linear_index_is_row_major() {
        let space = Dataspace::simple(&[4, 5]).unwrap();
        assert_eq!(space.linear_index(&[0, 0]), Some(0));
        assert_eq!(space.linear_index(&[2, 3]), Some(13));
        assert_eq!(space.linear_index(&[4, 0]), None);
        assert_eq!(space.linear_index(&[1]), None);
    }

    #[test]
    fn shapes_with_too_many_elements_are_rejected() {
        let err = Dataspace::simple(&[u64::MAX, 2]).unwrap_err();
        assert_eq!(err.kind(), "ConfigurationError");
        assert!(Dataspace::simple(&[0, u64::MAX, 2]).is_err());
        assert!(Dataspace::simple(&[1 << 32, 1 << 32]).is_err());

        let space = Dataspace::simple(&[u64::MAX, 1]).unwrap();
        let slab = space.select(0, u64::MAX).unwrap();
        assert_eq!(slab.element_count(), u64::MAX);
        assert_eq!(slab.linear_range(), 0..u64::MAX);
    }

    #[test]
    fn scalar_holds_one_element() {
        let space = Dataspace::scalar();
        assert_eq!(space.element_count(), 1);
        assert_eq!(space.select_all().linear_range(), 0..1);
        assert_eq!(space.linear_index(&[]), Some(0));
    }
}

//! Dense single-precision valuation cubes.
//!
//! A cube is addressed by `(id, date, sample, depth)` where the id is a trade
//! or netting set identifier. Values are stored as `f32`, trading accuracy for
//! memory on large simulations.
//!
//! # Memory Layout
//!
//! Storage is sample-major so that every Monte Carlo sample owns one
//! contiguous block:
//!
//! ```text
//! sample 0: [id0: date0 [d0 d1 ..], date1 [..], ..] [id1: ..] ..
//! sample 1: ...
//! ```
//!
//! The valuation engine hands each block to a different worker, so cube
//! writes never need a lock.
//!
//! # Examples
//!
//! ```
//! use chrono::NaiveDate;
//! use xva_cube::{NpvCube, SinglePrecisionCube};
//!
//! let asof = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
//! let dates = vec![
//!     NaiveDate::from_ymd_opt(2024, 4, 2).unwrap(),
//!     NaiveDate::from_ymd_opt(2024, 7, 2).unwrap(),
//! ];
//! let ids = vec!["T1".to_string(), "T2".to_string()];
//!
//! let mut cube = SinglePrecisionCube::new(asof, ids, dates, 10, 0.0).unwrap();
//! cube.set(1, 0, 3, 0, 125.5).unwrap();
//!
//! assert_eq!(cube.get(1, 0, 3, 0).unwrap(), 125.5);
//! assert_eq!(cube.get(0, 1, 9, 0).unwrap(), 0.0);
//! ```

use std::collections::HashMap;

use chrono::NaiveDate;

use crate::error::{CubeAxis, CubeError};

/// Read/write access shared by all cube variants.
pub trait NpvCube {
    /// Valuation (as-of) date of the simulation.
    fn asof(&self) -> NaiveDate;

    /// Entity ids in allocation order.
    fn ids(&self) -> &[String];

    /// Valuation dates in increasing order.
    fn dates(&self) -> &[NaiveDate];

    /// Number of Monte Carlo samples.
    fn samples(&self) -> usize;

    /// Number of values stored per cell.
    fn depth(&self) -> usize;

    /// Value every cell held at allocation.
    fn fill_value(&self) -> f64;

    /// Position of an id on the id axis.
    fn id_index(&self, id: &str) -> Result<usize, CubeError>;

    /// Reads a simulated value.
    fn get(&self, id: usize, date: usize, sample: usize, depth: usize) -> Result<f64, CubeError>;

    /// Overwrites a simulated value.
    fn set(
        &mut self,
        id: usize,
        date: usize,
        sample: usize,
        depth: usize,
        value: f64,
    ) -> Result<(), CubeError>;

    /// Reads a value at the as-of date.
    fn get_t0(&self, id: usize, depth: usize) -> Result<f64, CubeError>;

    /// Overwrites a value at the as-of date.
    fn set_t0(&mut self, id: usize, depth: usize, value: f64) -> Result<(), CubeError>;

    /// Number of entity ids.
    #[inline]
    fn num_ids(&self) -> usize {
        self.ids().len()
    }

    /// Number of valuation dates.
    #[inline]
    fn num_dates(&self) -> usize {
        self.dates().len()
    }

    /// Reads a simulated value by entity id.
    fn get_by_id(
        &self,
        id: &str,
        date: usize,
        sample: usize,
        depth: usize,
    ) -> Result<f64, CubeError> {
        let idx = self.id_index(id)?;
        self.get(idx, date, sample, depth)
    }

    /// Overwrites a simulated value by entity id.
    fn set_by_id(
        &mut self,
        id: &str,
        date: usize,
        sample: usize,
        depth: usize,
        value: f64,
    ) -> Result<(), CubeError> {
        let idx = self.id_index(id)?;
        self.set(idx, date, sample, depth, value)
    }
}

#[inline]
fn check_axis(axis: CubeAxis, index: usize, size: usize) -> Result<(), CubeError> {
    if index < size {
        Ok(())
    } else {
        Err(CubeError::IndexOutOfRange { axis, index, size })
    }
}

/// Shared storage behind both cube variants.
#[derive(Clone, Debug)]
struct CubeStorage {
    asof: NaiveDate,
    ids: Vec<String>,
    id_lookup: HashMap<String, usize>,
    dates: Vec<NaiveDate>,
    samples: usize,
    depth: usize,
    fill: f32,
    t0: Vec<f32>,
    data: Vec<f32>,
}

impl CubeStorage {
    fn new(
        asof: NaiveDate,
        ids: Vec<String>,
        dates: Vec<NaiveDate>,
        samples: usize,
        depth: usize,
        fill: f64,
    ) -> Result<Self, CubeError> {
        if depth == 0 {
            return Err(CubeError::InvalidDimensions(
                "depth must be at least 1".to_string(),
            ));
        }
        if dates.windows(2).any(|w| w[0] >= w[1]) {
            return Err(CubeError::InvalidDimensions(
                "dates must be strictly increasing".to_string(),
            ));
        }

        let mut id_lookup = HashMap::with_capacity(ids.len());
        for (i, id) in ids.iter().enumerate() {
            if id_lookup.insert(id.clone(), i).is_some() {
                return Err(CubeError::DuplicateId(id.clone()));
            }
        }

        let len = samples
            .checked_mul(ids.len())
            .and_then(|n| n.checked_mul(dates.len()))
            .and_then(|n| n.checked_mul(depth))
            .ok_or_else(|| {
                CubeError::InvalidDimensions("cube size overflows usize".to_string())
            })?;

        let fill = fill as f32;
        Ok(Self {
            asof,
            t0: vec![fill; ids.len() * depth],
            ids,
            id_lookup,
            dates,
            samples,
            depth,
            fill,
            data: vec![fill; len],
        })
    }

    #[inline]
    fn block_len(&self) -> usize {
        self.ids.len() * self.dates.len() * self.depth
    }

    #[inline]
    fn offset(
        &self,
        id: usize,
        date: usize,
        sample: usize,
        depth: usize,
    ) -> Result<usize, CubeError> {
        check_axis(CubeAxis::Id, id, self.ids.len())?;
        check_axis(CubeAxis::Date, date, self.dates.len())?;
        check_axis(CubeAxis::Sample, sample, self.samples)?;
        check_axis(CubeAxis::Depth, depth, self.depth)?;
        Ok(sample * self.block_len() + (id * self.dates.len() + date) * self.depth + depth)
    }

    #[inline]
    fn t0_offset(&self, id: usize, depth: usize) -> Result<usize, CubeError> {
        check_axis(CubeAxis::Id, id, self.ids.len())?;
        check_axis(CubeAxis::Depth, depth, self.depth)?;
        Ok(id * self.depth + depth)
    }

    fn id_index(&self, id: &str) -> Result<usize, CubeError> {
        self.id_lookup
            .get(id)
            .copied()
            .ok_or_else(|| CubeError::UnknownId(id.to_string()))
    }

    fn get(&self, id: usize, date: usize, sample: usize, depth: usize) -> Result<f64, CubeError> {
        let offset = self.offset(id, date, sample, depth)?;
        Ok(f64::from(self.data[offset]))
    }

    fn set(
        &mut self,
        id: usize,
        date: usize,
        sample: usize,
        depth: usize,
        value: f64,
    ) -> Result<(), CubeError> {
        let offset = self.offset(id, date, sample, depth)?;
        self.data[offset] = value as f32;
        Ok(())
    }

    fn get_t0(&self, id: usize, depth: usize) -> Result<f64, CubeError> {
        let offset = self.t0_offset(id, depth)?;
        Ok(f64::from(self.t0[offset]))
    }

    fn set_t0(&mut self, id: usize, depth: usize, value: f64) -> Result<(), CubeError> {
        let offset = self.t0_offset(id, depth)?;
        self.t0[offset] = value as f32;
        Ok(())
    }

    fn sample_blocks(&self) -> Vec<SampleBlock<'_>> {
        let (n_ids, n_dates, depth) = (self.ids.len(), self.dates.len(), self.depth);
        let block = self.block_len();
        if block == 0 {
            return (0..self.samples)
                .map(|_| SampleBlock {
                    data: &[],
                    n_ids,
                    n_dates,
                    depth,
                })
                .collect();
        }
        self.data
            .chunks(block)
            .map(|data| SampleBlock {
                data,
                n_ids,
                n_dates,
                depth,
            })
            .collect()
    }

    fn sample_blocks_mut(&mut self) -> Vec<SampleBlockMut<'_>> {
        let (n_ids, n_dates, depth) = (self.ids.len(), self.dates.len(), self.depth);
        let block = self.block_len();
        if block == 0 {
            return (0..self.samples)
                .map(|_| SampleBlockMut {
                    data: &mut [],
                    n_ids,
                    n_dates,
                    depth,
                })
                .collect();
        }
        self.data
            .chunks_mut(block)
            .map(|data| SampleBlockMut {
                data,
                n_ids,
                n_dates,
                depth,
            })
            .collect()
    }
}

macro_rules! delegate_npv_cube {
    ($ty:ty) => {
        impl NpvCube for $ty {
            #[inline]
            fn asof(&self) -> NaiveDate {
                self.storage.asof
            }

            #[inline]
            fn ids(&self) -> &[String] {
                &self.storage.ids
            }

            #[inline]
            fn dates(&self) -> &[NaiveDate] {
                &self.storage.dates
            }

            #[inline]
            fn samples(&self) -> usize {
                self.storage.samples
            }

            #[inline]
            fn depth(&self) -> usize {
                self.storage.depth
            }

            #[inline]
            fn fill_value(&self) -> f64 {
                f64::from(self.storage.fill)
            }

            fn id_index(&self, id: &str) -> Result<usize, CubeError> {
                self.storage.id_index(id)
            }

            #[inline]
            fn get(
                &self,
                id: usize,
                date: usize,
                sample: usize,
                depth: usize,
            ) -> Result<f64, CubeError> {
                self.storage.get(id, date, sample, depth)
            }

            #[inline]
            fn set(
                &mut self,
                id: usize,
                date: usize,
                sample: usize,
                depth: usize,
                value: f64,
            ) -> Result<(), CubeError> {
                self.storage.set(id, date, sample, depth, value)
            }

            fn get_t0(&self, id: usize, depth: usize) -> Result<f64, CubeError> {
                self.storage.get_t0(id, depth)
            }

            fn set_t0(&mut self, id: usize, depth: usize, value: f64) -> Result<(), CubeError> {
                self.storage.set_t0(id, depth, value)
            }
        }
    };
}

/// Cube holding a single value (the NPV) per cell.
#[derive(Clone, Debug)]
pub struct SinglePrecisionCube {
    storage: CubeStorage,
}

impl SinglePrecisionCube {
    /// Allocates a depth-1 cube with every cell set to `fill`.
    ///
    /// # Errors
    ///
    /// Returns `CubeError::DuplicateId` for repeated ids and
    /// `CubeError::InvalidDimensions` for unordered dates.
    pub fn new(
        asof: NaiveDate,
        ids: Vec<String>,
        dates: Vec<NaiveDate>,
        samples: usize,
        fill: f64,
    ) -> Result<Self, CubeError> {
        Ok(Self {
            storage: CubeStorage::new(asof, ids, dates, samples, 1, fill)?,
        })
    }
}

delegate_npv_cube!(SinglePrecisionCube);

/// Cube holding `depth` values per cell.
#[derive(Clone, Debug)]
pub struct SinglePrecisionCubeN {
    storage: CubeStorage,
}

impl SinglePrecisionCubeN {
    /// Allocates a depth-N cube with every cell set to `fill`.
    ///
    /// # Errors
    ///
    /// As [`SinglePrecisionCube::new`], plus `InvalidDimensions` for zero depth.
    pub fn new(
        asof: NaiveDate,
        ids: Vec<String>,
        dates: Vec<NaiveDate>,
        samples: usize,
        depth: usize,
        fill: f64,
    ) -> Result<Self, CubeError> {
        Ok(Self {
            storage: CubeStorage::new(asof, ids, dates, samples, depth, fill)?,
        })
    }
}

delegate_npv_cube!(SinglePrecisionCubeN);

/// Valuation cube selected by run configuration.
///
/// The variant is chosen once per run: depth 1 maps to
/// [`SinglePrecisionCube`], anything deeper to [`SinglePrecisionCubeN`].
#[derive(Clone, Debug)]
pub enum ValuationCube {
    /// Depth-1 storage.
    Single(SinglePrecisionCube),
    /// Depth-N storage.
    Multi(SinglePrecisionCubeN),
}

impl ValuationCube {
    /// Allocates the variant matching `depth`.
    pub fn allocate(
        asof: NaiveDate,
        ids: Vec<String>,
        dates: Vec<NaiveDate>,
        samples: usize,
        depth: usize,
        fill: f64,
    ) -> Result<Self, CubeError> {
        if depth == 1 {
            SinglePrecisionCube::new(asof, ids, dates, samples, fill).map(Self::Single)
        } else {
            SinglePrecisionCubeN::new(asof, ids, dates, samples, depth, fill).map(Self::Multi)
        }
    }

    #[inline]
    fn storage(&self) -> &CubeStorage {
        match self {
            ValuationCube::Single(c) => &c.storage,
            ValuationCube::Multi(c) => &c.storage,
        }
    }

    #[inline]
    fn storage_mut(&mut self) -> &mut CubeStorage {
        match self {
            ValuationCube::Single(c) => &mut c.storage,
            ValuationCube::Multi(c) => &mut c.storage,
        }
    }

    /// Returns the dimensions `(ids, dates, samples, depth)`.
    pub fn shape(&self) -> (usize, usize, usize, usize) {
        let s = self.storage();
        (s.ids.len(), s.dates.len(), s.samples, s.depth)
    }

    /// Read-only view of each sample's block, in sample order.
    pub fn sample_blocks(&self) -> Vec<SampleBlock<'_>> {
        self.storage().sample_blocks()
    }

    /// Disjoint mutable views of each sample's block, in sample order.
    ///
    /// Always returns exactly `samples()` blocks, even for a cube without ids.
    pub fn sample_blocks_mut(&mut self) -> Vec<SampleBlockMut<'_>> {
        self.storage_mut().sample_blocks_mut()
    }

    /// Values of one `(id, date, depth)` cell across all samples.
    pub fn sample_values(
        &self,
        id: usize,
        date: usize,
        depth: usize,
    ) -> Result<Vec<f64>, CubeError> {
        (0..self.samples())
            .map(|sample| self.get(id, date, sample, depth))
            .collect()
    }
}

impl NpvCube for ValuationCube {
    fn asof(&self) -> NaiveDate {
        self.storage().asof
    }

    fn ids(&self) -> &[String] {
        &self.storage().ids
    }

    fn dates(&self) -> &[NaiveDate] {
        &self.storage().dates
    }

    fn samples(&self) -> usize {
        self.storage().samples
    }

    fn depth(&self) -> usize {
        self.storage().depth
    }

    fn fill_value(&self) -> f64 {
        f64::from(self.storage().fill)
    }

    fn id_index(&self, id: &str) -> Result<usize, CubeError> {
        self.storage().id_index(id)
    }

    #[inline]
    fn get(&self, id: usize, date: usize, sample: usize, depth: usize) -> Result<f64, CubeError> {
        self.storage().get(id, date, sample, depth)
    }

    #[inline]
    fn set(
        &mut self,
        id: usize,
        date: usize,
        sample: usize,
        depth: usize,
        value: f64,
    ) -> Result<(), CubeError> {
        self.storage_mut().set(id, date, sample, depth, value)
    }

    fn get_t0(&self, id: usize, depth: usize) -> Result<f64, CubeError> {
        self.storage().get_t0(id, depth)
    }

    fn set_t0(&mut self, id: usize, depth: usize, value: f64) -> Result<(), CubeError> {
        self.storage_mut().set_t0(id, depth, value)
    }
}

/// Read-only view of one sample's `(id, date, depth)` values.
#[derive(Clone, Copy, Debug)]
pub struct SampleBlock<'a> {
    data: &'a [f32],
    n_ids: usize,
    n_dates: usize,
    depth: usize,
}

impl SampleBlock<'_> {
    #[inline]
    fn offset(&self, id: usize, date: usize, depth: usize) -> Result<usize, CubeError> {
        check_axis(CubeAxis::Id, id, self.n_ids)?;
        check_axis(CubeAxis::Date, date, self.n_dates)?;
        check_axis(CubeAxis::Depth, depth, self.depth)?;
        Ok((id * self.n_dates + date) * self.depth + depth)
    }

    /// Reads a value.
    #[inline]
    pub fn get(&self, id: usize, date: usize, depth: usize) -> Result<f64, CubeError> {
        let offset = self.offset(id, date, depth)?;
        Ok(f64::from(self.data[offset]))
    }

    /// Number of ids in the block.
    #[inline]
    pub fn num_ids(&self) -> usize {
        self.n_ids
    }

    /// Number of dates in the block.
    #[inline]
    pub fn num_dates(&self) -> usize {
        self.n_dates
    }

    /// Depth of the block.
    #[inline]
    pub fn depth(&self) -> usize {
        self.depth
    }
}

/// Mutable view of one sample's `(id, date, depth)` values.
#[derive(Debug)]
pub struct SampleBlockMut<'a> {
    data: &'a mut [f32],
    n_ids: usize,
    n_dates: usize,
    depth: usize,
}

impl SampleBlockMut<'_> {
    /// Reborrows as a read-only block.
    #[inline]
    pub fn as_block(&self) -> SampleBlock<'_> {
        SampleBlock {
            data: &*self.data,
            n_ids: self.n_ids,
            n_dates: self.n_dates,
            depth: self.depth,
        }
    }

    /// Reads a value.
    #[inline]
    pub fn get(&self, id: usize, date: usize, depth: usize) -> Result<f64, CubeError> {
        self.as_block().get(id, date, depth)
    }

    /// Overwrites a value.
    #[inline]
    pub fn set(&mut self, id: usize, date: usize, depth: usize, value: f64) -> Result<(), CubeError> {
        let offset = self.as_block().offset(id, date, depth)?;
        self.data[offset] = value as f32;
        Ok(())
    }

    /// Number of ids in the block.
    #[inline]
    pub fn num_ids(&self) -> usize {
        self.n_ids
    }

    /// Number of dates in the block.
    #[inline]
    pub fn num_dates(&self) -> usize {
        self.n_dates
    }

    /// Depth of the block.
    #[inline]
    pub fn depth(&self) -> usize {
        self.depth
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn grid() -> Vec<NaiveDate> {
        vec![d(2024, 4, 2), d(2024, 7, 2), d(2024, 10, 2)]
    }

    #[test]
    fn test_allocation_fills_every_cell() {
        let cube =
            SinglePrecisionCubeN::new(d(2024, 1, 2), ids(&["A", "B"]), grid(), 4, 2, -1.5).unwrap();

        for id in 0..2 {
            for date in 0..3 {
                for sample in 0..4 {
                    for depth in 0..2 {
                        assert_eq!(cube.get(id, date, sample, depth).unwrap(), -1.5);
                    }
                }
            }
            assert_eq!(cube.get_t0(id, 1).unwrap(), -1.5);
        }
    }

    #[test]
    fn test_set_is_overwrite() {
        let mut cube =
            SinglePrecisionCube::new(d(2024, 1, 2), ids(&["A"]), grid(), 2, 0.0).unwrap();
        cube.set(0, 1, 1, 0, 10.0).unwrap();
        cube.set(0, 1, 1, 0, 20.0).unwrap();
        assert_eq!(cube.get(0, 1, 1, 0).unwrap(), 20.0);
        assert_eq!(cube.get(0, 1, 0, 0).unwrap(), 0.0);
    }

    #[test]
    fn test_depth_one_rejects_depth_index() {
        let mut cube =
            SinglePrecisionCube::new(d(2024, 1, 2), ids(&["A"]), grid(), 2, 0.0).unwrap();
        let err = cube.set(0, 0, 0, 1, 1.0).unwrap_err();
        assert_eq!(
            err,
            CubeError::IndexOutOfRange {
                axis: CubeAxis::Depth,
                index: 1,
                size: 1
            }
        );
    }

    #[test]
    fn test_out_of_range_axes() {
        let cube =
            SinglePrecisionCube::new(d(2024, 1, 2), ids(&["A"]), grid(), 2, 0.0).unwrap();
        assert!(matches!(
            cube.get(1, 0, 0, 0),
            Err(CubeError::IndexOutOfRange { axis: CubeAxis::Id, .. })
        ));
        assert!(matches!(
            cube.get(0, 3, 0, 0),
            Err(CubeError::IndexOutOfRange { axis: CubeAxis::Date, .. })
        ));
        assert!(matches!(
            cube.get(0, 0, 2, 0),
            Err(CubeError::IndexOutOfRange { axis: CubeAxis::Sample, .. })
        ));
    }

    #[test]
    fn test_by_id_access() {
        let mut cube =
            SinglePrecisionCube::new(d(2024, 1, 2), ids(&["A", "B"]), grid(), 2, 0.0).unwrap();
        cube.set_by_id("B", 2, 1, 0, 7.25).unwrap();
        assert_eq!(cube.get_by_id("B", 2, 1, 0).unwrap(), 7.25);
        assert_eq!(
            cube.get_by_id("Z", 0, 0, 0).unwrap_err(),
            CubeError::UnknownId("Z".to_string())
        );
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let result = SinglePrecisionCube::new(d(2024, 1, 2), ids(&["A", "A"]), grid(), 2, 0.0);
        assert_eq!(result.unwrap_err(), CubeError::DuplicateId("A".to_string()));
    }

    #[test]
    fn test_unordered_dates_rejected() {
        let dates = vec![d(2024, 7, 2), d(2024, 4, 2)];
        let result = SinglePrecisionCube::new(d(2024, 1, 2), ids(&["A"]), dates, 2, 0.0);
        assert!(matches!(result, Err(CubeError::InvalidDimensions(_))));
    }

    #[test]
    fn test_single_precision_storage() {
        let mut cube =
            SinglePrecisionCube::new(d(2024, 1, 2), ids(&["A"]), grid(), 1, 0.0).unwrap();
        cube.set(0, 0, 0, 0, 0.1).unwrap();
        assert_eq!(cube.get(0, 0, 0, 0).unwrap(), f64::from(0.1_f32));
    }

    #[test]
    fn test_allocate_selects_variant() {
        let single =
            ValuationCube::allocate(d(2024, 1, 2), ids(&["A"]), grid(), 2, 1, 0.0).unwrap();
        let multi =
            ValuationCube::allocate(d(2024, 1, 2), ids(&["A"]), grid(), 2, 2, 0.0).unwrap();
        assert!(matches!(single, ValuationCube::Single(_)));
        assert!(matches!(multi, ValuationCube::Multi(_)));
        assert_eq!(multi.shape(), (1, 3, 2, 2));
    }

    #[test]
    fn test_sample_blocks_address_their_sample() {
        let mut cube =
            ValuationCube::allocate(d(2024, 1, 2), ids(&["A", "B"]), grid(), 3, 2, 0.0).unwrap();
        {
            let mut blocks = cube.sample_blocks_mut();
            assert_eq!(blocks.len(), 3);
            for (sample, block) in blocks.iter_mut().enumerate() {
                block.set(1, 2, 1, sample as f64 + 0.5).unwrap();
            }
        }
        for sample in 0..3 {
            assert_eq!(cube.get(1, 2, sample, 1).unwrap(), sample as f64 + 0.5);
            assert_eq!(cube.get(0, 2, sample, 1).unwrap(), 0.0);
        }
    }

    #[test]
    fn test_sample_blocks_without_ids() {
        let mut cube = ValuationCube::allocate(d(2024, 1, 2), vec![], grid(), 5, 1, 0.0).unwrap();
        assert_eq!(cube.sample_blocks_mut().len(), 5);
        assert_eq!(cube.sample_blocks().len(), 5);
    }

    #[test]
    fn test_sample_values() {
        let mut cube =
            ValuationCube::allocate(d(2024, 1, 2), ids(&["A"]), grid(), 3, 1, 0.0).unwrap();
        for s in 0..3 {
            cube.set(0, 1, s, 0, (s * 2) as f64).unwrap();
        }
        assert_eq!(cube.sample_values(0, 1, 0).unwrap(), vec![0.0, 2.0, 4.0]);
    }
}

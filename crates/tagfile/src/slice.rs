//! Axis-selection plans for n-D array access.
//!
//! A selection is normalized into per-axis index sequences plus one
//! chunk size, computed once per call. Trailing full axes and an
//! innermost unit-step slice are absorbed into the chunk so contiguous
//! runs move as single reads/writes; the produced bytes are identical
//! to the naive per-element walk.

use tagpack::Error;
use tagpack::Result;

/// One axis of a selection.
#[derive(Debug, Clone, PartialEq)]
pub enum AxisSel {
    /// A single position; negative values wrap from the end.
    At(i64),
    /// A half-open `start:stop:step` slice with python clamping
    /// semantics. `None` bounds mean "from the edge"; `None` step is 1.
    Span {
        start: Option<i64>,
        stop: Option<i64>,
        step: Option<i64>,
    },
    /// An explicit list of positions; negative values wrap.
    Pick(Vec<i64>),
}

impl AxisSel {
    pub fn at(index: i64) -> AxisSel {
        AxisSel::At(index)
    }

    pub fn full() -> AxisSel {
        AxisSel::Span { start: None, stop: None, step: None }
    }

    pub fn span(start: impl Into<Option<i64>>, stop: impl Into<Option<i64>>) -> AxisSel {
        AxisSel::Span { start: start.into(), stop: stop.into(), step: None }
    }

    pub fn span_step(
        start: impl Into<Option<i64>>,
        stop: impl Into<Option<i64>>,
        step: i64,
    ) -> AxisSel {
        AxisSel::Span { start: start.into(), stop: stop.into(), step: Some(step) }
    }

    pub fn pick(positions: impl Into<Vec<i64>>) -> AxisSel {
        AxisSel::Pick(positions.into())
    }
}

impl From<i64> for AxisSel {
    fn from(i: i64) -> Self {
        AxisSel::At(i)
    }
}

impl From<std::ops::Range<i64>> for AxisSel {
    fn from(r: std::ops::Range<i64>) -> Self {
        AxisSel::span(r.start, r.end)
    }
}

impl From<std::ops::RangeFrom<i64>> for AxisSel {
    fn from(r: std::ops::RangeFrom<i64>) -> Self {
        AxisSel::span(r.start, None)
    }
}

impl From<std::ops::RangeTo<i64>> for AxisSel {
    fn from(r: std::ops::RangeTo<i64>) -> Self {
        AxisSel::span(None, r.end)
    }
}

impl From<std::ops::RangeFull> for AxisSel {
    fn from(_: std::ops::RangeFull) -> Self {
        AxisSel::full()
    }
}

impl From<Vec<i64>> for AxisSel {
    fn from(v: Vec<i64>) -> Self {
        AxisSel::Pick(v)
    }
}

impl From<&[i64]> for AxisSel {
    fn from(v: &[i64]) -> Self {
        AxisSel::Pick(v.to_vec())
    }
}

struct SliceInfo {
    start: i64,
    step: i64,
    len: usize,
    full: bool,
}

/// A normalized selection: index sequences for the iterated axes, their
/// element strides, the result shape, and the coalesced chunk size.
pub(crate) struct Plan {
    pub axes: Vec<Vec<u64>>,
    pub strides: Vec<u64>,
    pub result_shape: Vec<usize>,
    pub chunk_elems: usize,
    pub chunk_bytes: usize,
    pub elem_size: usize,
}

impl Plan {
    /// True when the selection contains zero elements; no I/O happens.
    pub fn is_empty(&self) -> bool {
        self.axes.iter().any(|a| a.is_empty()) || self.chunk_elems == 0
    }

    /// Number of seek-and-transfer operations the plan performs.
    pub fn point_count(&self) -> usize {
        self.axes.iter().map(Vec::len).product()
    }

    /// Walks the cartesian product of the iterated axes in row-major
    /// order, passing the element offset of each chunk.
    pub fn for_each_offset<F: FnMut(u64) -> Result<()>>(&self, mut f: F) -> Result<()> {
        let mut pos = vec![0usize; self.axes.len()];
        loop {
            let mut offset = 0u64;
            for (i, p) in pos.iter().enumerate() {
                offset += self.axes[i][*p] * self.strides[i];
            }
            f(offset)?;
            let mut axis = self.axes.len();
            loop {
                if axis == 0 {
                    return Ok(());
                }
                axis -= 1;
                pos[axis] += 1;
                if pos[axis] < self.axes[axis].len() {
                    break;
                }
                pos[axis] = 0;
            }
        }
    }
}

fn wrap_index(index: i64, dim: usize) -> Result<u64> {
    let mut i = index;
    if i < 0 {
        i += dim as i64;
    }
    if i < 0 || i >= dim as i64 {
        return Err(Error::IndexOutOfRange { index, len: dim });
    }
    Ok(i as u64)
}

/// Python `slice.indices` clamping.
fn span_indices(start: Option<i64>, stop: Option<i64>, step: i64, dim: usize) -> (i64, i64) {
    let n = dim as i64;
    let clamp = |bound: Option<i64>, on_none: i64| match bound {
        None => on_none,
        Some(mut v) => {
            if v < 0 {
                v += n;
                if v < 0 {
                    v = if step > 0 { 0 } else { -1 };
                }
            } else if v >= n {
                v = if step > 0 { n } else { n - 1 };
            }
            v
        }
    };
    let start = clamp(start, if step > 0 { 0 } else { n - 1 });
    let stop = clamp(stop, if step > 0 { n } else { -1 });
    (start, stop)
}

fn span_len(start: i64, stop: i64, step: i64) -> usize {
    if step > 0 {
        if stop > start {
            ((stop - start - 1) / step + 1) as usize
        } else {
            0
        }
    } else if start > stop {
        ((start - stop - 1) / (-step) + 1) as usize
    } else {
        0
    }
}

pub(crate) fn build_plan(shape: &[usize], elem_size: usize, sels: &[AxisSel]) -> Result<Plan> {
    if sels.len() > shape.len() {
        return Err(Error::IndexOutOfRange { index: sels.len() as i64, len: shape.len() });
    }

    let mut strides = vec![1u64; shape.len().max(1)];
    for i in (0..shape.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * shape[i + 1] as u64;
    }

    let mut axes: Vec<Vec<u64>> = Vec::with_capacity(sels.len());
    let mut infos: Vec<Option<SliceInfo>> = Vec::with_capacity(sels.len());
    let mut result_shape: Vec<usize> = Vec::new();

    for (axis, sel) in sels.iter().enumerate() {
        let dim = shape[axis];
        match sel {
            AxisSel::At(index) => {
                axes.push(vec![wrap_index(*index, dim)?]);
                infos.push(None);
            }
            AxisSel::Span { start, stop, step } => {
                let step = step.unwrap_or(1);
                if step == 0 {
                    return Err(Error::UnsupportedType("slice step of zero"));
                }
                let (start, stop) = span_indices(*start, *stop, step, dim);
                let len = span_len(start, stop, step);
                let seq = (0..len).map(|k| (start + k as i64 * step) as u64).collect();
                axes.push(seq);
                result_shape.push(len);
                infos.push(Some(SliceInfo {
                    start,
                    step,
                    len,
                    full: step == 1 && start == 0 && len == dim,
                }));
            }
            AxisSel::Pick(positions) => {
                let mut seq = Vec::with_capacity(positions.len());
                for &p in positions {
                    seq.push(wrap_index(p, dim)?);
                }
                result_shape.push(seq.len());
                axes.push(seq);
                infos.push(None);
            }
        }
    }

    // Absorb trailing full axes into the chunk; their extents come back
    // via the implicit-axis pass below.
    let mut chunk_elems = 1usize;
    while matches!(infos.last(), Some(Some(info)) if info.full) {
        infos.pop();
        axes.pop();
        result_shape.pop();
    }

    // A unit-step innermost slice reads as one block from its start.
    if let Some(Some(info)) = infos.last() {
        if info.step == 1 && info.len > 0 {
            *axes.last_mut().expect("info implies axis") = vec![info.start as u64];
            chunk_elems *= info.len;
        }
    }

    // Axes beyond the provided selectors are implicit full slices.
    for axis in axes.len()..shape.len() {
        result_shape.push(shape[axis]);
        chunk_elems *= shape[axis];
    }

    let mut strides = strides[..axes.len()].to_vec();
    if axes.is_empty() {
        axes.push(vec![0]);
        strides.push(0);
    }

    Ok(Plan {
        axes,
        strides,
        result_shape,
        chunk_elems,
        chunk_bytes: chunk_elems * elem_size,
        elem_size,
    })
}

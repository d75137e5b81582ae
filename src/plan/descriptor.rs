//! Block-structured windows over column-major scratch arrays.

use crate::error::TdError;

/// A `(sub_rows × sub_cols)` window into a column-major `(rows × cols)`
/// array, anchored at `(row0, col0)`.
///
/// Descriptors are the iteration rule for the staging buffers around the
/// block-transpose exchange: one per peer on the send side (which tile of
/// the local boundary array goes to that peer) and one per peer on the
/// receive side (which column stripe of the transposed array that peer's
/// tile lands in). They are built at plan creation and never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockDesc {
    rows: usize,
    cols: usize,
    sub_rows: usize,
    sub_cols: usize,
    row0: usize,
    col0: usize,
}

impl BlockDesc {
    pub fn new(
        rows: usize,
        cols: usize,
        sub_rows: usize,
        sub_cols: usize,
        row0: usize,
        col0: usize,
    ) -> Result<Self, TdError> {
        if row0 + sub_rows > rows || col0 + sub_cols > cols {
            return Err(TdError::Config(format!(
                "window {sub_rows}x{sub_cols}+{row0}+{col0} exceeds array {rows}x{cols}"
            )));
        }
        Ok(BlockDesc {
            rows,
            cols,
            sub_rows,
            sub_cols,
            row0,
            col0,
        })
    }

    /// Elements covered by the window.
    pub fn len(&self) -> usize {
        self.sub_rows * self.sub_cols
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append the window contents of `src` to `out`, column by column.
    pub fn pack(&self, src: &[f64], out: &mut Vec<f64>) {
        debug_assert_eq!(src.len(), self.rows * self.cols);
        for j in 0..self.sub_cols {
            let base = (self.col0 + j) * self.rows + self.row0;
            out.extend_from_slice(&src[base..base + self.sub_rows]);
        }
    }

    /// Scatter a packed run back into the window over `dst`.
    pub fn unpack(&self, data: &[f64], dst: &mut [f64]) {
        debug_assert_eq!(data.len(), self.len());
        debug_assert_eq!(dst.len(), self.rows * self.cols);
        for j in 0..self.sub_cols {
            let base = (self.col0 + j) * self.rows + self.row0;
            dst[base..base + self.sub_rows]
                .copy_from_slice(&data[j * self.sub_rows..(j + 1) * self.sub_rows]);
        }
    }
}

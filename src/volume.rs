use ndarray::{Array2, Array3, ArrayView2, Axis};

use crate::error::PipelineError;

/// Sample type of a stack, mirroring the grayscale TIFF layouts the pipeline accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dtype {
    U8,
    U16,
    F32,
}

impl std::fmt::Display for Dtype {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Dtype::U8 => "u8",
            Dtype::U16 => "u16",
            Dtype::F32 => "f32",
        };
        f.write_str(name)
    }
}

/// A single decoded image plane.
#[derive(Debug, Clone, PartialEq)]
pub enum Plane {
    U8(Array2<u8>),
    U16(Array2<u16>),
    F32(Array2<f32>),
}

impl Plane {
    /// Plane shape as (rows, cols)
    pub fn dim(&self) -> (usize, usize) {
        match self {
            Plane::U8(array) => array.dim(),
            Plane::U16(array) => array.dim(),
            Plane::F32(array) => array.dim(),
        }
    }

    pub fn dtype(&self) -> Dtype {
        match self {
            Plane::U8(_) => Dtype::U8,
            Plane::U16(_) => Dtype::U16,
            Plane::F32(_) => Dtype::F32,
        }
    }
}

/// Borrowed view of one plane of a [`Volume`].
#[derive(Debug, Clone, Copy)]
pub enum PlaneView<'a> {
    U8(ArrayView2<'a, u8>),
    U16(ArrayView2<'a, u16>),
    F32(ArrayView2<'a, f32>),
}

/// A z-stack stored as a dense (depth, rows, cols) array of one sample type.
#[derive(Debug, Clone, PartialEq)]
pub enum Volume {
    U8(Array3<u8>),
    U16(Array3<u16>),
    F32(Array3<f32>),
}

impl Volume {
    /// Stack decoded planes into a volume.
    ///
    /// # Errors
    ///
    /// Returns an error when no planes are given, when plane shapes differ, or
    /// when planes mix sample types.
    pub fn from_planes(planes: Vec<Plane>) -> Result<Volume, PipelineError> {
        let Some(first) = planes.first() else {
            return Err(PipelineError::EmptyInput);
        };
        let (rows, cols) = first.dim();
        let dtype = first.dtype();

        for plane in &planes {
            if plane.dim() != (rows, cols) {
                return Err(PipelineError::ShapeMismatch {
                    expected: (rows, cols),
                    found: plane.dim(),
                });
            }
            if plane.dtype() != dtype {
                return Err(PipelineError::MixedDtypes {
                    expected: dtype,
                    found: plane.dtype(),
                });
            }
        }

        let depth = planes.len();
        let volume = match dtype {
            Dtype::U8 => {
                let mut volume = Array3::<u8>::zeros((depth, rows, cols));
                for (i, plane) in planes.iter().enumerate() {
                    if let Plane::U8(array) = plane {
                        volume.index_axis_mut(Axis(0), i).assign(array);
                    }
                }
                Volume::U8(volume)
            }
            Dtype::U16 => {
                let mut volume = Array3::<u16>::zeros((depth, rows, cols));
                for (i, plane) in planes.iter().enumerate() {
                    if let Plane::U16(array) = plane {
                        volume.index_axis_mut(Axis(0), i).assign(array);
                    }
                }
                Volume::U16(volume)
            }
            Dtype::F32 => {
                let mut volume = Array3::<f32>::zeros((depth, rows, cols));
                for (i, plane) in planes.iter().enumerate() {
                    if let Plane::F32(array) = plane {
                        volume.index_axis_mut(Axis(0), i).assign(array);
                    }
                }
                Volume::F32(volume)
            }
        };

        Ok(volume)
    }

    /// Get the dimensions of the volume (depth, rows, cols)
    pub fn dim(&self) -> (usize, usize, usize) {
        match self {
            Volume::U8(array) => array.dim(),
            Volume::U16(array) => array.dim(),
            Volume::F32(array) => array.dim(),
        }
    }

    /// Number of planes along the z axis
    pub fn depth(&self) -> usize {
        self.dim().0
    }

    pub fn dtype(&self) -> Dtype {
        match self {
            Volume::U8(_) => Dtype::U8,
            Volume::U16(_) => Dtype::U16,
            Volume::F32(_) => Dtype::F32,
        }
    }

    /// View of the plane at depth index `z`.
    ///
    /// # Panics
    ///
    /// Panics when `z` is out of bounds.
    pub fn plane(&self, z: usize) -> PlaneView<'_> {
        match self {
            Volume::U8(array) => PlaneView::U8(array.index_axis(Axis(0), z)),
            Volume::U16(array) => PlaneView::U16(array.index_axis(Axis(0), z)),
            Volume::F32(array) => PlaneView::F32(array.index_axis(Axis(0), z)),
        }
    }
}

use ndarray::{Array3, Axis, Zip};
use rayon::prelude::*;

use crate::volume::Volume;

/// Number of planes a stack has after resampling from `dz_source` to
/// `dz_target`, never less than one.
pub fn target_depth(depth: usize, dz_source: f64, dz_target: f64) -> usize {
    let scaled = depth as f64 * dz_source / dz_target;
    (scaled.round_ties_even() as usize).max(1)
}

/// Resample a stack along z to `new_depth` planes with linear interpolation.
///
/// Sample positions span the source range end to end, so the first and last
/// planes of the output equal the first and last planes of the input. When
/// `new_depth` matches the current depth the stack is returned unchanged.
/// Integer samples are rounded to the nearest even value on ties and clipped
/// to the sample type's range; float samples pass through unrounded.
pub fn resample_z(stack: Volume, new_depth: usize) -> Volume {
    let new_depth = new_depth.max(1);
    if new_depth == stack.depth() {
        return stack;
    }
    match stack {
        Volume::U8(array) => Volume::U8(resample_planes(&array, new_depth)),
        Volume::U16(array) => Volume::U16(resample_planes(&array, new_depth)),
        Volume::F32(array) => Volume::F32(resample_planes(&array, new_depth)),
    }
}

/// Sample types the z resampler understands.
trait ZSample: Copy + Send + Sync {
    const ZERO: Self;
    fn to_f32(self) -> f32;
    fn from_lerp(value: f32) -> Self;
}

impl ZSample for u8 {
    const ZERO: Self = 0;

    fn to_f32(self) -> f32 {
        self as f32
    }

    fn from_lerp(value: f32) -> Self {
        value.round_ties_even().clamp(0.0, u8::MAX as f32) as u8
    }
}

impl ZSample for u16 {
    const ZERO: Self = 0;

    fn to_f32(self) -> f32 {
        self as f32
    }

    fn from_lerp(value: f32) -> Self {
        value.round_ties_even().clamp(0.0, u16::MAX as f32) as u16
    }
}

impl ZSample for f32 {
    const ZERO: Self = 0.0;

    fn to_f32(self) -> f32 {
        self
    }

    fn from_lerp(value: f32) -> Self {
        value
    }
}

/// Neighbor pair and interpolation weight for each output plane.
fn sample_points(depth: usize, new_depth: usize) -> Vec<(usize, usize, f32)> {
    (0..new_depth)
        .map(|i| {
            let position = if new_depth > 1 {
                (i as f64 * (depth - 1) as f64) / (new_depth - 1) as f64
            } else {
                0.0
            };
            let z0 = position.floor() as usize;
            let z1 = (z0 + 1).min(depth - 1);
            let weight = (position - z0 as f64) as f32;
            (z0, z1, weight)
        })
        .collect()
}

fn resample_planes<T: ZSample>(source: &Array3<T>, new_depth: usize) -> Array3<T> {
    let (depth, rows, cols) = source.dim();
    assert!(depth > 0, "volume must contain at least one plane");

    let samples = sample_points(depth, new_depth);
    let mut output = Array3::from_elem((new_depth, rows, cols), T::ZERO);
    output
        .axis_iter_mut(Axis(0))
        .into_par_iter()
        .zip(samples.par_iter())
        .for_each(|(mut plane, &(z0, z1, weight))| {
            let near = source.index_axis(Axis(0), z0);
            let far = source.index_axis(Axis(0), z1);
            Zip::from(&mut plane)
                .and(&near)
                .and(&far)
                .for_each(|out, &a, &b| {
                    *out = T::from_lerp((1.0 - weight) * a.to_f32() + weight * b.to_f32());
                });
        });

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn ramp_stack(depth: usize) -> Volume {
        // Plane z holds the constant value 10 * z.
        Volume::U16(Array3::from_shape_fn((depth, 4, 4), |(z, _, _)| {
            (z * 10) as u16
        }))
    }

    #[test]
    fn identity_depth_returns_the_stack_unchanged() {
        let stack = ramp_stack(5);
        let resampled = resample_z(stack.clone(), 5);
        assert_eq!(resampled, stack);
    }

    #[test]
    fn output_depth_is_at_least_one() {
        for requested in [0, 1, 2, 3, 9] {
            let resampled = resample_z(ramp_stack(5), requested);
            assert_eq!(resampled.depth(), requested.max(1));
        }
    }

    #[test]
    fn downsampling_five_planes_to_three_keeps_the_even_planes() {
        // Positions land on source planes 0, 2 and 4 exactly.
        let resampled = resample_z(ramp_stack(5), 3);
        let Volume::U16(data) = resampled else {
            panic!("expected a u16 volume");
        };
        assert_eq!(data.dim(), (3, 4, 4));
        assert_eq!(data[[0, 0, 0]], 0);
        assert_eq!(data[[1, 2, 2]], 20);
        assert_eq!(data[[2, 3, 3]], 40);
    }

    #[test]
    fn endpoints_are_preserved_when_upsampling() {
        let resampled = resample_z(ramp_stack(3), 7);
        let Volume::U16(data) = resampled else {
            panic!("expected a u16 volume");
        };
        assert_eq!(data[[0, 0, 0]], 0);
        assert_eq!(data[[6, 0, 0]], 20);
    }

    #[test]
    fn integer_ties_round_to_even() {
        // Midpoint of 1 and 2 is 1.5, which rounds to 2.
        let stack = Volume::U8(Array3::from_shape_fn((2, 1, 1), |(z, _, _)| z as u8 + 1));
        let resampled = resample_z(stack, 3);
        let Volume::U8(data) = resampled else {
            panic!("expected a u8 volume");
        };
        assert_eq!(data[[1, 0, 0]], 2);

        // Midpoint of 0 and 1 is 0.5, which rounds to 0.
        let stack = Volume::U8(Array3::from_shape_fn((2, 1, 1), |(z, _, _)| z as u8));
        let resampled = resample_z(stack, 3);
        let Volume::U8(data) = resampled else {
            panic!("expected a u8 volume");
        };
        assert_eq!(data[[1, 0, 0]], 0);
    }

    #[test]
    fn float_samples_keep_fractions() {
        let stack = Volume::F32(Array3::from_shape_fn((2, 1, 1), |(z, _, _)| z as f32));
        let resampled = resample_z(stack, 3);
        let Volume::F32(data) = resampled else {
            panic!("expected an f32 volume");
        };
        assert_eq!(data[[1, 0, 0]], 0.5);
    }

    #[test]
    fn interpolated_values_stay_within_the_source_range() {
        let stack = Volume::U8(Array3::from_shape_fn((4, 2, 2), |(z, r, c)| {
            (z * 37 + r * 11 + c * 101) as u8
        }));
        let Volume::U8(source) = &stack else {
            unreachable!();
        };
        let (lo, hi) = source.iter().fold((u8::MAX, u8::MIN), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });

        let Volume::U8(data) = resample_z(stack.clone(), 11) else {
            panic!("expected a u8 volume");
        };
        assert!(data.iter().all(|&v| v >= lo && v <= hi));
    }

    #[test]
    fn single_plane_output_samples_the_first_plane() {
        let resampled = resample_z(ramp_stack(4), 1);
        let Volume::U16(data) = resampled else {
            panic!("expected a u16 volume");
        };
        assert_eq!(data.dim(), (1, 4, 4));
        assert_eq!(data[[0, 0, 0]], 0);
    }

    #[test]
    fn target_depth_rounds_and_clamps() {
        // 7 planes at matching spacing stay 7 planes.
        assert_eq!(target_depth(7, 0.396, 0.396), 7);
        // 5 * 0.2376 / 0.396 = 3.
        assert_eq!(target_depth(5, 0.2376, 0.396), 3);
        // Tiny source spacing still yields at least one plane.
        assert_eq!(target_depth(5, 0.01, 1.0), 1);
        // 5 * 0.5 / 1.0 = 2.5 rounds to the even 2.
        assert_eq!(target_depth(5, 0.5, 1.0), 2);
        // 7 * 0.5 / 1.0 = 3.5 rounds to the even 4.
        assert_eq!(target_depth(7, 0.5, 1.0), 4);
    }
}

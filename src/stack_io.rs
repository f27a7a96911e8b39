use std::fs::File;
use std::io::{BufReader, BufWriter, Seek, Write};
use std::path::Path;

use ndarray::{Array2, ArrayView2};
use tiff::ColorType as TiffColorType;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::colortype::{self, ColorType};
use tiff::encoder::{TiffEncoder, TiffValue};
use tiff::tags::Tag;

use crate::error::PipelineError;
use crate::volume::{Plane, PlaneView, Volume};

/// Read every page of a grayscale TIFF into a volume.
///
/// # Errors
///
/// Returns an error when the file cannot be decoded, when a page is not
/// grayscale or has a sample type other than u8/u16/f32, or when pages differ
/// in shape or sample type.
pub fn read_stack(path: &Path) -> Result<Volume, PipelineError> {
    let mut decoder = open_decoder(path)?;
    let mut planes = Vec::new();
    loop {
        planes.push(decode_current_page(&mut decoder, path)?);
        if !decoder.more_images() {
            break;
        }
        decoder.next_image()?;
    }
    Volume::from_planes(planes)
}

/// Read the first page of a grayscale TIFF.
pub fn read_plane(path: &Path) -> Result<Plane, PipelineError> {
    let mut decoder = open_decoder(path)?;
    decode_current_page(&mut decoder, path)
}

/// Read the OME-XML document embedded in a TIFF's ImageDescription tag, if any.
///
/// # Errors
///
/// Returns an error when the file cannot be opened as a TIFF; a missing or
/// empty description is `None`, not an error.
pub fn read_ome_xml(path: &Path) -> Result<Option<String>, PipelineError> {
    let mut decoder = open_decoder(path)?;
    let description = decoder
        .get_tag_ascii_string(Tag::ImageDescription)
        .ok()
        // ASCII tag values carry a trailing NUL.
        .map(|text| text.trim_end_matches('\0').to_string())
        .filter(|text| !text.is_empty());
    Ok(description)
}

/// Write a volume as a multi-page grayscale TIFF, one page per plane.
pub fn write_stack(path: &Path, stack: &Volume) -> Result<(), PipelineError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    {
        let mut encoder = TiffEncoder::new(&mut writer)?;
        for z in 0..stack.depth() {
            write_page(&mut encoder, stack.plane(z))?;
        }
    }
    // A drop-time flush would swallow the final write error.
    writer.flush()?;
    Ok(())
}

/// Write a single plane as a grayscale TIFF.
pub fn write_plane(path: &Path, plane: PlaneView<'_>) -> Result<(), PipelineError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    {
        let mut encoder = TiffEncoder::new(&mut writer)?;
        write_page(&mut encoder, plane)?;
    }
    writer.flush()?;
    Ok(())
}

fn open_decoder(path: &Path) -> Result<Decoder<BufReader<File>>, PipelineError> {
    let file = File::open(path)?;
    // Stacks routinely exceed the decoder's default allocation cap.
    let decoder = Decoder::new(BufReader::new(file))?.with_limits(Limits::unlimited());
    Ok(decoder)
}

fn decode_current_page(
    decoder: &mut Decoder<BufReader<File>>,
    path: &Path,
) -> Result<Plane, PipelineError> {
    let color = decoder.colortype()?;
    if !matches!(color, TiffColorType::Gray(_)) {
        return Err(PipelineError::UnsupportedShape {
            path: path.to_path_buf(),
            reason: format!("expected grayscale pages, found {color:?}"),
        });
    }
    let (width, height) = decoder.dimensions()?;
    let (rows, cols) = (height as usize, width as usize);
    if rows == 0 || cols == 0 {
        return Err(PipelineError::UnsupportedShape {
            path: path.to_path_buf(),
            reason: format!("zero-sized page ({rows} x {cols})"),
        });
    }

    match decoder.read_image()? {
        DecodingResult::U8(data) => Ok(Plane::U8(to_array2(rows, cols, data, path)?)),
        DecodingResult::U16(data) => Ok(Plane::U16(to_array2(rows, cols, data, path)?)),
        DecodingResult::F32(data) => Ok(Plane::F32(to_array2(rows, cols, data, path)?)),
        other => Err(PipelineError::UnsupportedDtype {
            path: path.to_path_buf(),
            found: sample_type_name(&other).to_string(),
        }),
    }
}

fn to_array2<T>(
    rows: usize,
    cols: usize,
    data: Vec<T>,
    path: &Path,
) -> Result<Array2<T>, PipelineError> {
    Array2::from_shape_vec((rows, cols), data).map_err(|_| PipelineError::UnsupportedShape {
        path: path.to_path_buf(),
        reason: "page data does not match its dimensions".to_string(),
    })
}

fn sample_type_name(result: &DecodingResult) -> &'static str {
    match result {
        DecodingResult::U8(_) => "u8",
        DecodingResult::U16(_) => "u16",
        DecodingResult::U32(_) => "u32",
        DecodingResult::U64(_) => "u64",
        DecodingResult::F32(_) => "f32",
        DecodingResult::F64(_) => "f64",
        _ => "signed integer",
    }
}

fn write_page<W: Write + Seek>(
    encoder: &mut TiffEncoder<W>,
    plane: PlaneView<'_>,
) -> Result<(), PipelineError> {
    match plane {
        PlaneView::U8(view) => write_gray_page::<colortype::Gray8, _>(encoder, view),
        PlaneView::U16(view) => write_gray_page::<colortype::Gray16, _>(encoder, view),
        PlaneView::F32(view) => write_gray_page::<colortype::Gray32Float, _>(encoder, view),
    }
}

fn write_gray_page<C, W>(
    encoder: &mut TiffEncoder<W>,
    plane: ArrayView2<'_, C::Inner>,
) -> Result<(), PipelineError>
where
    C: ColorType,
    C::Inner: Copy,
    [C::Inner]: TiffValue,
    W: Write + Seek,
{
    let (rows, cols) = plane.dim();
    match plane.as_slice() {
        Some(data) => encoder.write_image::<C>(cols as u32, rows as u32, data)?,
        None => {
            let data: Vec<C::Inner> = plane.iter().copied().collect();
            encoder.write_image::<C>(cols as u32, rows as u32, &data)?;
        }
    }
    Ok(())
}

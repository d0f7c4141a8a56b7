//! Minimal NumPy `.npy` (format 1.0, C order, little endian) support for the
//! per-slice artifacts.

use ndarray::{ArrayD, ArrayView, Dimension, IxDyn};
use std::{
    fs::File,
    io::{BufReader, BufWriter, Read, Write},
    path::Path,
};
use thiserror::Error;

const MAGIC: &[u8] = b"\x93NUMPY";

#[derive(Debug, Error)]
pub enum NpyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported npy header: {0}")]
    Header(String),

    #[error("Array shape does not match data: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

/// Element types that can be written to `.npy`
pub trait NpyElement: bytemuck::Pod {
    const DESCR: &'static str;
}

impl NpyElement for i16 {
    const DESCR: &'static str = "<i2";
}

impl NpyElement for f32 {
    const DESCR: &'static str = "<f4";
}

fn header(descr: &str, shape: &[usize]) -> Vec<u8> {
    let dims: Vec<String> = shape.iter().map(|d| d.to_string()).collect();
    let shape_str = if dims.len() == 1 {
        format!("({},)", dims[0])
    } else {
        format!("({})", dims.join(", "))
    };
    let dict = format!("{{'descr': '{descr}', 'fortran_order': False, 'shape': {shape_str}, }}");

    // magic + version + length field + dict + newline, padded to 64 bytes
    let unpadded = MAGIC.len() + 2 + 2 + dict.len() + 1;
    let pad = (64 - unpadded % 64) % 64;
    let mut text = dict.into_bytes();
    text.extend(std::iter::repeat_n(b' ', pad));
    text.push(b'\n');

    let mut out = Vec::with_capacity(MAGIC.len() + 4 + text.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&[1, 0]);
    out.extend_from_slice(&(text.len() as u16).to_le_bytes());
    out.extend_from_slice(&text);
    out
}

/// Write an array as a `.npy` file
pub fn write_npy<T: NpyElement, D: Dimension>(
    path: impl AsRef<Path>,
    array: &ArrayView<T, D>,
) -> Result<(), NpyError> {
    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(&header(T::DESCR, array.shape()))?;

    match array.as_slice() {
        Some(data) => writer.write_all(bytemuck::cast_slice(data))?,
        None => {
            let data: Vec<T> = array.iter().copied().collect();
            writer.write_all(bytemuck::cast_slice(&data))?;
        }
    }
    writer.flush()?;
    Ok(())
}

/// Read a `.npy` file written by [`write_npy`]
pub fn read_npy<T: NpyElement>(path: impl AsRef<Path>) -> Result<ArrayD<T>, NpyError> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut preamble = [0u8; 10];
    reader.read_exact(&mut preamble)?;
    if &preamble[..6] != MAGIC || preamble[6] != 1 {
        return Err(NpyError::Header("not a version 1 npy file".into()));
    }
    let header_len = u16::from_le_bytes([preamble[8], preamble[9]]) as usize;
    let mut text = vec![0u8; header_len];
    reader.read_exact(&mut text)?;
    let text = String::from_utf8_lossy(&text);

    if !text.contains(&format!("'descr': '{}'", T::DESCR)) {
        return Err(NpyError::Header(format!("expected dtype {}: {text}", T::DESCR)));
    }
    if !text.contains("'fortran_order': False") {
        return Err(NpyError::Header("fortran order is not supported".into()));
    }
    let shape = parse_shape(&text).ok_or_else(|| NpyError::Header(text.to_string()))?;

    let count: usize = shape.iter().product();
    let mut data = vec![T::zeroed(); count];
    reader.read_exact(bytemuck::cast_slice_mut(&mut data))?;
    Ok(ArrayD::from_shape_vec(IxDyn(&shape), data)?)
}

fn parse_shape(header: &str) -> Option<Vec<usize>> {
    let start = header.find("'shape': (")? + "'shape': (".len();
    let end = start + header[start..].find(')')?;
    header[start..end]
        .split(',')
        .map(str::trim)
        .filter(|dim| !dim.is_empty())
        .map(|dim| dim.parse().ok())
        .collect()
}

//! NIfTI-1 volume I/O
//!
//! Reading goes through the `nifti` crate; writing uses a hand-built
//! 348-byte header so that scalar fields can be stored as FLOAT64 and vote
//! maps as UINT32. Paths ending in `.nii.gz` are gzip-compressed; on read,
//! gzip is detected from the magic bytes instead of the extension.
//!
//! The header's `pixdim` and `srow_*` fields are single precision, so every
//! file written here also carries a private header extension holding the
//! voxel size and affine as FLOAT64. The loader prefers that extension and
//! falls back to the header fields for files from other writers.

use std::borrow::Cow;
use std::fs;
use std::io::{Cursor, Read, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::debug;
use ndarray::{Array, IxDyn};
use nifti::volume::ndarray::IntoNdArray;
use nifti::{InMemNiftiObject, NiftiHeader, NiftiObject};

use crate::error::{Dims, Result, VesselError};
use crate::volume::{Mask, Vec3, Volume, VolumeMeta, VoteMap};

const HEADER_SIZE: usize = 348;
/// NIFTI_ECODE_IGNORE; other readers skip the block
const META_ECODE: i32 = 0;
const META_TAG: &[u8; 8] = b"VXLMETA1";
/// esize, ecode, tag and 15 doubles, padded to a multiple of 16
const META_EXTENSION_SIZE: usize = 144;
const VOX_OFFSET: usize = HEADER_SIZE + 4 + META_EXTENSION_SIZE;

/// Loading and saving of co-registered volumes
pub trait VolumeStore {
    fn load(&self, path: &Path) -> Result<Volume<f64>>;
    fn save(&self, volume: &Volume<f64>, path: &Path) -> Result<()>;
}

/// Voxel encodings the writer produces
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Datatype {
    Uint8,
    Uint32,
    Float64,
}

impl Datatype {
    fn code(self) -> i16 {
        match self {
            Datatype::Uint8 => 2,
            Datatype::Uint32 => 768,
            Datatype::Float64 => 64,
        }
    }

    fn bitpix(self) -> i16 {
        match self {
            Datatype::Uint8 => 8,
            Datatype::Uint32 => 32,
            Datatype::Float64 => 64,
        }
    }
}

fn is_gzip(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[0] == 0x1f && bytes[1] == 0x8b
}

fn wants_gzip(path: &Path) -> bool {
    path.to_string_lossy().ends_with(".nii.gz")
}

/// Short header summary appended to read errors
fn header_summary(bytes: &[u8]) -> String {
    if bytes.len() < HEADER_SIZE {
        return format!("file too small ({} bytes, need at least {})", bytes.len(), HEADER_SIZE);
    }
    let sizeof_hdr = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let magic = String::from_utf8_lossy(&bytes[344..348]).to_string();
    let datatype = i16::from_le_bytes([bytes[70], bytes[71]]);
    format!("sizeof_hdr={}, magic='{}', datatype={}", sizeof_hdr, magic, datatype)
}

fn inflate(bytes: &[u8]) -> Result<Cow<'_, [u8]>> {
    if !is_gzip(bytes) {
        return Ok(Cow::Borrowed(bytes));
    }
    let mut decompressed = Vec::new();
    GzDecoder::new(Cursor::new(bytes))
        .read_to_end(&mut decompressed)
        .map_err(|e| VesselError::Nifti(format!("failed to decompress: {}", e)))?;
    Ok(Cow::Owned(decompressed))
}

fn read_object(bytes: &[u8]) -> Result<InMemNiftiObject> {
    InMemNiftiObject::from_reader(Cursor::new(bytes))
        .map_err(|e| VesselError::Nifti(format!("{} ({})", e, header_summary(bytes))))
}

fn le_i32(bytes: &[u8], at: usize) -> Option<i32> {
    bytes.get(at..at + 4)?.try_into().ok().map(i32::from_le_bytes)
}

/// Full-precision metadata from the private extension, if the file has one
fn stored_meta(bytes: &[u8]) -> Option<VolumeMeta> {
    if le_i32(bytes, 0)? != HEADER_SIZE as i32 || *bytes.get(HEADER_SIZE)? == 0 {
        return None;
    }
    let vox_offset: [u8; 4] = bytes.get(108..112)?.try_into().ok()?;
    let end = (f32::from_le_bytes(vox_offset) as usize).min(bytes.len());

    let mut at = HEADER_SIZE + 4;
    while at + 8 <= end {
        let esize = usize::try_from(le_i32(bytes, at)?).ok().filter(|&n| n >= 8 && at + n <= end)?;
        let data = &bytes[at + 8..at + esize];
        if le_i32(bytes, at + 4)? == META_ECODE && data.starts_with(META_TAG) {
            return parse_meta(&data[META_TAG.len()..]);
        }
        at += esize;
    }
    None
}

fn parse_meta(data: &[u8]) -> Option<VolumeMeta> {
    let values: Vec<f64> = data
        .chunks_exact(8)
        .take(15)
        .map(|c| c.try_into().map(f64::from_le_bytes))
        .collect::<std::result::Result<_, _>>()
        .ok()?;
    if values.len() < 15 {
        return None;
    }
    let mut affine = [0.0; 16];
    affine[..12].copy_from_slice(&values[3..15]);
    affine[15] = 1.0;
    Some(VolumeMeta { voxel_size: (values[0], values[1], values[2]), affine })
}

fn meta_extension(meta: &VolumeMeta) -> Vec<u8> {
    let mut ext = Vec::with_capacity(META_EXTENSION_SIZE);
    ext.extend_from_slice(&(META_EXTENSION_SIZE as i32).to_le_bytes());
    ext.extend_from_slice(&META_ECODE.to_le_bytes());
    ext.extend_from_slice(META_TAG);
    let (vx, vy, vz) = meta.voxel_size;
    for v in [vx, vy, vz].iter().chain(&meta.affine[..12]) {
        ext.extend_from_slice(&v.to_le_bytes());
    }
    ext.resize(META_EXTENSION_SIZE, 0);
    ext
}

/// Voxel-to-world affine: sform when present, otherwise the pixdim diagonal
fn get_affine(header: &NiftiHeader) -> [f64; 16] {
    if header.sform_code > 0 {
        let x = header.srow_x;
        let y = header.srow_y;
        let z = header.srow_z;
        [
            x[0] as f64, x[1] as f64, x[2] as f64, x[3] as f64,
            y[0] as f64, y[1] as f64, y[2] as f64, y[3] as f64,
            z[0] as f64, z[1] as f64, z[2] as f64, z[3] as f64,
            0.0, 0.0, 0.0, 1.0,
        ]
    } else {
        let p = header.pixdim;
        [
            p[1] as f64, 0.0, 0.0, 0.0,
            0.0, p[2] as f64, 0.0, 0.0,
            0.0, 0.0, p[3] as f64, 0.0,
            0.0, 0.0, 0.0, 1.0,
        ]
    }
}

fn meta_from_header(header: &NiftiHeader) -> VolumeMeta {
    let p = header.pixdim;
    let size = |v: f32| if v == 0.0 { 1.0 } else { (v as f64).abs() };
    VolumeMeta {
        voxel_size: (size(p[1]), size(p[2]), size(p[3])),
        affine: get_affine(header),
    }
}

fn decode(bytes: &[u8]) -> Result<(VolumeMeta, Array<f64, IxDyn>)> {
    let bytes = inflate(bytes)?;
    let obj = read_object(&bytes)?;
    let meta = stored_meta(&bytes).unwrap_or_else(|| meta_from_header(obj.header()));
    let array: Array<f64, IxDyn> = obj
        .into_volume()
        .into_ndarray()
        .map_err(|e| VesselError::Nifti(format!("failed to convert voxel data: {}", e)))?;
    if array.ndim() < 3 {
        return Err(VesselError::Nifti(format!("expected at least 3 dimensions, got {}", array.ndim())));
    }
    Ok((meta, array))
}

/// Load a scalar volume; 4-D files yield their first volume.
pub fn load_nifti(bytes: &[u8]) -> Result<Volume<f64>> {
    let (meta, array) = decode(bytes)?;
    let shape = array.shape().to_vec();
    let dims = (shape[0], shape[1], shape[2]);

    let mut data = Vec::with_capacity(dims.0 * dims.1 * dims.2);
    let mut index = vec![0; shape.len()];
    for k in 0..dims.2 {
        for j in 0..dims.1 {
            for i in 0..dims.0 {
                index[..3].copy_from_slice(&[i, j, k]);
                data.push(array[index.as_slice()]);
            }
        }
    }
    Volume::from_vec(data, dims, meta)
}

/// Load a vector field stored as a 4-D file with 3 components along the
/// fourth axis.
pub fn load_nifti_vectors(bytes: &[u8]) -> Result<Volume<Vec3>> {
    let (meta, array) = decode(bytes)?;
    let shape = array.shape();
    if shape.len() != 4 || shape[3] != 3 {
        return Err(VesselError::Nifti(format!("expected a vector volume of shape [x, y, z, 3], got {:?}", shape)));
    }
    let dims = (shape[0], shape[1], shape[2]);

    let mut data = Vec::with_capacity(dims.0 * dims.1 * dims.2);
    for k in 0..dims.2 {
        for j in 0..dims.1 {
            for i in 0..dims.0 {
                data.push([array[[i, j, k, 0]], array[[i, j, k, 1]], array[[i, j, k, 2]]]);
            }
        }
    }
    Volume::from_vec(data, dims, meta)
}

fn header_dim(n: usize) -> Result<i16> {
    i16::try_from(n).map_err(|_| VesselError::Nifti(format!("dimension {} does not fit a NIfTI-1 header", n)))
}

/// Header, extension block with the full-precision metadata, then `payload`
fn encode(dims: Dims, components: usize, datatype: Datatype, meta: &VolumeMeta, payload: &[u8]) -> Result<Vec<u8>> {
    let mut header = vec![0u8; HEADER_SIZE];
    header[0..4].copy_from_slice(&(HEADER_SIZE as i32).to_le_bytes());

    let ndim: i16 = if components > 1 { 4 } else { 3 };
    let dim = [
        ndim,
        header_dim(dims.0)?,
        header_dim(dims.1)?,
        header_dim(dims.2)?,
        header_dim(components)?,
        1,
        1,
        1,
    ];
    for (n, d) in dim.iter().enumerate() {
        let off = 40 + n * 2;
        header[off..off + 2].copy_from_slice(&d.to_le_bytes());
    }

    header[70..72].copy_from_slice(&datatype.code().to_le_bytes());
    header[72..74].copy_from_slice(&datatype.bitpix().to_le_bytes());

    let (vx, vy, vz) = meta.voxel_size;
    let pixdim = [1.0f32, vx as f32, vy as f32, vz as f32, 1.0, 1.0, 1.0, 1.0];
    for (n, p) in pixdim.iter().enumerate() {
        let off = 76 + n * 4;
        header[off..off + 4].copy_from_slice(&p.to_le_bytes());
    }

    header[108..112].copy_from_slice(&(VOX_OFFSET as f32).to_le_bytes());
    header[112..116].copy_from_slice(&1.0f32.to_le_bytes());
    header[116..120].copy_from_slice(&0.0f32.to_le_bytes());
    // xyzt_units: millimetres
    header[123] = 2;

    header[254..256].copy_from_slice(&1i16.to_le_bytes());
    for (row, off) in [280usize, 296, 312].into_iter().enumerate() {
        for col in 0..4 {
            let v = meta.affine[row * 4 + col] as f32;
            let o = off + col * 4;
            header[o..o + 4].copy_from_slice(&v.to_le_bytes());
        }
    }
    header[344..348].copy_from_slice(b"n+1\0");

    let mut bytes = Vec::with_capacity(VOX_OFFSET + payload.len());
    bytes.extend_from_slice(&header);
    bytes.extend_from_slice(&[1, 0, 0, 0]);
    bytes.extend_from_slice(&meta_extension(meta));
    bytes.extend_from_slice(payload);
    Ok(bytes)
}

fn gzip(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(bytes)
        .and_then(|_| encoder.finish())
        .map_err(|e| VesselError::Nifti(format!("failed to compress: {}", e)))
}

/// Encode a scalar volume as an uncompressed FLOAT64 NIfTI-1 file
pub fn save_nifti(volume: &Volume<f64>) -> Result<Vec<u8>> {
    let payload: Vec<u8> = volume.data.iter().flat_map(|v| v.to_le_bytes()).collect();
    encode(volume.dims, 1, Datatype::Float64, &volume.meta, &payload)
}

pub fn save_nifti_gz(volume: &Volume<f64>) -> Result<Vec<u8>> {
    gzip(&save_nifti(volume)?)
}

/// Vector components are written as three consecutive 3-D blocks.
pub fn save_nifti_vectors(volume: &Volume<Vec3>) -> Result<Vec<u8>> {
    let mut payload = Vec::with_capacity(volume.len() * 3 * 8);
    for c in 0..3 {
        for v in &volume.data {
            payload.extend_from_slice(&v[c].to_le_bytes());
        }
    }
    encode(volume.dims, 3, Datatype::Float64, &volume.meta, &payload)
}

pub fn save_nifti_votes(votes: &VoteMap) -> Result<Vec<u8>> {
    let payload: Vec<u8> = votes.data.iter().flat_map(|v| v.to_le_bytes()).collect();
    encode(votes.dims, 1, Datatype::Uint32, &votes.meta, &payload)
}

pub fn save_nifti_mask(mask: &Mask) -> Result<Vec<u8>> {
    encode(mask.dims, 1, Datatype::Uint8, &mask.meta, &mask.data)
}

/// NIfTI-1 files on disk
#[derive(Clone, Copy, Debug, Default)]
pub struct NiftiStore;

impl NiftiStore {
    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        fs::read(path).map_err(|source| VesselError::Io { path: path.to_path_buf(), source })
    }

    fn write(&self, path: &Path, bytes: Vec<u8>) -> Result<()> {
        let bytes = if wants_gzip(path) { gzip(&bytes)? } else { bytes };
        fs::write(path, &bytes).map_err(|source| VesselError::Io { path: path.to_path_buf(), source })?;
        debug!("wrote {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }

    /// Load a mask; every voxel with a value above zero is foreground.
    pub fn load_mask(&self, path: &Path) -> Result<Mask> {
        Ok(self.load(path)?.to_mask(0.0))
    }

    pub fn load_vectors(&self, path: &Path) -> Result<Volume<Vec3>> {
        load_nifti_vectors(&self.read(path)?)
    }

    pub fn save_vectors(&self, volume: &Volume<Vec3>, path: &Path) -> Result<()> {
        self.write(path, save_nifti_vectors(volume)?)
    }

    pub fn save_votes(&self, votes: &VoteMap, path: &Path) -> Result<()> {
        self.write(path, save_nifti_votes(votes)?)
    }

    pub fn save_mask(&self, mask: &Mask, path: &Path) -> Result<()> {
        self.write(path, save_nifti_mask(mask)?)
    }
}

impl VolumeStore for NiftiStore {
    fn load(&self, path: &Path) -> Result<Volume<f64>> {
        let volume = load_nifti(&self.read(path)?)?;
        debug!("loaded {} with dims {:?}", path.display(), volume.dims);
        Ok(volume)
    }

    fn save(&self, volume: &Volume<f64>, path: &Path) -> Result<()> {
        self.write(path, save_nifti(volume)?)
    }
}

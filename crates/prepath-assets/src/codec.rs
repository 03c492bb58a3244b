//! Binary model cache format (`.modelcache`).
//!
//! ```text
//! Header (8 bytes):
//!   magic:   [u8; 4] = b"PPMC"
//!   version: u32 LE  = FORMAT_VERSION
//!
//! Body:
//!   u32 mesh count,     then per mesh:
//!       positions, normals, tex_coords, tangents, bitangents  (u32 count + packed f32 vectors)
//!       material_index: u32
//!   u32 material count, then per material:
//!       albedo, normal, metallic, roughness, emissive, ao  (u32 length + UTF-8 bytes)
//!       diffuse_color: 3 x f32, metallic: f32, roughness: f32
//!   u32 light count,    then per light:
//!       kind tag: u32, position, direction, color (3 x f32 each),
//!       intensity, range, inner_cone, outer_cone (f32)
//!   u32 texture count,  then per texture: string
//! ```
//!
//! Scalars are little-endian. Vector arrays are written as raw packed
//! elements in host layout. Decoding is bounds-checked everywhere: a
//! truncated or otherwise malformed file produces a [`CodecError`], never a
//! partially filled model.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use bytemuck::Pod;
use glam::{Vec2, Vec3};

use crate::error::AssetError;
use crate::model::{CachedLight, CachedMaterial, CachedMeshData, CachedModelData, LightKind};

pub const MAGIC: [u8; 4] = *b"PPMC";
pub const FORMAT_VERSION: u32 = 1;

/// Errors produced while encoding or decoding cache bytes.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("unexpected end of data: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEof { needed: usize, remaining: usize },

    #[error("invalid magic number")]
    InvalidMagic,

    #[error("unsupported format version {0}")]
    UnsupportedVersion(u32),

    #[error("string is not valid UTF-8")]
    InvalidUtf8,

    #[error("unknown light kind tag {0}")]
    UnknownLightKind(u32),

    #[error("{0} trailing bytes after model data")]
    TrailingBytes(usize),

    #[error("sequence of {0} elements does not fit the format")]
    TooLong(usize),

    #[error("{0}")]
    Invalid(String),
}

// ─── Writer ─────────────────────────────────────────────────────────────────

/// Append-only little-endian encoder over a byte buffer.
#[derive(Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    pub fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_f32(&mut self, v: f32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_vec3(&mut self, v: Vec3) {
        self.write_f32(v.x);
        self.write_f32(v.y);
        self.write_f32(v.z);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_len(&mut self, len: usize) -> Result<(), CodecError> {
        let len = u32::try_from(len).map_err(|_| CodecError::TooLong(len))?;
        self.write_u32(len);
        Ok(())
    }

    /// Length-prefixed string. An empty string is just a zero length.
    pub fn write_str(&mut self, s: &str) -> Result<(), CodecError> {
        self.write_len(s.len())?;
        self.write_bytes(s.as_bytes());
        Ok(())
    }

    /// Count-prefixed array of plain-old-data elements.
    pub fn write_pod_slice<T: Pod>(&mut self, values: &[T]) -> Result<(), CodecError> {
        self.write_len(values.len())?;
        self.write_bytes(bytemuck::cast_slice(values));
        Ok(())
    }
}

// ─── Reader ─────────────────────────────────────────────────────────────────

/// Bounds-checked cursor over encoded bytes.
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        if len > self.remaining() {
            return Err(CodecError::UnexpectedEof {
                needed: len,
                remaining: self.remaining(),
            });
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    pub fn read_u32(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u64(&mut self) -> Result<u64, CodecError> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    pub fn read_f32(&mut self) -> Result<f32, CodecError> {
        Ok(f32::from_le_bytes(self.read_array()?))
    }

    pub fn read_vec3(&mut self) -> Result<Vec3, CodecError> {
        Ok(Vec3::new(self.read_f32()?, self.read_f32()?, self.read_f32()?))
    }

    pub fn read_string(&mut self) -> Result<String, CodecError> {
        let len = self.read_u32()? as usize;
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::InvalidUtf8)
    }

    /// Read a count-prefixed POD array. The byte size is checked against the
    /// remaining input before anything is allocated, so a corrupt count
    /// cannot trigger a huge allocation.
    pub fn read_pod_vec<T: Pod>(&mut self) -> Result<Vec<T>, CodecError> {
        let count = self.read_u32()? as usize;
        let byte_len = count
            .checked_mul(std::mem::size_of::<T>())
            .ok_or(CodecError::TooLong(count))?;
        let bytes = self.read_bytes(byte_len)?;
        let mut out = vec![T::zeroed(); count];
        bytemuck::cast_slice_mut::<T, u8>(&mut out).copy_from_slice(bytes);
        Ok(out)
    }

    /// Read a record count, rejecting counts that could not possibly fit in
    /// the remaining bytes given each record's minimum encoded size.
    fn read_count(&mut self, min_record_size: usize) -> Result<usize, CodecError> {
        let count = self.read_u32()? as usize;
        let needed = count.saturating_mul(min_record_size);
        if needed > self.remaining() {
            return Err(CodecError::UnexpectedEof {
                needed,
                remaining: self.remaining(),
            });
        }
        Ok(count)
    }
}

// Minimum encoded record sizes, used to sanity-check counts.
const MIN_MESH_SIZE: usize = 5 * 4 + 4;
const MIN_MATERIAL_SIZE: usize = 6 * 4 + 5 * 4;
const LIGHT_SIZE: usize = 4 + 9 * 4 + 4 * 4;
const MIN_STRING_SIZE: usize = 4;

// ─── Records ────────────────────────────────────────────────────────────────

fn write_mesh(w: &mut Writer, mesh: &CachedMeshData) -> Result<(), CodecError> {
    w.write_pod_slice::<Vec3>(&mesh.positions)?;
    w.write_pod_slice::<Vec3>(&mesh.normals)?;
    w.write_pod_slice::<Vec2>(&mesh.tex_coords)?;
    w.write_pod_slice::<Vec3>(&mesh.tangents)?;
    w.write_pod_slice::<Vec3>(&mesh.bitangents)?;
    w.write_u32(mesh.material_index);
    Ok(())
}

fn read_mesh(r: &mut Reader<'_>) -> Result<CachedMeshData, CodecError> {
    Ok(CachedMeshData {
        positions: r.read_pod_vec()?,
        normals: r.read_pod_vec()?,
        tex_coords: r.read_pod_vec()?,
        tangents: r.read_pod_vec()?,
        bitangents: r.read_pod_vec()?,
        material_index: r.read_u32()?,
    })
}

fn write_material(w: &mut Writer, mat: &CachedMaterial) -> Result<(), CodecError> {
    w.write_str(&mat.albedo_path)?;
    w.write_str(&mat.normal_path)?;
    w.write_str(&mat.metallic_path)?;
    w.write_str(&mat.roughness_path)?;
    w.write_str(&mat.emissive_path)?;
    w.write_str(&mat.ao_path)?;
    w.write_vec3(mat.diffuse_color);
    w.write_f32(mat.metallic);
    w.write_f32(mat.roughness);
    Ok(())
}

fn read_material(r: &mut Reader<'_>) -> Result<CachedMaterial, CodecError> {
    Ok(CachedMaterial {
        albedo_path: r.read_string()?,
        normal_path: r.read_string()?,
        metallic_path: r.read_string()?,
        roughness_path: r.read_string()?,
        emissive_path: r.read_string()?,
        ao_path: r.read_string()?,
        diffuse_color: r.read_vec3()?,
        metallic: r.read_f32()?,
        roughness: r.read_f32()?,
    })
}

fn write_light(w: &mut Writer, light: &CachedLight) {
    w.write_u32(light.kind.tag());
    w.write_vec3(light.position);
    w.write_vec3(light.direction);
    w.write_vec3(light.color);
    w.write_f32(light.intensity);
    w.write_f32(light.range);
    w.write_f32(light.inner_cone);
    w.write_f32(light.outer_cone);
}

fn read_light(r: &mut Reader<'_>) -> Result<CachedLight, CodecError> {
    let tag = r.read_u32()?;
    let kind = LightKind::from_tag(tag).ok_or(CodecError::UnknownLightKind(tag))?;
    Ok(CachedLight {
        kind,
        position: r.read_vec3()?,
        direction: r.read_vec3()?,
        color: r.read_vec3()?,
        intensity: r.read_f32()?,
        range: r.read_f32()?,
        inner_cone: r.read_f32()?,
        outer_cone: r.read_f32()?,
    })
}

// ─── Top level ──────────────────────────────────────────────────────────────

/// Encode a model, header included.
pub fn encode_model(model: &CachedModelData) -> Result<Vec<u8>, CodecError> {
    let mut w = Writer::new();
    w.write_bytes(&MAGIC);
    w.write_u32(FORMAT_VERSION);

    w.write_len(model.meshes.len())?;
    for mesh in &model.meshes {
        write_mesh(&mut w, mesh)?;
    }

    w.write_len(model.materials.len())?;
    for mat in &model.materials {
        write_material(&mut w, mat)?;
    }

    w.write_len(model.lights.len())?;
    for light in &model.lights {
        write_light(&mut w, light);
    }

    w.write_len(model.texture_paths.len())?;
    for path in &model.texture_paths {
        w.write_str(path)?;
    }

    Ok(w.into_inner())
}

/// Decode a complete model. The whole input must be consumed and the result
/// must pass [`CachedModelData::validate`].
pub fn decode_model(data: &[u8]) -> Result<CachedModelData, CodecError> {
    let mut r = Reader::new(data);

    if r.read_bytes(MAGIC.len())? != MAGIC {
        return Err(CodecError::InvalidMagic);
    }
    let version = r.read_u32()?;
    if version != FORMAT_VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }

    let mesh_count = r.read_count(MIN_MESH_SIZE)?;
    let mut meshes = Vec::with_capacity(mesh_count);
    for _ in 0..mesh_count {
        meshes.push(read_mesh(&mut r)?);
    }

    let material_count = r.read_count(MIN_MATERIAL_SIZE)?;
    let mut materials = Vec::with_capacity(material_count);
    for _ in 0..material_count {
        materials.push(read_material(&mut r)?);
    }

    let light_count = r.read_count(LIGHT_SIZE)?;
    let mut lights = Vec::with_capacity(light_count);
    for _ in 0..light_count {
        lights.push(read_light(&mut r)?);
    }

    let texture_count = r.read_count(MIN_STRING_SIZE)?;
    let mut texture_paths = Vec::with_capacity(texture_count);
    for _ in 0..texture_count {
        texture_paths.push(r.read_string()?);
    }

    if r.remaining() != 0 {
        return Err(CodecError::TrailingBytes(r.remaining()));
    }

    let model = CachedModelData {
        meshes,
        materials,
        lights,
        texture_paths,
    };
    model.validate().map_err(CodecError::Invalid)?;
    Ok(model)
}

/// Read and decode a model cache file.
pub fn read_model_file(path: &Path) -> Result<CachedModelData, AssetError> {
    let data = fs::read(path).map_err(|e| AssetError::Io(path.to_path_buf(), e))?;
    decode_model(&data).map_err(|e| match e {
        CodecError::UnsupportedVersion(found) => AssetError::CacheVersionMismatch {
            path: path.to_path_buf(),
            found,
            expected: FORMAT_VERSION,
        },
        other => AssetError::corrupt(path, other.to_string()),
    })
}

/// Encode a model and write it to `path`.
///
/// The bytes go to a sibling temporary file which is then renamed over
/// `path`, so readers never observe a half-written cache.
pub fn write_model_file(path: &Path, model: &CachedModelData) -> Result<(), AssetError> {
    let bytes = encode_model(model)
        .map_err(|e| AssetError::CacheWriteFailure(path.to_path_buf(), io::Error::other(e)))?;
    write_atomic(path, &bytes).map_err(|e| AssetError::CacheWriteFailure(path.to_path_buf(), e))
}

/// Write `bytes` to `path` through a temporary sibling file and a rename.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let tmp = temp_path(path);
    if let Err(e) = fs::write(&tmp, bytes).and_then(|_| fs::rename(&tmp, path)) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_model() -> CachedModelData {
        let mut spot = CachedLight::new(LightKind::Spot);
        spot.position = Vec3::new(1.0, 2.0, 3.0);
        spot.inner_cone = 20.0;
        spot.outer_cone = 35.0;

        CachedModelData {
            meshes: vec![
                CachedMeshData {
                    positions: vec![Vec3::ZERO, Vec3::X, Vec3::Y],
                    normals: vec![Vec3::Z; 3],
                    tex_coords: vec![Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0), Vec2::new(0.0, 1.0)],
                    tangents: vec![Vec3::X; 3],
                    bitangents: vec![Vec3::Y; 3],
                    material_index: 1,
                },
                CachedMeshData::new(0),
            ],
            materials: vec![
                CachedMaterial::default(),
                CachedMaterial {
                    albedo_path: "models/textures/albedo.png".into(),
                    normal_path: "models/textures/normal.png".into(),
                    diffuse_color: Vec3::new(0.5, 0.25, 1.0),
                    metallic: 0.75,
                    roughness: 0.3,
                    ..Default::default()
                },
            ],
            lights: vec![CachedLight::new(LightKind::Directional), spot],
            texture_paths: vec![
                "models/textures/albedo.png".into(),
                "models/textures/normal.png".into(),
                "models/textures/ünïcode.png".into(),
            ],
        }
    }

    #[test]
    fn round_trip_preserves_every_field() {
        let model = sample_model();
        let bytes = encode_model(&model).unwrap();
        assert_eq!(decode_model(&bytes).unwrap(), model);
    }

    #[test]
    fn round_trip_empty_model() {
        let model = CachedModelData::default();
        let bytes = encode_model(&model).unwrap();
        assert_eq!(bytes.len(), 8 + 4 * 4);
        assert_eq!(decode_model(&bytes).unwrap(), model);
    }

    #[test]
    fn empty_string_has_no_payload() {
        let mut w = Writer::new();
        w.write_str("").unwrap();
        assert_eq!(w.into_inner(), vec![0, 0, 0, 0]);
    }

    #[test]
    fn truncation_at_any_offset_is_an_error() {
        let bytes = encode_model(&sample_model()).unwrap();
        for len in 0..bytes.len() {
            assert!(
                decode_model(&bytes[..len]).is_err(),
                "decoding {len} of {} bytes should fail",
                bytes.len()
            );
        }
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut bytes = encode_model(&sample_model()).unwrap();
        bytes.push(0);
        assert_eq!(decode_model(&bytes), Err(CodecError::TrailingBytes(1)));
    }

    #[test]
    fn wrong_version_is_reported() {
        let mut bytes = encode_model(&sample_model()).unwrap();
        bytes[4..8].copy_from_slice(&(FORMAT_VERSION + 1).to_le_bytes());
        assert_eq!(
            decode_model(&bytes),
            Err(CodecError::UnsupportedVersion(FORMAT_VERSION + 1))
        );
    }

    #[test]
    fn wrong_magic_is_reported() {
        let mut bytes = encode_model(&sample_model()).unwrap();
        bytes[0] = b'X';
        assert_eq!(decode_model(&bytes), Err(CodecError::InvalidMagic));
    }

    #[test]
    fn huge_count_does_not_allocate() {
        let mut w = Writer::new();
        w.write_bytes(&MAGIC);
        w.write_u32(FORMAT_VERSION);
        w.write_u32(u32::MAX);
        let err = decode_model(&w.into_inner()).unwrap_err();
        assert!(matches!(err, CodecError::UnexpectedEof { .. }));
    }

    #[test]
    fn unknown_light_tag_is_rejected() {
        let mut model = CachedModelData::default();
        model.lights.push(CachedLight::new(LightKind::Point));
        let mut bytes = encode_model(&model).unwrap();
        // header + mesh count + material count + light count
        let tag_offset = 8 + 4 + 4 + 4;
        bytes[tag_offset..tag_offset + 4].copy_from_slice(&9u32.to_le_bytes());
        assert_eq!(decode_model(&bytes), Err(CodecError::UnknownLightKind(9)));
    }

    #[test]
    fn file_round_trip_and_version_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scene.gltf.modelcache");
        let model = sample_model();

        write_model_file(&path, &model).unwrap();
        assert_eq!(read_model_file(&path).unwrap(), model);
        assert!(!temp_path(&path).exists());

        let mut bytes = fs::read(&path).unwrap();
        bytes[4..8].copy_from_slice(&0u32.to_le_bytes());
        fs::write(&path, bytes).unwrap();
        assert!(matches!(
            read_model_file(&path),
            Err(AssetError::CacheVersionMismatch { found: 0, .. })
        ));
    }

    #[test]
    fn write_into_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("scene.modelcache");
        let err = write_model_file(&path, &sample_model()).unwrap_err();
        assert!(matches!(err, AssetError::CacheWriteFailure(..)));
    }
}

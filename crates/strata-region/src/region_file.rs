use flate2::read::{GzDecoder, ZlibDecoder};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use thiserror::Error;

const SECTOR_BYTES: u64 = 4096;
const COMPRESSION_GZIP: u8 = 1;
const COMPRESSION_ZLIB: u8 = 2;
const COMPRESSION_NONE: u8 = 3;

#[derive(Debug, Error)]
pub enum RegionError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("unsupported compression scheme {0}")]
    UnsupportedScheme(u8),
    #[error("failed to decompress chunk payload: {0}")]
    Decompression(io::Error),
    #[error("chunk payload is truncated")]
    TruncatedPayload,
}

pub type RegionResult<T> = Result<T, RegionError>;

/// A single region file handle (32x32 chunk container, read path only).
///
/// Layout: 4 KiB location table (1024 big-endian u32s, high 24 bits sector
/// offset, low 8 bits sector count), 4 KiB timestamp table, then chunk
/// payloads of `u32 length | u8 scheme | length-1 compressed bytes`.
pub struct RegionFile {
    file: File,
    locations: [u32; 1024],
}

impl RegionFile {
    pub fn open(path: &Path) -> RegionResult<Self> {
        let mut file = File::open(path)?;

        let mut loc_buf = [0u8; 4096];
        file.read_exact(&mut loc_buf)?;
        let mut locations = [0u32; 1024];
        for i in 0..1024 {
            locations[i] = u32::from_be_bytes([
                loc_buf[i * 4],
                loc_buf[i * 4 + 1],
                loc_buf[i * 4 + 2],
                loc_buf[i * 4 + 3],
            ]);
        }

        Ok(Self { file, locations })
    }

    /// Whether the location table has an entry for the given local chunk.
    pub fn contains_chunk(&self, local_x: usize, local_z: usize) -> bool {
        self.locations[local_x + local_z * 32] != 0
    }

    /// Read and decompress one chunk payload. Returns None for chunks the
    /// location table does not list.
    pub fn read_chunk(&mut self, local_x: usize, local_z: usize) -> RegionResult<Option<Vec<u8>>> {
        let index = local_x + local_z * 32;
        let loc = self.locations[index];
        if loc == 0 {
            return Ok(None);
        }

        let sector = (loc >> 8) as u64;
        let _count = (loc & 0xFF) as usize;

        self.file.seek(SeekFrom::Start(sector * SECTOR_BYTES))?;

        let mut header = [0u8; 5];
        self.file.read_exact(&mut header)?;
        let length = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
        let scheme = header[4];

        if length <= 1 {
            return Err(RegionError::TruncatedPayload);
        }

        let data_len = length - 1;
        let mut compressed = vec![0u8; data_len];
        self.file.read_exact(&mut compressed)?;

        let decompressed = match scheme {
            COMPRESSION_GZIP => {
                let mut decoder = GzDecoder::new(&compressed[..]);
                let mut out = Vec::new();
                decoder
                    .read_to_end(&mut out)
                    .map_err(RegionError::Decompression)?;
                out
            }
            COMPRESSION_ZLIB => {
                let mut decoder = ZlibDecoder::new(&compressed[..]);
                let mut out = Vec::new();
                decoder
                    .read_to_end(&mut out)
                    .map_err(RegionError::Decompression)?;
                out
            }
            COMPRESSION_NONE => compressed,
            other => return Err(RegionError::UnsupportedScheme(other)),
        };

        Ok(Some(decompressed))
    }
}

/// Resolves and caches region files under a world's `region/` directory.
pub struct RegionDir {
    dir: PathBuf,
    open_files: HashMap<(i32, i32), RegionFile>,
}

impl RegionDir {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            open_files: HashMap::new(),
        }
    }

    /// Read the raw NBT payload for a chunk. Returns None both when the
    /// region file is missing and when its location entry is zero.
    pub fn read_chunk(&mut self, chunk_x: i32, chunk_z: i32) -> RegionResult<Option<Vec<u8>>> {
        let (region_x, region_z, local_x, local_z) = Self::chunk_to_region(chunk_x, chunk_z);
        match self.get_or_open(region_x, region_z)? {
            Some(region) => region.read_chunk(local_x, local_z),
            None => Ok(None),
        }
    }

    /// The region file path for a region coordinate pair.
    pub fn region_path(&self, region_x: i32, region_z: i32) -> PathBuf {
        self.dir.join(format!("r.{}.{}.mca", region_x, region_z))
    }

    fn get_or_open(
        &mut self,
        region_x: i32,
        region_z: i32,
    ) -> RegionResult<Option<&mut RegionFile>> {
        use std::collections::hash_map::Entry;
        match self.open_files.entry((region_x, region_z)) {
            Entry::Occupied(entry) => Ok(Some(entry.into_mut())),
            Entry::Vacant(entry) => {
                let path = self.dir.join(format!("r.{}.{}.mca", region_x, region_z));
                match RegionFile::open(&path) {
                    Ok(region) => Ok(Some(entry.insert(region))),
                    Err(RegionError::Io(e)) if e.kind() == io::ErrorKind::NotFound => Ok(None),
                    Err(e) => Err(e),
                }
            }
        }
    }

    fn chunk_to_region(chunk_x: i32, chunk_z: i32) -> (i32, i32, usize, usize) {
        let region_x = chunk_x >> 5;
        let region_z = chunk_z >> 5;
        let local_x = (chunk_x & 31) as usize;
        let local_z = (chunk_z & 31) as usize;
        (region_x, region_z, local_x, local_z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::{GzEncoder, ZlibEncoder};
    use flate2::Compression;
    use std::io::Write;

    /// Build a minimal region file holding the given chunks at consecutive
    /// sectors, each compressed with the given scheme.
    fn write_region(path: &Path, chunks: &[(usize, usize, &[u8])], scheme: u8) {
        let mut locations = [0u32; 1024];
        let mut payloads: Vec<Vec<u8>> = Vec::new();
        let mut next_sector = 2u32;

        for &(local_x, local_z, data) in chunks {
            let body = match scheme {
                COMPRESSION_GZIP => {
                    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
                    enc.write_all(data).unwrap();
                    enc.finish().unwrap()
                }
                COMPRESSION_ZLIB => {
                    let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
                    enc.write_all(data).unwrap();
                    enc.finish().unwrap()
                }
                _ => data.to_vec(),
            };
            let mut payload = Vec::new();
            payload.extend_from_slice(&((body.len() + 1) as u32).to_be_bytes());
            payload.push(scheme);
            payload.extend_from_slice(&body);
            let sectors = (payload.len() as u32).div_ceil(SECTOR_BYTES as u32);
            payload.resize((sectors as u64 * SECTOR_BYTES) as usize, 0);

            locations[local_x + local_z * 32] = (next_sector << 8) | sectors;
            next_sector += sectors;
            payloads.push(payload);
        }

        let mut out = Vec::new();
        for loc in locations {
            out.extend_from_slice(&loc.to_be_bytes());
        }
        out.resize(8192, 0); // zeroed timestamp table
        for payload in payloads {
            out.extend_from_slice(&payload);
        }
        std::fs::write(path, out).unwrap();
    }

    #[test]
    fn test_read_zlib_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("r.0.0.mca");
        write_region(&path, &[(0, 0, b"zlib chunk payload")], COMPRESSION_ZLIB);

        let mut region = RegionFile::open(&path).unwrap();
        assert!(region.contains_chunk(0, 0));
        let data = region.read_chunk(0, 0).unwrap().unwrap();
        assert_eq!(data, b"zlib chunk payload");
    }

    #[test]
    fn test_read_gzip_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("r.0.0.mca");
        write_region(&path, &[(3, 7, b"gzip chunk payload")], COMPRESSION_GZIP);

        let mut region = RegionFile::open(&path).unwrap();
        let data = region.read_chunk(3, 7).unwrap().unwrap();
        assert_eq!(data, b"gzip chunk payload");
    }

    #[test]
    fn test_read_uncompressed_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("r.0.0.mca");
        write_region(&path, &[(1, 1, b"raw chunk payload")], COMPRESSION_NONE);

        let mut region = RegionFile::open(&path).unwrap();
        let data = region.read_chunk(1, 1).unwrap().unwrap();
        assert_eq!(data, b"raw chunk payload");
    }

    #[test]
    fn test_absent_chunk_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("r.0.0.mca");
        write_region(&path, &[(0, 0, b"only this one")], COMPRESSION_ZLIB);

        let mut region = RegionFile::open(&path).unwrap();
        assert!(!region.contains_chunk(5, 5));
        assert!(region.read_chunk(5, 5).unwrap().is_none());
    }

    #[test]
    fn test_unsupported_scheme() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("r.0.0.mca");
        write_region(&path, &[(0, 0, b"data")], 9);

        let mut region = RegionFile::open(&path).unwrap();
        assert!(matches!(
            region.read_chunk(0, 0),
            Err(RegionError::UnsupportedScheme(9))
        ));
    }

    #[test]
    fn test_corrupt_zlib_payload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("r.0.0.mca");
        // Scheme claims zlib but the body is garbage.
        write_region(&path, &[(0, 0, b"\xde\xad\xbe\xef")], COMPRESSION_NONE);
        let mut raw = std::fs::read(&path).unwrap();
        raw[2 * SECTOR_BYTES as usize + 4] = COMPRESSION_ZLIB;
        std::fs::write(&path, raw).unwrap();

        let mut region = RegionFile::open(&path).unwrap();
        assert!(matches!(
            region.read_chunk(0, 0),
            Err(RegionError::Decompression(_))
        ));
    }

    #[test]
    fn test_region_dir_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut regions = RegionDir::new(dir.path().to_path_buf());
        assert!(regions.read_chunk(0, 0).unwrap().is_none());
        assert!(regions.read_chunk(-1, 40).unwrap().is_none());
    }

    #[test]
    fn test_region_dir_resolution() {
        let dir = tempfile::tempdir().unwrap();
        // Chunk (33, -1) lives in region (1, -1) at local (1, 31).
        write_region(
            &dir.path().join("r.1.-1.mca"),
            &[(1, 31, b"far away chunk")],
            COMPRESSION_ZLIB,
        );

        let mut regions = RegionDir::new(dir.path().to_path_buf());
        let data = regions.read_chunk(33, -1).unwrap().unwrap();
        assert_eq!(data, b"far away chunk");
        // Same region again goes through the open-handle cache.
        assert!(regions.read_chunk(32, -32).unwrap().is_none());
        assert_eq!(regions.open_files.len(), 1);
    }
}

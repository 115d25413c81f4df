//! Content served by the simulated swarm.

use std::fs;
use std::path::{Path, PathBuf};

use anyflix_core::swarm::{FileEntry, InfoHash, PieceIndex, PieceLayout, SwarmMetadata};
use bytes::{Bytes, BytesMut};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sha1::{Digest, Sha1};

use crate::SimError;

/// Named set of files with a fixed piece length.
///
/// File bytes are concatenated in order into one payload, exactly like a
/// multi-file torrent, so pieces may straddle file boundaries.
#[derive(Debug, Clone)]
pub struct SimulatedContent {
    name: String,
    piece_length: u64,
    files: Vec<(PathBuf, u64)>,
    payload: Bytes,
}

impl SimulatedContent {
    /// Builds content from in-memory files.
    ///
    /// # Errors
    /// - `SimError::InvalidPieceLength` - `piece_length` is zero
    /// - `SimError::EmptyContent` - No files given
    pub fn new(
        name: impl Into<String>,
        piece_length: u64,
        files: Vec<(PathBuf, Bytes)>,
    ) -> Result<Self, SimError> {
        let name = name.into();
        if piece_length == 0 {
            return Err(SimError::InvalidPieceLength);
        }
        if files.is_empty() {
            return Err(SimError::EmptyContent { name });
        }

        let total: usize = files.iter().map(|(_, data)| data.len()).sum();
        let mut payload = BytesMut::with_capacity(total);
        let mut entries = Vec::with_capacity(files.len());
        for (path, data) in files {
            entries.push((path, data.len() as u64));
            payload.extend_from_slice(&data);
        }

        Ok(Self {
            name,
            piece_length,
            files: entries,
            payload: payload.freeze(),
        })
    }

    /// Pseudo-random content; the same seed always yields the same bytes.
    ///
    /// # Errors
    /// - `SimError::InvalidPieceLength` - `piece_length` is zero
    /// - `SimError::EmptyContent` - No files given
    pub fn generated(
        name: &str,
        files: &[(&str, u64)],
        piece_length: u64,
        seed: u64,
    ) -> Result<Self, SimError> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let files = files
            .iter()
            .map(|(path, length)| {
                let mut data = vec![0u8; *length as usize];
                rng.fill_bytes(&mut data);
                (PathBuf::from(path), Bytes::from(data))
            })
            .collect();
        Self::new(name, piece_length, files)
    }

    /// Loads every regular file under `dir`, ordered by relative path.
    ///
    /// A plain file is loaded as single-file content named after itself.
    ///
    /// # Errors
    /// - `SimError::Io` - Directory or file could not be read
    /// - `SimError::EmptyContent` - No regular files found
    pub fn from_directory(dir: &Path, piece_length: u64) -> Result<Self, SimError> {
        let name = dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "library".to_string());

        if dir.is_file() {
            let data = Bytes::from(fs::read(dir)?);
            return Self::new(name.clone(), piece_length, vec![(PathBuf::from(name), data)]);
        }

        let mut paths = Vec::new();
        collect_files(dir, dir, &mut paths)?;
        paths.sort();

        let files = paths
            .into_iter()
            .map(|relative| {
                let data = fs::read(dir.join(&relative))?;
                Ok((relative, Bytes::from(data)))
            })
            .collect::<Result<Vec<_>, SimError>>()?;

        tracing::debug!(name = %name, files = files.len(), "loaded library content");
        Self::new(name, piece_length, files)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn piece_length(&self) -> u64 {
        self.piece_length
    }

    pub fn total_length(&self) -> u64 {
        self.payload.len() as u64
    }

    pub fn layout(&self) -> PieceLayout {
        PieceLayout::new(self.piece_length, self.total_length())
    }

    /// Whole concatenated payload.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Bytes of file `index`, if it exists.
    pub fn file_bytes(&self, index: usize) -> Option<Bytes> {
        let entry = self.metadata().files.get(index)?.clone();
        Some(self.payload.slice(entry.offset as usize..(entry.offset + entry.length) as usize))
    }

    /// File list as a swarm engine reports it.
    pub fn metadata(&self) -> SwarmMetadata {
        let mut offset = 0;
        let files = self
            .files
            .iter()
            .enumerate()
            .map(|(index, (path, length))| {
                let entry = FileEntry {
                    index,
                    offset,
                    length: *length,
                    path: path.clone(),
                };
                offset += length;
                entry
            })
            .collect();

        SwarmMetadata {
            name: self.name.clone(),
            piece_length: self.piece_length,
            files,
        }
    }

    /// SHA-1 over name, piece length and each file's path and length.
    pub fn info_hash(&self) -> InfoHash {
        let mut hasher = Sha1::new();
        hasher.update(self.name.as_bytes());
        hasher.update(self.piece_length.to_be_bytes());
        for (path, length) in &self.files {
            hasher.update(path.to_string_lossy().as_bytes());
            hasher.update(length.to_be_bytes());
        }
        InfoHash::new(hasher.finalize().into())
    }

    /// Payload bytes of one piece.
    pub fn piece_data(&self, piece: PieceIndex) -> Option<Bytes> {
        let layout = self.layout();
        if piece.as_u32() >= layout.piece_count() {
            return None;
        }
        let span = layout.piece_span(piece);
        Some(self.payload.slice(span.start as usize..span.end as usize))
    }

    /// SHA-1 of one piece's bytes.
    pub fn piece_hash(&self, piece: PieceIndex) -> Option<[u8; 20]> {
        let data = self.piece_data(piece)?;
        Some(Sha1::digest(&data).into())
    }
}

fn collect_files(root: &Path, dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), SimError> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            collect_files(root, &path, out)?;
        } else if file_type.is_file() {
            if let Ok(relative) = path.strip_prefix(root) {
                out.push(relative.to_path_buf());
            }
        }
    }
    Ok(())
}

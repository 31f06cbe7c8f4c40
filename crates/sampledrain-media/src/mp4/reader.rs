//! MP4 file reader with atom parsing.
//!
//! Walks `moov > trak > mdia > minf > stbl` and collects the index boxes of
//! every track in file order. Nothing is expanded here; see
//! [`SampleTableBuilder`](super::SampleTableBuilder) for that.

use super::{
    Atom, AtomType, HandlerType, MediaHeader, MovieIndex, SampleSizes, SampleToChunkEntry,
    TrackIndex,
};
use crate::{Error, Result};
use std::io::{Read, Seek, SeekFrom};

/// Maximum allowed atom data size (64 MB) to prevent OOM on malformed files.
const MAX_ATOM_DATA_SIZE: u64 = 64 * 1024 * 1024;

/// MP4 file reader.
pub struct Mp4Reader<R> {
    reader: R,
    file_size: u64,
}

impl<R: Read + Seek> Mp4Reader<R> {
    /// Create a new MP4 reader.
    pub fn new(mut reader: R) -> Result<Self> {
        let file_size = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(0))?;
        Ok(Self { reader, file_size })
    }

    /// Parse the container's index boxes.
    pub fn parse(&mut self) -> Result<MovieIndex> {
        let mut movie = MovieIndex::default();
        let mut found_moov = false;

        let atoms = self.read_atoms(0, self.file_size)?;
        for atom in &atoms {
            if atom.atom_type == AtomType::MOOV {
                self.parse_moov(atom, &mut movie)?;
                found_moov = true;
            }
        }

        if !found_moov {
            return Err(Error::MissingAtom("moov"));
        }

        tracing::debug!(
            tracks = movie.tracks.len(),
            time_scale = movie.header.time_scale,
            duration = movie.header.duration,
            "Parsed movie index"
        );

        Ok(movie)
    }

    /// Read atoms at the given level.
    fn read_atoms(&mut self, start: u64, end: u64) -> Result<Vec<Atom>> {
        let mut atoms = Vec::new();
        let mut pos = start;

        while pos.checked_add(8).is_some_and(|header_end| header_end <= end) {
            self.reader.seek(SeekFrom::Start(pos))?;

            let mut header = [0u8; 8];
            if self.reader.read_exact(&mut header).is_err() {
                break;
            }

            let size = be_u32(&header, 0) as u64;
            let atom_type = AtomType::from_bytes([header[4], header[5], header[6], header[7]]);

            let (actual_size, header_size) = if size == 1 {
                // 64-bit extended size
                let mut ext = [0u8; 8];
                self.reader.read_exact(&mut ext)?;
                (u64::from_be_bytes(ext), 16u8)
            } else if size == 0 {
                // Atom extends to end of enclosing range
                (end - pos, 8u8)
            } else {
                (size, 8u8)
            };

            if actual_size < header_size as u64 {
                break;
            }

            let atom_end = pos
                .checked_add(actual_size)
                .filter(|atom_end| *atom_end <= end)
                .ok_or_else(|| {
                    Error::invalid_mp4(format!(
                        "Atom {} at offset {} with size {} extends past its parent (ends at {})",
                        atom_type, pos, actual_size, end
                    ))
                })?;

            atoms.push(Atom {
                atom_type,
                size: actual_size,
                data_offset: pos + header_size as u64,
                header_size,
            });

            pos = atom_end;
        }

        Ok(atoms)
    }

    /// Read and validate atom data, rejecting oversized atoms.
    fn read_atom_data(&mut self, atom: &Atom) -> Result<Vec<u8>> {
        let size = atom.data_size();
        if size > MAX_ATOM_DATA_SIZE {
            return Err(Error::invalid_mp4(format!(
                "Atom {} data size {} exceeds maximum {}",
                atom.atom_type, size, MAX_ATOM_DATA_SIZE
            )));
        }
        self.reader.seek(SeekFrom::Start(atom.data_offset))?;
        let mut data = vec![0u8; size as usize];
        self.reader.read_exact(&mut data)?;
        Ok(data)
    }

    fn children(&mut self, atom: &Atom) -> Result<Vec<Atom>> {
        self.read_atoms(atom.data_offset, atom.end())
    }

    /// Parse moov atom.
    fn parse_moov(&mut self, moov: &Atom, movie: &mut MovieIndex) -> Result<()> {
        for child in &self.children(moov)? {
            match child.atom_type {
                AtomType::MVHD => {
                    let data = self.read_atom_data(child)?;
                    movie.header = parse_time_header(&data, "mvhd")?;
                }
                AtomType::TRAK => {
                    let track = self.parse_trak(child)?;
                    movie.tracks.push(track);
                }
                _ => {}
            }
        }

        Ok(())
    }

    /// Parse trak (track) atom.
    fn parse_trak(&mut self, trak: &Atom) -> Result<TrackIndex> {
        let mut track = TrackIndex::new(0);

        for child in &self.children(trak)? {
            match child.atom_type {
                AtomType::TKHD => {
                    let data = self.read_atom_data(child)?;
                    track.track_id = parse_tkhd_track_id(&data)?;
                }
                AtomType::MDIA => {
                    self.parse_mdia(child, &mut track)?;
                }
                _ => {}
            }
        }

        Ok(track)
    }

    /// Parse mdia (media) atom.
    fn parse_mdia(&mut self, mdia: &Atom, track: &mut TrackIndex) -> Result<()> {
        for child in &self.children(mdia)? {
            match child.atom_type {
                AtomType::MDHD => {
                    let data = self.read_atom_data(child)?;
                    track.media_header = Some(parse_time_header(&data, "mdhd")?);
                }
                AtomType::HDLR => {
                    let data = self.read_atom_data(child)?;
                    if data.len() >= 12 {
                        track.handler_type =
                            HandlerType::from_bytes([data[8], data[9], data[10], data[11]]);
                    }
                }
                AtomType::MINF => {
                    for grandchild in &self.children(child)? {
                        if grandchild.atom_type == AtomType::STBL {
                            self.parse_stbl(grandchild, track)?;
                        }
                    }
                }
                _ => {}
            }
        }

        Ok(())
    }

    /// Parse stbl (sample table) atom.
    fn parse_stbl(&mut self, stbl: &Atom, track: &mut TrackIndex) -> Result<()> {
        for child in &self.children(stbl)? {
            match child.atom_type {
                AtomType::STTS => {
                    let data = self.read_atom_data(child)?;
                    track.time_to_sample = Some(parse_stts(&data)?);
                }
                AtomType::STSS => {
                    let data = self.read_atom_data(child)?;
                    track.sync_samples = Some(parse_stss(&data)?);
                }
                AtomType::STSC => {
                    let data = self.read_atom_data(child)?;
                    track.sample_to_chunk = Some(parse_stsc(&data)?);
                }
                AtomType::STSZ => {
                    let data = self.read_atom_data(child)?;
                    let (sizes, count) = parse_stsz(&data)?;
                    track.sample_sizes = Some(sizes);
                    track.sample_count = Some(count);
                }
                AtomType::STCO => {
                    let data = self.read_atom_data(child)?;
                    track.chunk_offsets = Some(parse_stco(&data)?);
                }
                AtomType::CO64 => {
                    let data = self.read_atom_data(child)?;
                    track.chunk_offsets = Some(parse_co64(&data)?);
                }
                _ => {}
            }
        }

        Ok(())
    }
}

fn be_u32(data: &[u8], pos: usize) -> u32 {
    u32::from_be_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]])
}

fn be_u64(data: &[u8], pos: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&data[pos..pos + 8]);
    u64::from_be_bytes(bytes)
}

fn require_len(data: &[u8], need: usize, atom: &str) -> Result<()> {
    if data.len() < need {
        return Err(Error::invalid_mp4(format!(
            "{} too short: need {} bytes, have {}",
            atom,
            need,
            data.len()
        )));
    }
    Ok(())
}

/// Full-box table header: version/flags then a 32-bit entry count.
/// Returns the entry count after checking the body holds that many entries.
fn table_entries(data: &[u8], body_start: usize, entry_size: usize, atom: &str) -> Result<usize> {
    require_len(data, body_start, atom)?;
    let count = be_u32(data, body_start - 4) as usize;
    let need = count
        .checked_mul(entry_size)
        .and_then(|n| n.checked_add(body_start))
        .ok_or_else(|| Error::invalid_mp4(format!("{} entry count {} overflows", atom, count)))?;
    require_len(data, need, atom)?;
    Ok(count)
}

/// Parse mvhd/mdhd, which share the time scale and duration layout.
fn parse_time_header(data: &[u8], atom: &str) -> Result<MediaHeader> {
    require_len(data, 1, atom)?;
    if data[0] == 0 {
        // 32-bit timestamps
        require_len(data, 20, atom)?;
        Ok(MediaHeader {
            time_scale: be_u32(data, 12),
            duration: be_u32(data, 16) as u64,
        })
    } else {
        // 64-bit timestamps
        require_len(data, 32, atom)?;
        Ok(MediaHeader {
            time_scale: be_u32(data, 20),
            duration: be_u64(data, 24),
        })
    }
}

fn parse_tkhd_track_id(data: &[u8]) -> Result<u32> {
    require_len(data, 1, "tkhd")?;
    if data[0] == 0 {
        require_len(data, 16, "tkhd")?;
        Ok(be_u32(data, 12))
    } else {
        require_len(data, 24, "tkhd")?;
        Ok(be_u32(data, 20))
    }
}

/// Parse stts (decoding time to sample).
fn parse_stts(data: &[u8]) -> Result<Vec<(u32, u32)>> {
    let count = table_entries(data, 8, 8, "stts")?;
    Ok((0..count)
        .map(|i| {
            let pos = 8 + i * 8;
            (be_u32(data, pos), be_u32(data, pos + 4))
        })
        .collect())
}

/// Parse stss (sync sample).
fn parse_stss(data: &[u8]) -> Result<Vec<u32>> {
    let count = table_entries(data, 8, 4, "stss")?;
    Ok((0..count).map(|i| be_u32(data, 8 + i * 4)).collect())
}

/// Parse stsc (sample to chunk).
fn parse_stsc(data: &[u8]) -> Result<Vec<SampleToChunkEntry>> {
    let count = table_entries(data, 8, 12, "stsc")?;
    Ok((0..count)
        .map(|i| {
            let pos = 8 + i * 12;
            SampleToChunkEntry {
                first_chunk: be_u32(data, pos),
                samples_per_chunk: be_u32(data, pos + 4),
                sample_description_index: be_u32(data, pos + 8),
            }
        })
        .collect())
}

/// Parse stsz (sample size) into the sizes and the declared sample count.
fn parse_stsz(data: &[u8]) -> Result<(SampleSizes, u32)> {
    require_len(data, 12, "stsz")?;
    let uniform_size = be_u32(data, 4);
    let declared = be_u32(data, 8);
    if uniform_size != 0 {
        return Ok((SampleSizes::Uniform(uniform_size), declared));
    }

    let count = table_entries(data, 12, 4, "stsz")?;
    let sizes = (0..count).map(|i| be_u32(data, 12 + i * 4)).collect();
    Ok((SampleSizes::PerSample(sizes), declared))
}

/// Parse stco (chunk offset, 32-bit).
fn parse_stco(data: &[u8]) -> Result<Vec<u64>> {
    let count = table_entries(data, 8, 4, "stco")?;
    Ok((0..count).map(|i| be_u32(data, 8 + i * 4) as u64).collect())
}

/// Parse co64 (chunk offset, 64-bit).
fn parse_co64(data: &[u8]) -> Result<Vec<u64>> {
    let count = table_entries(data, 8, 8, "co64")?;
    Ok((0..count).map(|i| be_u64(data, 8 + i * 8)).collect())
}

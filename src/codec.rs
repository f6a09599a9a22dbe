//! Reading and writing catalog files: JSON, optionally compressed.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{CatalogEntry, FrequencyRange};
use crate::error::CatsearchError;

pub const DEFAULT_SUFFIX: &str = ".json.gz";

const MAGIC: &[(&[u8], Codec)] = &[
    (b"{", Codec::Json),
    (b"\x1F\x8B", Codec::Gzip),
    (b"BZh", Codec::Bzip2),
    (b"\xFD7zXZ\x00", Codec::Xz),
    (b"\x5D\x00\x00", Codec::Lzma),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    Json,
    Gzip,
    Bzip2,
    Xz,
    Lzma,
}

impl Codec {
    pub fn suffix(self) -> &'static str {
        match self {
            Codec::Json => ".json",
            Codec::Gzip => ".json.gz",
            Codec::Bzip2 => ".json.bz2",
            Codec::Xz => ".json.xz",
            Codec::Lzma => ".json.lzma",
        }
    }

    /// Pick a codec from the file name, ignoring case.
    pub fn from_suffix(path: &Path) -> Option<Codec> {
        let name = path.file_name()?.to_string_lossy().to_lowercase();
        [
            Codec::Json,
            Codec::Gzip,
            Codec::Bzip2,
            Codec::Xz,
            Codec::Lzma,
        ]
        .into_iter()
        .find(|codec| name.ends_with(codec.suffix()))
    }

    /// Pick a codec from the first bytes of the data.
    pub fn from_magic(head: &[u8]) -> Option<Codec> {
        MAGIC
            .iter()
            .find(|(magic, _)| head.starts_with(magic))
            .map(|(_, codec)| *codec)
    }

    /// Suffix first, then the file content.
    pub fn detect(path: &Path) -> Result<Codec, CatsearchError> {
        if let Some(codec) = Self::from_suffix(path) {
            return Ok(codec);
        }
        let mut head = [0u8; 6];
        let mut file = File::open(path).map_err(|err| {
            CatsearchError::Filesystem(format!("open {}: {err}", path.display()))
        })?;
        let mut filled = 0;
        while filled < head.len() {
            let read = file
                .read(&mut head[filled..])
                .map_err(|err| CatsearchError::Filesystem(err.to_string()))?;
            if read == 0 {
                break;
            }
            filled += read;
        }
        Self::from_magic(&head[..filled])
            .ok_or_else(|| CatsearchError::UnknownCodec(path.to_path_buf()))
    }

    fn reader(self, file: File) -> Result<Box<dyn Read>, CatsearchError> {
        let file = BufReader::new(file);
        Ok(match self {
            Codec::Json => Box::new(file),
            Codec::Gzip => Box::new(flate2::read::MultiGzDecoder::new(file)),
            Codec::Bzip2 => Box::new(bzip2::read::MultiBzDecoder::new(file)),
            Codec::Xz | Codec::Lzma => {
                let stream = xz2::stream::Stream::new_auto_decoder(u64::MAX, 0)
                    .map_err(|err| CatsearchError::CatalogParse(err.to_string()))?;
                Box::new(xz2::read::XzDecoder::new_stream(file, stream))
            }
        })
    }
}

/// A filename with [`DEFAULT_SUFFIX`] appended unless it already has a
/// recognised suffix.
pub fn with_default_suffix(path: &Path) -> PathBuf {
    if Codec::from_suffix(path).is_some() {
        return path.to_path_buf();
    }
    let mut name = path.as_os_str().to_os_string();
    name.push(DEFAULT_SUFFIX);
    PathBuf::from(name)
}

#[derive(Debug, Serialize)]
struct CatalogFileRef<'a> {
    catalog: &'a [CatalogEntry],
    frequency: [f64; 2],
    build_time: String,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    catalog: Vec<CatalogEntry>,
    #[serde(default)]
    frequency: Option<[Option<f64>; 2]>,
    #[serde(default)]
    build_time: Option<String>,
}

/// Contents of one catalog file.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedCatalog {
    pub entries: Vec<CatalogEntry>,
    pub frequency_range: FrequencyRange,
    pub build_time: Option<DateTime<Utc>>,
}

/// Write a catalog file atomically through `<path>.part`.
pub fn save(
    path: &Path,
    entries: &[CatalogEntry],
    frequency_range: FrequencyRange,
    build_time: Option<DateTime<Utc>>,
) -> Result<(), CatsearchError> {
    let codec =
        Codec::from_suffix(path).ok_or_else(|| CatsearchError::UnknownCodec(path.to_path_buf()))?;
    let document = CatalogFileRef {
        catalog: entries,
        frequency: [frequency_range.min, frequency_range.max],
        build_time: build_time.unwrap_or_else(Utc::now).to_rfc3339(),
    };

    let mut part_name = path.as_os_str().to_os_string();
    part_name.push(".part");
    let part_path = PathBuf::from(part_name);

    let result = write_part(&part_path, codec, &document).and_then(|()| {
        fs::rename(&part_path, path).map_err(|err| {
            CatsearchError::Filesystem(format!("rename to {}: {err}", path.display()))
        })
    });
    if result.is_err() {
        let _ = fs::remove_file(&part_path);
    }
    result
}

fn write_part(
    part_path: &Path,
    codec: Codec,
    document: &CatalogFileRef<'_>,
) -> Result<(), CatsearchError> {
    let fs_error = |err: io::Error| {
        CatsearchError::Filesystem(format!("write {}: {err}", part_path.display()))
    };
    let file = File::create(part_path).map_err(fs_error)?;
    let writer = BufWriter::new(file);

    let writer = match codec {
        Codec::Json => serialize(writer, document).map_err(fs_error)?,
        Codec::Gzip => serialize(
            flate2::write::GzEncoder::new(writer, flate2::Compression::default()),
            document,
        )
        .and_then(|encoder| encoder.finish())
        .map_err(fs_error)?,
        Codec::Bzip2 => serialize(
            bzip2::write::BzEncoder::new(writer, bzip2::Compression::default()),
            document,
        )
        .and_then(|encoder| encoder.finish())
        .map_err(fs_error)?,
        Codec::Xz => serialize(xz2::write::XzEncoder::new(writer, 6), document)
            .and_then(|encoder| encoder.finish())
            .map_err(fs_error)?,
        Codec::Lzma => {
            let options = xz2::stream::LzmaOptions::new_preset(6)
                .map_err(|err| fs_error(io::Error::other(err)))?;
            let stream = xz2::stream::Stream::new_lzma_encoder(&options)
                .map_err(|err| fs_error(io::Error::other(err)))?;
            serialize(xz2::write::XzEncoder::new_stream(writer, stream), document)
                .and_then(|encoder| encoder.finish())
                .map_err(fs_error)?
        }
    };

    let file = writer
        .into_inner()
        .map_err(|err| fs_error(err.into_error()))?;
    file.sync_all().map_err(fs_error)?;
    Ok(())
}

fn serialize<W: Write>(mut writer: W, document: &CatalogFileRef<'_>) -> io::Result<W> {
    serde_json::to_writer_pretty(&mut writer, document).map_err(io::Error::other)?;
    writer.flush()?;
    Ok(writer)
}

/// Read one catalog file.
pub fn load(path: &Path) -> Result<LoadedCatalog, CatsearchError> {
    let codec = Codec::detect(path)?;
    let file = File::open(path)
        .map_err(|err| CatsearchError::Filesystem(format!("open {}: {err}", path.display())))?;
    let mut content = Vec::new();
    codec
        .reader(file)?
        .read_to_end(&mut content)
        .map_err(|err| {
            CatsearchError::CatalogParse(format!("decompress {}: {err}", path.display()))
        })?;
    let document: CatalogFile = serde_json::from_slice(&content)
        .map_err(|err| CatsearchError::CatalogParse(format!("{}: {err}", path.display())))?;

    let [min, max] = document.frequency.unwrap_or([None, None]);
    Ok(LoadedCatalog {
        entries: document.catalog,
        frequency_range: FrequencyRange::new(
            min.unwrap_or(f64::NEG_INFINITY),
            max.unwrap_or(f64::INFINITY),
        ),
        build_time: document.build_time.as_deref().and_then(parse_build_time),
    })
}

fn parse_build_time(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(time) = DateTime::parse_from_rfc3339(text) {
        return Some(time.with_timezone(&Utc));
    }
    match NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
        Ok(time) => Some(time.and_utc()),
        Err(err) => {
            tracing::warn!("ignoring build time {text:?}: {err}");
            None
        }
    }
}

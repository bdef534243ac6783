use crate::{decrypt::PlainSegment, error::AssemblyError};
use log::debug;
use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

/// Where the merged stream ends up.
#[derive(Clone, Debug)]
pub struct Destination {
    pub directory: PathBuf,
    /// File name without extension.
    pub title: String,
    pub extension: String,
}

impl Destination {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            directory: PathBuf::from("."),
            title: title.into(),
            extension: "mp4".to_owned(),
        }
    }

    pub fn directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = directory.into();
        self
    }

    pub fn extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into().trim_start_matches('.').to_owned();
        self
    }

    pub fn path(&self) -> PathBuf {
        self.directory
            .join(format!("{}.{}", self.title, self.extension))
    }

    pub fn temp_path(&self) -> PathBuf {
        self.directory
            .join(format!("{}.{}.part", self.title, self.extension))
    }
}

/// Writes segments in order into a temporary file which is renamed on success.
///
/// An unsealed merger deletes its temporary file when dropped.
pub struct Merger {
    file: Option<BufWriter<File>>,
    path: PathBuf,
    temp_path: PathBuf,
    pos: usize,
    sealed: bool,
    stored_bytes: usize,
}

impl Merger {
    pub fn create(destination: &Destination) -> Result<Self, AssemblyError> {
        let temp_path = destination.temp_path();

        if !destination.directory.as_os_str().is_empty() && !destination.directory.exists() {
            fs::create_dir_all(&destination.directory).map_err(|source| AssemblyError::Io {
                path: destination.directory.clone(),
                source,
            })?;
        }

        let file = File::create(&temp_path).map_err(|source| AssemblyError::Io {
            path: temp_path.clone(),
            source,
        })?;
        debug!("Writing segments into {}", temp_path.display());

        Ok(Self {
            file: Some(BufWriter::new(file)),
            path: destination.path(),
            temp_path,
            pos: 0,
            sealed: false,
            stored_bytes: 0,
        })
    }

    /// Appends the next segment, indices must arrive as 0, 1, 2, ...
    pub fn write(&mut self, segment: &PlainSegment) -> Result<(), AssemblyError> {
        if segment.index != self.pos {
            return Err(AssemblyError::OutOfOrder {
                expected: self.pos,
                got: segment.index,
            });
        }

        if let Some(file) = &mut self.file {
            file.write_all(&segment.data).map_err(|source| AssemblyError::Io {
                path: self.temp_path.clone(),
                source,
            })?;
        }

        self.pos += 1;
        self.stored_bytes += segment.data.len();
        Ok(())
    }

    /// Number of segments written so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn stored(&self) -> usize {
        self.stored_bytes
    }

    /// Flushes the temporary file and moves it to the destination path.
    pub fn seal(mut self, expected: usize) -> Result<PathBuf, AssemblyError> {
        if self.pos != expected {
            return Err(AssemblyError::Incomplete {
                written: self.pos,
                expected,
            });
        }

        let io_error = |path: &Path| {
            let path = path.to_owned();
            move |source| AssemblyError::Io { path, source }
        };

        if let Some(file) = self.file.take() {
            let file = file
                .into_inner()
                .map_err(|x| x.into_error())
                .map_err(io_error(&self.temp_path))?;
            file.sync_all().map_err(io_error(&self.temp_path))?;
        }

        fs::rename(&self.temp_path, &self.path).map_err(io_error(&self.path))?;
        self.sealed = true;
        debug!("Renamed {} to {}", self.temp_path.display(), self.path.display());
        Ok(self.path.clone())
    }
}

impl Drop for Merger {
    fn drop(&mut self) {
        if !self.sealed {
            self.file.take();
            debug!("Deleting {}", self.temp_path.display());
            let _ = fs::remove_file(&self.temp_path);
        }
    }
}

/// Writes already ordered segments and seals the result.
pub fn assemble<I>(segments: I, destination: &Destination) -> Result<PathBuf, AssemblyError>
where
    I: IntoIterator<Item = PlainSegment>,
{
    let mut merger = Merger::create(destination)?;

    for segment in segments {
        merger.write(&segment)?;
    }

    let written = merger.position();
    merger.seal(written)
}

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use audec::auto_decompress;
use log::{debug, trace};
use serde::Deserialize;
use thiserror::Error;

use crate::event::Event;

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("Failed to open event file {0:?}: {1}")]
    Open(PathBuf, std::io::Error),
    #[error("Failed to read event {record} in {path:?}: {source}")]
    Parse {
        path: PathBuf,
        record: usize,
        source: serde_yaml::Error,
    },
}

struct CurrentFile {
    path: PathBuf,
    docs: serde_yaml::Deserializer<'static>,
    nread: usize,
}

impl CurrentFile {
    fn open(path: PathBuf) -> Result<Self, ReadError> {
        debug!("Reading events from {path:?}");
        let file = File::open(&path)
            .map_err(|err| ReadError::Open(path.clone(), err))?;
        let source = auto_decompress(BufReader::new(file));
        Ok(Self {
            path,
            docs: serde_yaml::Deserializer::from_reader(source),
            nread: 0,
        })
    }
}

/// Reader for (potentially compressed) YAML event files
///
/// Each file is a stream of YAML documents with one event per
/// document. Files are read one after the other in the given order.
pub struct EventReader {
    files: std::vec::IntoIter<PathBuf>,
    current: Option<CurrentFile>,
}

impl EventReader {
    pub fn new<I, P>(files: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let files: Vec<_> =
            files.into_iter().map(|f| f.as_ref().to_owned()).collect();
        Self {
            files: files.into_iter(),
            current: None,
        }
    }

    /// The file that is currently being read
    pub fn current_file(&self) -> Option<&Path> {
        self.current.as_ref().map(|cur| cur.path.as_path())
    }
}

impl Iterator for EventReader {
    type Item = Result<Event, ReadError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(cur) = &mut self.current {
                if let Some(doc) = cur.docs.next() {
                    cur.nread += 1;
                    trace!("Reading event {} in {:?}", cur.nread, cur.path);
                    let event =
                        Event::deserialize(doc).map_err(|source| ReadError::Parse {
                            path: cur.path.clone(),
                            record: cur.nread,
                            source,
                        });
                    return Some(event);
                }
                debug!("Read {} events from {:?}", cur.nread, cur.path);
                self.current = None;
            }
            let path = self.files.next()?;
            match CurrentFile::open(path) {
                Ok(file) => self.current = Some(file),
                Err(err) => return Some(Err(err)),
            }
        }
    }
}

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use log::debug;
use thiserror::Error;

use crate::event::EventId;

#[derive(Debug, Error)]
pub enum LumiMaskError {
    #[error("Failed to open luminosity mask {0:?}: {1}")]
    Io(PathBuf, std::io::Error),
    #[error("Failed to parse luminosity mask: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid run number `{0}`")]
    Run(String),
    #[error("Invalid luminosity block range [{0}, {1}] in run {2}")]
    Range(u32, u32, u32),
}

/// Certified luminosity blocks of recorded data
///
/// The input format maps run numbers to lists of inclusive
/// luminosity block ranges, e.g. `{"273150": [[3, 62], [65, 70]]}`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LumiMask {
    ranges: HashMap<u32, Vec<[u32; 2]>>,
}

impl LumiMask {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, LumiMaskError> {
        let path = path.as_ref();
        debug!("Reading luminosity mask from {path:?}");
        let file = File::open(path)
            .map_err(|err| LumiMaskError::Io(path.to_owned(), err))?;
        let raw = serde_yaml::from_reader(BufReader::new(file))?;
        Self::from_raw(raw)
    }

    pub fn from_yaml(s: &str) -> Result<Self, LumiMaskError> {
        Self::from_raw(serde_yaml::from_str(s)?)
    }

    fn from_raw(
        raw: BTreeMap<String, Vec<[u32; 2]>>,
    ) -> Result<Self, LumiMaskError> {
        let mut ranges = HashMap::with_capacity(raw.len());
        for (run, mut blocks) in raw {
            let run: u32 =
                run.trim().parse().map_err(|_| LumiMaskError::Run(run))?;
            if let Some([first, last]) =
                blocks.iter().find(|[first, last]| first > last)
            {
                return Err(LumiMaskError::Range(*first, *last, run));
            }
            blocks.sort_unstable();
            ranges.insert(run, blocks);
        }
        Ok(Self { ranges })
    }

    /// Whether the luminosity block of the event is certified
    pub fn contains(&self, id: &EventId) -> bool {
        let Some(blocks) = self.ranges.get(&id.run) else {
            return false;
        };
        blocks
            .iter()
            .any(|[first, last]| (*first..=*last).contains(&id.lumi))
    }

    pub fn nruns(&self) -> usize {
        self.ranges.len()
    }
}

use std::path::PathBuf;

use clap::Parser;
use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum OptError {
    #[error("No input files given")]
    NoInput,
    #[error("Total number of events must be non-negative, got {0}")]
    NegativeTotal(f64),
}

#[derive(Debug, Parser)]
#[clap(about, author, version)]
pub(crate) struct Opt {
    /// Output file for the histograms.
    #[clap(long, short, value_parser)]
    pub(crate) outfile: PathBuf,

    /// Cut configuration in YAML format.
    ///
    /// Settings that are not given take their default values.
    #[clap(long, short, value_parser)]
    pub(crate) config: Option<PathBuf>,

    /// Directory with correction tables.
    ///
    /// The directory should contain the pileup profile `pileup.yaml`
    /// and one subdirectory per scale factor scheme. Without this
    /// option all correction factors are set to one.
    #[clap(long, value_parser)]
    pub(crate) corrections: Option<PathBuf>,

    /// Scale factor scheme, overrides the configuration file.
    #[clap(long)]
    pub(crate) scheme: Option<String>,

    /// Certified luminosity blocks, overrides the configuration file.
    #[clap(long, value_parser)]
    pub(crate) lumi_mask: Option<PathBuf>,

    /// Number of events before any preselection.
    ///
    /// This is reported as the first cutflow stage.
    #[clap(long)]
    pub(crate) total_events: Option<f64>,

    /// Number of events in the input files, only used to show progress.
    #[clap(long)]
    pub(crate) nevents: Option<u64>,

    /// Output file for the cutflow table in YAML format.
    #[clap(long, value_parser)]
    pub(crate) cutflow: Option<PathBuf>,

    /// Verbosity level
    #[clap(
        short,
        long,
        default_value = "Info",
        help = "Verbosity level.
Possible values with increasing amount of output are
'off', 'error', 'warn', 'info', 'debug', 'trace'.\n"
    )]
    pub(crate) loglevel: String,

    /// Input event files.
    #[clap(name = "INFILES", value_parser)]
    pub(crate) infiles: Vec<PathBuf>,
}

impl Opt {
    pub(crate) fn validate(self) -> Result<Self, OptError> {
        if self.infiles.is_empty() {
            return Err(OptError::NoInput);
        }
        match self.total_events {
            Some(total) if !(total >= 0.) => Err(OptError::NegativeTotal(total)),
            _ => Ok(self),
        }
    }
}

pub use crate::{
    analysis::{Analysis, AnalysisBuilder, AnalysisResults},
    category::Category,
    config::{Channel, CutConfig},
    corrections::CorrectionTables,
    cutflow::CutFlow,
    event::{Event, EventBuilder, EventId},
    histogram::Histograms,
    lumi_mask::LumiMask,
    reader::EventReader,
    traits::Progress,
    weight::{EventWeight, NoCorrections, ScaleFactors},
};

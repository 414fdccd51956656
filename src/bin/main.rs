mod opt;

use std::fs::File;
use std::io::BufWriter;

use crate::opt::Opt;

use anyhow::{Context, Result};
use clap::Parser;
use dilepton_select::{
    prelude::*, progress_bar::ProgressBar, GIT_BRANCH, GIT_REV, VERSION,
};
use env_logger::Env;
use log::{debug, info};

fn main() -> Result<()> {
    let args = argfile::expand_args_from(
        std::env::args_os(),
        argfile::parse_fromfile,
        argfile::PREFIX,
    )
    .with_context(|| "Failed to read argument file")?;
    let opt = Opt::parse_from(args).validate()?;

    let env = Env::default().filter_or("DILEPTON_LOG", &opt.loglevel);
    env_logger::init_from_env(env);

    if let (Some(rev), Some(branch)) = (GIT_REV, GIT_BRANCH) {
        info!("dilepton-select {VERSION} rev {rev} ({branch})");
    } else {
        info!("dilepton-select {VERSION}");
    }
    debug!("settings: {:#?}", opt);

    let mut config = match &opt.config {
        Some(path) => CutConfig::from_file(path).with_context(|| {
            format!("Failed to load cut configuration from {path:?}")
        })?,
        None => CutConfig::default(),
    };
    if let Some(scheme) = &opt.scheme {
        config.scale_factor_scheme = scheme.clone();
        config = config.validate()?;
    }
    debug!("cut configuration: {:#?}", config);

    match &opt.corrections {
        Some(dir) => {
            let tables = CorrectionTables::load(dir).with_context(|| {
                format!("Failed to load correction tables from {dir:?}")
            })?;
            run_main(opt, config, tables)
        }
        None => {
            info!("No correction tables, all scale factors are set to one");
            run_main(opt, config, NoCorrections)
        }
    }?;
    info!("done");
    Ok(())
}

fn run_main<S: ScaleFactors>(
    opt: Opt,
    config: CutConfig,
    scale_factors: S,
) -> Result<()> {
    let lumi_mask = opt.lumi_mask.clone().or_else(|| config.lumi_mask.clone());
    let mut analysis = AnalysisBuilder::default()
        .config(config)
        .scale_factors(scale_factors);
    if let Some(path) = lumi_mask {
        let mask = LumiMask::from_file(&path).with_context(|| {
            format!("Failed to load luminosity mask from {path:?}")
        })?;
        info!("Luminosity mask with {} runs", mask.nruns());
        analysis = analysis.lumi_mask(mask);
    }
    if let Some(total) = opt.total_events {
        analysis = analysis.total_events(total);
    }
    let analysis = analysis.build()?;

    let reader = EventReader::new(&opt.infiles);
    let progress = ProgressBar::new(opt.nevents, "events processed:");
    let results = analysis.run(reader, &progress)?;
    let report = results.report();
    info!("Cutflow:\n{report}");

    let out = File::create(&opt.outfile).with_context(|| {
        format!("Failed to create histogram file {:?}", opt.outfile)
    })?;
    results
        .histograms
        .write_yaml(BufWriter::new(out))
        .with_context(|| format!("Failed to write histograms to {:?}", opt.outfile))?;
    info!("Histograms written to {:?}", opt.outfile);

    if let Some(path) = &opt.cutflow {
        let out = File::create(path)
            .with_context(|| format!("Failed to create cutflow file {path:?}"))?;
        serde_yaml::to_writer(BufWriter::new(out), &report)
            .with_context(|| format!("Failed to write cutflow to {path:?}"))?;
    }
    Ok(())
}

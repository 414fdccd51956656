pub use crate::traits::Progress;

impl Progress for indicatif::ProgressBar {
    fn inc(&self, i: u64) {
        indicatif::ProgressBar::inc(self, i)
    }

    fn finish(&self) {
        indicatif::ProgressBar::finish(self)
    }
}

impl Progress for logbar::ProgressBar {
    fn inc(&self, i: u64) {
        logbar::ProgressBar::inc(self, i as usize)
    }

    fn finish(&self) {
        logbar::ProgressBar::finish(self)
    }
}

/// Dummy progress indicator
#[derive(Copy, Clone, Debug, Default)]
pub struct NoProgress {}

impl Progress for NoProgress {
    fn inc(&self, _i: u64) {}

    fn finish(&self) {}
}

/// Don't show any progress indicator
pub const NO_PROGRESS: NoProgress = NoProgress {};

/// Progress over the processed events
///
/// On an interactive terminal this is an `indicatif` bar, or a
/// spinner if the number of events is not known in advance. Otherwise
/// a `logbar` is shown, provided the number of events is known.
/// Logging is suspended while the indicator is active.
pub struct ProgressBar {
    bar: Box<dyn Progress>,
    logging_disabled: bool,
}

impl Default for ProgressBar {
    fn default() -> Self {
        Self {
            bar: Box::new(NO_PROGRESS),
            logging_disabled: false,
        }
    }
}

impl Progress for ProgressBar {
    fn inc(&self, i: u64) {
        self.bar.inc(i);
    }

    fn finish(&self) {
        self.bar.finish();
        if self.logging_disabled {
            log::set_max_level(log::LevelFilter::Info);
        }
    }
}

impl ProgressBar {
    pub fn new(len: Option<u64>, message: &str) -> Self {
        if log::max_level().to_level() != Some(log::Level::Info) {
            return ProgressBar::default();
        }
        match (console::Term::stderr().features().is_attended(), len) {
            (true, Some(len)) => ProgressBar::indicatif(len, message),
            (true, None) => ProgressBar::spinner(message),
            (false, Some(len)) => ProgressBar::logbar(len, message),
            (false, None) => ProgressBar::default(),
        }
    }

    fn indicatif(len: u64, message: &str) -> Self {
        let bar = indicatif::ProgressBar::new(len);
        if let Ok(style) = indicatif::ProgressStyle::default_bar()
            .template("{bar:60.cyan/cyan} {msg} {pos}/{len} [{elapsed}]")
        {
            bar.set_style(style);
        }
        bar.set_message(message.to_owned());
        Self::suspend_logging(bar)
    }

    fn spinner(message: &str) -> Self {
        let bar = indicatif::ProgressBar::new_spinner();
        if let Ok(style) = indicatif::ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg} {pos} [{elapsed}]")
        {
            bar.set_style(style);
        }
        bar.set_message(message.to_owned());
        Self::suspend_logging(bar)
    }

    fn logbar(len: u64, message: &str) -> Self {
        let style = logbar::Style::new().indicator('█');
        eprintln!("{}", message);
        let bar = logbar::ProgressBar::with_style(len as usize, style);
        Self::suspend_logging(bar)
    }

    // logging would overwrite the bar
    fn suspend_logging<P: Progress + 'static>(bar: P) -> Self {
        log::set_max_level(log::LevelFilter::Off);
        ProgressBar {
            bar: Box::new(bar),
            logging_disabled: true,
        }
    }
}

/// Progress indicator for long-running loops
pub trait Progress {
    /// Advance by `i` steps
    fn inc(&self, i: u64);

    fn finish(&self);
}

impl<P: Progress + ?Sized> Progress for &P {
    fn inc(&self, i: u64) {
        (**self).inc(i)
    }

    fn finish(&self) {
        (**self).finish()
    }
}

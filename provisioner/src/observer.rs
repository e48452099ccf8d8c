//! Status and progress reporting for runs

/// Receives human-readable status messages and progress percentages.
///
/// Install and backup runs report through this trait so they can run with or
/// without a front-end attached.
pub trait RunObserver: Send + Sync {
    fn on_status(&self, message: &str);

    /// Progress in percent, 0 to 100
    fn on_progress(&self, percent: f64);
}

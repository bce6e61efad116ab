use log::info;
use std::ops::ControlFlow;

/// Number of completed points between two progress callbacks.
pub const PROGRESS_TICK: usize = 2000;

/// Cooperative progress reporting and cancellation.
///
/// The orchestration consults the hook every [PROGRESS_TICK] completed
/// points and once after the last point. The hook runs on whichever worker
/// crossed the tick. Returning [ControlFlow::Break] requests cancellation:
/// points that have not been processed yet yield the NaN sentinel and the
/// partial output is returned normally.
pub trait ProgressHook: Sync {
    fn on_progress(&self, completed: usize, total: usize) -> ControlFlow<()>;
}

/// Hook that reports progress to the [log] facade and never cancels.
#[derive(Debug, Default)]
pub struct LogProgress;

impl ProgressHook for LogProgress {
    fn on_progress(&self, completed: usize, total: usize) -> ControlFlow<()> {
        info!("computed {} of {} modes", completed, total);
        ControlFlow::Continue(())
    }
}

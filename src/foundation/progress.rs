use std::time::{Duration, Instant};

/// Minimum wall time between two reports that are neither the first nor the last of a stage.
pub const REPORT_INTERVAL: Duration = Duration::from_millis(500);

/// Run stage a progress update belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    /// Walking the layer tree.
    Collect,
    /// Emitting attachment images and geometry.
    Export,
}

/// One advisory progress report.
#[derive(Clone, Copy, Debug)]
pub struct ProgressUpdate<'a> {
    /// Stage being reported.
    pub stage: Stage,
    /// 1-based index of the item just reached.
    pub count: usize,
    /// Number of items in the stage.
    pub total: usize,
    /// Display name of the item (a layer name).
    pub label: &'a str,
}

/// Receiver of throttled progress reports.
pub trait ProgressObserver {
    /// Called at most every [`REPORT_INTERVAL`], and always for the first and last item.
    fn update(&mut self, update: &ProgressUpdate<'_>);
}

impl<F> ProgressObserver for F
where
    F: FnMut(&ProgressUpdate<'_>),
{
    fn update(&mut self, update: &ProgressUpdate<'_>) {
        self(update)
    }
}

pub(crate) struct Progress<'a> {
    observer: Option<&'a mut dyn ProgressObserver>,
    stage: Stage,
    count: usize,
    total: usize,
    last_report: Option<Instant>,
    /// Latest item, and whether the observer saw it.
    latest: String,
    latest_reported: bool,
}

impl<'a> Progress<'a> {
    pub(crate) fn new(observer: Option<&'a mut dyn ProgressObserver>) -> Self {
        Self {
            observer,
            stage: Stage::Collect,
            count: 0,
            total: 0,
            last_report: None,
            latest: String::new(),
            latest_reported: false,
        }
    }

    pub(crate) fn begin(&mut self, stage: Stage, total: usize) {
        self.stage = stage;
        self.count = 0;
        self.total = total;
        self.last_report = None;
        self.latest.clear();
        self.latest_reported = false;
    }

    /// Close the stage. Unless the observer already saw the last item at `count == total`, the
    /// latest item is reported again with the total settled to the items actually reached.
    pub(crate) fn finish(&mut self) {
        if self.count == 0 || (self.latest_reported && self.count >= self.total) {
            return;
        }
        self.total = self.count;
        self.latest_reported = true;
        if let Some(observer) = self.observer.as_deref_mut() {
            observer.update(&ProgressUpdate {
                stage: self.stage,
                count: self.count,
                total: self.total,
                label: &self.latest,
            });
        }
    }

    pub(crate) fn advance(&mut self, label: &str) {
        self.advance_at(label, Instant::now());
    }

    pub(crate) fn advance_at(&mut self, label: &str, now: Instant) {
        self.count += 1;
        self.latest.clear();
        self.latest.push_str(label.trim());
        self.latest_reported = false;
        let Some(observer) = self.observer.as_deref_mut() else {
            return;
        };

        let boundary = self.count == 1 || self.count >= self.total;
        if !boundary
            && let Some(last) = self.last_report
            && now.saturating_duration_since(last) < REPORT_INTERVAL
        {
            return;
        }

        self.last_report = Some(now);
        self.latest_reported = true;
        observer.update(&ProgressUpdate {
            stage: self.stage,
            count: self.count,
            total: self.total,
            label: &self.latest,
        });
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/progress.rs"]
mod tests;

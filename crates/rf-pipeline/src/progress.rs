//! Progress aggregation.
//!
//! A single writer owns the merged [`ProgressSnapshot`] and republishes it
//! on every underlying event over a watch channel, so consumers always see
//! the latest merged state without any stage blocking on another. All
//! counter mutation goes through this type; the concurrent stages themselves
//! hold no shared counters.

use std::time::Instant;

use tokio::sync::watch;

use rf_core::{DownloadProgress, ProgressSnapshot, StitchStage};

/// Single-writer owner of the merged progress snapshot.
pub struct ProgressAggregator {
    snapshot: ProgressSnapshot,
    tx: watch::Sender<ProgressSnapshot>,
    render_started: Instant,
    stitch_started: Option<Instant>,
}

impl ProgressAggregator {
    /// Create an aggregator publishing on `tx`. The rendering clock starts
    /// now.
    pub fn new(tx: watch::Sender<ProgressSnapshot>) -> Self {
        Self {
            snapshot: ProgressSnapshot::default(),
            tx,
            render_started: Instant::now(),
            stitch_started: None,
        }
    }

    /// One more frame has been rendered.
    pub fn frame_rendered(&mut self) {
        self.snapshot.rendered_frames += 1;
        self.emit();
    }

    /// Latest frames-processed count self-reported by the active encoder.
    /// Counters never go backwards, so stale ticks are clamped.
    pub fn frames_encoded(&mut self, count: u64) {
        if count > self.snapshot.encoded_frames {
            self.snapshot.encoded_frames = count;
            self.emit();
        }
    }

    /// Rendering is complete. The elapsed duration is recorded exactly once;
    /// later calls are ignored.
    pub fn rendering_finished(&mut self) {
        if self.snapshot.rendered_done_in.is_none() {
            self.snapshot.rendered_done_in = Some(self.render_started.elapsed());
            self.emit();
        }
    }

    /// The stitch stage entered the given phase; (re)starts the stitch clock
    /// on first call.
    pub fn stitch_stage(&mut self, stage: StitchStage) {
        if self.stitch_started.is_none() {
            self.stitch_started = Some(Instant::now());
        }
        self.snapshot.stitch_stage = stage;
        self.emit();
    }

    /// The final stitch completed. The elapsed duration is recorded exactly
    /// once; later calls are ignored.
    pub fn encoding_finished(&mut self) {
        if self.snapshot.encoded_done_in.is_none() {
            let started = self.stitch_started.unwrap_or(self.render_started);
            self.snapshot.encoded_done_in = Some(started.elapsed());
            self.emit();
        }
    }

    /// Progress tick for one asset download, upserted by name.
    pub fn download_progress(&mut self, update: DownloadProgress) {
        match self
            .snapshot
            .downloads
            .iter_mut()
            .find(|d| d.name == update.name)
        {
            Some(existing) => existing.progress = update.progress,
            None => self.snapshot.downloads.push(update),
        }
        self.emit();
    }

    /// The snapshot as currently merged.
    pub fn snapshot(&self) -> &ProgressSnapshot {
        &self.snapshot
    }

    fn emit(&self) {
        self.tx.send_replace(self.snapshot.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aggregator() -> (ProgressAggregator, watch::Receiver<ProgressSnapshot>) {
        let (tx, rx) = watch::channel(ProgressSnapshot::default());
        (ProgressAggregator::new(tx), rx)
    }

    #[test]
    fn rendered_counter_published() {
        let (mut agg, rx) = aggregator();
        agg.frame_rendered();
        agg.frame_rendered();
        assert_eq!(rx.borrow().rendered_frames, 2);
    }

    #[test]
    fn encoded_counter_never_decreases() {
        let (mut agg, rx) = aggregator();
        agg.frames_encoded(7);
        agg.frames_encoded(3);
        assert_eq!(rx.borrow().encoded_frames, 7);
        agg.frames_encoded(9);
        assert_eq!(rx.borrow().encoded_frames, 9);
    }

    #[test]
    fn rendered_done_set_exactly_once() {
        let (mut agg, rx) = aggregator();
        assert!(rx.borrow().rendered_done_in.is_none());
        agg.rendering_finished();
        let first = rx.borrow().rendered_done_in;
        assert!(first.is_some());
        std::thread::sleep(std::time::Duration::from_millis(5));
        agg.rendering_finished();
        assert_eq!(rx.borrow().rendered_done_in, first);
    }

    #[test]
    fn stitch_clock_starts_at_stage_entry() {
        let (mut agg, rx) = aggregator();
        agg.stitch_stage(StitchStage::Muxing);
        assert_eq!(rx.borrow().stitch_stage, StitchStage::Muxing);
        agg.encoding_finished();
        let done = rx.borrow().encoded_done_in;
        assert!(done.is_some());
        agg.encoding_finished();
        assert_eq!(rx.borrow().encoded_done_in, done);
    }

    #[test]
    fn downloads_upsert_by_name_keeping_order() {
        let (mut agg, rx) = aggregator();
        agg.download_progress(DownloadProgress {
            name: "a.mp3".into(),
            progress: 0.2,
        });
        agg.download_progress(DownloadProgress {
            name: "b.mp3".into(),
            progress: 0.1,
        });
        agg.download_progress(DownloadProgress {
            name: "a.mp3".into(),
            progress: 0.9,
        });
        let snap = rx.borrow().clone();
        assert_eq!(snap.downloads.len(), 2);
        assert_eq!(snap.downloads[0].name, "a.mp3");
        assert!((snap.downloads[0].progress - 0.9).abs() < 1e-9);
        assert_eq!(snap.downloads[1].name, "b.mp3");
    }
}

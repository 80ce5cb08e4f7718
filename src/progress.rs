//! Terminal progress bars driven by the pipeline's snapshot stream.

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use rf_core::{ProgressSnapshot, StitchStage};

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template("{prefix:>8} [{bar:40}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
}

/// Render snapshots as two progress bars until the pipeline drops its
/// sender.
pub fn spawn_progress(
    mut rx: watch::Receiver<ProgressSnapshot>,
    total_frames: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let multi = MultiProgress::new();
        let rendered = multi.add(ProgressBar::new(total_frames));
        rendered.set_style(bar_style());
        rendered.set_prefix("rendered");
        let encoded = multi.add(ProgressBar::new(total_frames));
        encoded.set_style(bar_style());
        encoded.set_prefix("encoded");

        while rx.changed().await.is_ok() {
            let snap = rx.borrow_and_update().clone();
            rendered.set_position(snap.rendered_frames);
            encoded.set_position(snap.encoded_frames.min(total_frames));

            if let Some(elapsed) = snap.rendered_done_in {
                if !rendered.is_finished() {
                    rendered.finish_with_message(format!("done in {elapsed:.1?}"));
                }
            }

            let downloading = snap.downloads.iter().filter(|d| d.progress < 1.0).count();
            if downloading > 0 {
                encoded.set_message(format!("downloading {downloading} assets"));
            } else if snap.stitch_stage == StitchStage::Muxing {
                encoded.set_message("muxing");
            } else {
                encoded.set_message("");
            }

            if let Some(elapsed) = snap.encoded_done_in {
                if !encoded.is_finished() {
                    encoded.finish_with_message(format!("done in {elapsed:.1?}"));
                }
            }
        }

        rendered.abandon();
        encoded.abandon();
    })
}

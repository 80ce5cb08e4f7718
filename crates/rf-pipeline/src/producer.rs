//! Frame producer session.
//!
//! Drives the rendering engine across a frame range with bounded
//! parallelism. Frames may complete in any order; a reorder buffer delivers
//! them downstream in strictly increasing index order, exactly once each, so
//! the consumer can pipe them straight into an encoder without its own
//! buffering. The delivery channel is bounded, so a slow consumer throttles
//! rendering instead of accumulating un-fed frames.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use rf_core::{AssetReference, Error, Result};

use crate::source::{FrameSource, RenderedFrame};

/// Render every frame in the inclusive `range` and deliver each exactly once
/// over `delivery`, in increasing index order.
///
/// `rendered` receives one tick per frame as it completes (arrival order,
/// not delivery order), driving the rendered-frames counter. On success,
/// returns the asset references collected across all frames, in frame index
/// order.
///
/// # Errors
///
/// A single failed frame is fatal: in-flight frame tasks are abandoned and
/// the error, carrying the frame index, is returned. Cancellation of
/// `cancel` aborts the session with [`Error::Canceled`].
pub async fn run_session(
    source: Arc<dyn FrameSource>,
    range: (u32, u32),
    parallelism: usize,
    delivery: mpsc::Sender<RenderedFrame>,
    rendered: mpsc::UnboundedSender<()>,
    cancel: CancellationToken,
) -> Result<Vec<AssetReference>> {
    let (start, end) = range;
    let mut next_to_spawn = u64::from(start);
    let mut next_to_deliver = start;
    let mut pending: BTreeMap<u32, RenderedFrame> = BTreeMap::new();
    let mut tasks: JoinSet<Result<RenderedFrame>> = JoinSet::new();
    let mut assets: Vec<AssetReference> = Vec::new();

    // Never run further ahead of the undelivered prefix than this: one slow
    // early frame must stall new work, not fill the reorder buffer with
    // completed frames nobody can consume yet.
    let lookahead = 2 * parallelism as u64;

    loop {
        while tasks.len() < parallelism
            && next_to_spawn <= u64::from(end)
            && next_to_spawn < u64::from(next_to_deliver) + lookahead
        {
            let source = source.clone();
            let index = next_to_spawn as u32;
            tasks.spawn(async move {
                source.render_frame(index).await.map_err(|e| match e {
                    e @ Error::Render { .. } => e,
                    other => Error::render(index, other.to_string()),
                })
            });
            next_to_spawn += 1;
        }

        if tasks.is_empty() {
            debug_assert!(pending.is_empty());
            break;
        }

        let joined = tokio::select! {
            _ = cancel.cancelled() => {
                tasks.shutdown().await;
                return Err(Error::Canceled);
            }
            joined = tasks.join_next() => joined,
        };

        match joined {
            Some(Ok(Ok(frame))) => {
                let _ = rendered.send(());
                pending.insert(frame.index, frame);
            }
            Some(Ok(Err(e))) => {
                tasks.shutdown().await;
                return Err(e);
            }
            Some(Err(join_err)) => {
                tasks.shutdown().await;
                return Err(Error::Internal(format!(
                    "frame task failed: {join_err}"
                )));
            }
            None => {}
        }

        while let Some(mut frame) = pending.remove(&next_to_deliver) {
            assets.append(&mut frame.assets);
            let sent = tokio::select! {
                _ = cancel.cancelled() => false,
                res = delivery.send(frame) => res.is_ok(),
            };
            if !sent {
                // Canceled, or the consumer went away; the pipeline is
                // aborting either way.
                tasks.shutdown().await;
                return Err(Error::Canceled);
            }
            next_to_deliver = next_to_deliver.saturating_add(1);
        }
    }

    tracing::debug!("frame session complete, {} assets collected", assets.len());
    Ok(assets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::FrameData;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    struct FakeSource {
        rendered: Mutex<Vec<u32>>,
        fail_at: Option<u32>,
    }

    impl FakeSource {
        fn new(fail_at: Option<u32>) -> Self {
            Self {
                rendered: Mutex::new(Vec::new()),
                fail_at,
            }
        }
    }

    #[async_trait]
    impl FrameSource for FakeSource {
        async fn render_frame(&self, index: u32) -> Result<RenderedFrame> {
            // Jittered delays force out-of-order completion.
            tokio::time::sleep(Duration::from_millis(u64::from(index % 3) * 3)).await;
            if self.fail_at == Some(index) {
                return Err(Error::render(index, "synthetic failure"));
            }
            self.rendered.lock().unwrap().push(index);
            let assets = if index % 4 == 0 {
                vec![AssetReference::new(format!("/audio/{index}.mp3"))]
            } else {
                vec![]
            };
            Ok(RenderedFrame {
                index,
                data: FrameData::Bytes(vec![index as u8]),
                assets,
            })
        }

        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    async fn collect(
        parallelism: usize,
        range: (u32, u32),
    ) -> (Vec<u32>, Vec<AssetReference>, usize) {
        let source = Arc::new(FakeSource::new(None));
        let (tx, mut rx) = mpsc::channel(parallelism);
        let (rtx, mut rrx) = mpsc::unbounded_channel();
        let session = tokio::spawn(run_session(
            source,
            range,
            parallelism,
            tx,
            rtx,
            CancellationToken::new(),
        ));

        let mut delivered = Vec::new();
        while let Some(frame) = rx.recv().await {
            delivered.push(frame.index);
        }
        let assets = session.await.unwrap().unwrap();

        let mut ticks = 0;
        while rrx.try_recv().is_ok() {
            ticks += 1;
        }
        (delivered, assets, ticks)
    }

    #[tokio::test]
    async fn delivers_each_frame_exactly_once_in_order() {
        for parallelism in [1, 2, 3, 10] {
            let (delivered, _, ticks) = collect(parallelism, (0, 9)).await;
            assert_eq!(delivered, (0..10).collect::<Vec<_>>(), "P={parallelism}");
            assert_eq!(ticks, 10, "P={parallelism}");
        }
    }

    #[tokio::test]
    async fn honors_sub_range() {
        let (delivered, _, _) = collect(3, (4, 7)).await;
        assert_eq!(delivered, vec![4, 5, 6, 7]);
    }

    #[tokio::test]
    async fn assets_collected_in_frame_order() {
        let (_, assets, _) = collect(4, (0, 9)).await;
        let srcs: Vec<&str> = assets.iter().map(|a| a.src.as_str()).collect();
        assert_eq!(srcs, vec!["/audio/0.mp3", "/audio/4.mp3", "/audio/8.mp3"]);
    }

    #[tokio::test]
    async fn failed_frame_aborts_session_with_index() {
        let source = Arc::new(FakeSource::new(Some(5)));
        let (tx, mut rx) = mpsc::channel(3);
        let (rtx, _rrx) = mpsc::unbounded_channel();
        let session = tokio::spawn(run_session(
            source,
            (0, 9),
            3,
            tx,
            rtx,
            CancellationToken::new(),
        ));

        // Drain whatever was delivered before the failure.
        while rx.recv().await.is_some() {}
        let err = session.await.unwrap().unwrap_err();
        match err {
            Error::Render { frame, .. } => assert_eq!(frame, 5),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn reorder_buffer_is_bounded_while_an_early_frame_stalls() {
        use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

        #[derive(Default)]
        struct StallingSource {
            zero_done: AtomicBool,
            done_before_zero: AtomicU32,
        }

        #[async_trait]
        impl FrameSource for StallingSource {
            async fn render_frame(&self, index: u32) -> Result<RenderedFrame> {
                if index == 0 {
                    tokio::time::sleep(Duration::from_millis(150)).await;
                    self.zero_done.store(true, Ordering::SeqCst);
                } else if !self.zero_done.load(Ordering::SeqCst) {
                    self.done_before_zero.fetch_add(1, Ordering::SeqCst);
                }
                Ok(RenderedFrame {
                    index,
                    data: FrameData::Bytes(vec![0]),
                    assets: vec![],
                })
            }

            async fn close(&self) -> Result<()> {
                Ok(())
            }
        }

        let parallelism = 4;
        let source = Arc::new(StallingSource::default());
        let (tx, mut rx) = mpsc::channel(parallelism);
        let (rtx, _rrx) = mpsc::unbounded_channel();
        let session = tokio::spawn(run_session(
            source.clone(),
            (0, 199),
            parallelism,
            tx,
            rtx,
            CancellationToken::new(),
        ));

        let mut delivered = 0u32;
        while rx.recv().await.is_some() {
            delivered += 1;
        }
        session.await.unwrap().unwrap();

        assert_eq!(delivered, 200);
        // Nothing is deliverable until frame 0 finishes, so everything that
        // completed before it is sitting un-fed in the reorder buffer.
        let buffered = source.done_before_zero.load(Ordering::SeqCst) as usize;
        assert!(
            buffered <= 2 * parallelism,
            "{buffered} frames completed while frame 0 was in flight"
        );
    }

    #[tokio::test]
    async fn cancellation_stops_the_session() {
        let source = Arc::new(FakeSource::new(None));
        let (tx, mut rx) = mpsc::channel(1);
        let (rtx, _rrx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let session = tokio::spawn(run_session(
            source,
            (0, 999),
            2,
            tx,
            rtx,
            cancel.clone(),
        ));

        // Let a few frames through, then pull the plug.
        for _ in 0..3 {
            rx.recv().await;
        }
        cancel.cancel();
        drop(rx);
        let err = session.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::Canceled));
    }
}

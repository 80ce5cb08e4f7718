//! Pipeline orchestrator.
//!
//! Top-level coordinator for one render job. Decides the pipeline topology
//! (streamed pre-encode plus final mux, or render-then-encode-once), owns
//! the frame producer session and the encoder handles it creates, sequences
//! the stages, and republishes merged progress after every event. The
//! engine session is borrowed from the caller but closed here on every exit
//! path.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use rf_av::{resolve_assets, EncoderInput, EncoderParams};
use rf_core::{Error, ProgressSnapshot, RenderJobConfig, Result, StitchStage};

use crate::encoder::EncoderSpawner;
use crate::guard::{PipelineResources, PreEncoder};
use crate::producer::run_session;
use crate::progress::ProgressAggregator;
use crate::source::{FrameData, FrameSource, RenderedFrame};

/// Result of a completed render job.
#[derive(Debug, Clone)]
pub struct RenderOutput {
    /// The final output file, or the frame directory in image-sequence mode.
    pub output_path: PathBuf,
    /// Number of frames rendered.
    pub frames_rendered: u64,
}

/// Render a video (or image sequence) according to `config`.
///
/// Drives the engine session across the configured frame range, optionally
/// pre-encoding frames concurrently with rendering, then stitches the
/// result together with any assets the frames referenced. Progress
/// snapshots are published on `progress` throughout.
///
/// The engine session is closed before this returns, success or failure,
/// along with every subprocess and temporary file created along the way.
pub async fn render_media(
    engine: Arc<dyn FrameSource>,
    spawner: &dyn EncoderSpawner,
    config: &RenderJobConfig,
    progress: watch::Sender<ProgressSnapshot>,
) -> Result<RenderOutput> {
    let mut aggregator = ProgressAggregator::new(progress);
    let mut resources = PipelineResources::new(engine);
    let cancel = CancellationToken::new();

    let result = run_pipeline(spawner, config, &cancel, &mut aggregator, &mut resources).await;

    // Stop anything still in flight before tearing down.
    cancel.cancel();
    resources.release().await;
    result
}

async fn run_pipeline(
    spawner: &dyn EncoderSpawner,
    config: &RenderJobConfig,
    cancel: &CancellationToken,
    aggregator: &mut ProgressAggregator,
    resources: &mut PipelineResources,
) -> Result<RenderOutput> {
    config.validate()?;
    tokio::fs::create_dir_all(&config.output_dir).await?;

    let range = config.resolved_frame_range();

    if config.stream_encode {
        let intermediate = config.intermediate_path();
        tracing::debug!("starting streamed pre-encode to {}", intermediate.display());
        let mut sink = spawner.spawn(&stream_params(config, &intermediate))?;
        sink.mark_temporary(intermediate);
        resources.set_pre_encoder(sink);
    }

    let engine = resources
        .engine()
        .ok_or_else(|| Error::Internal("engine session already closed".into()))?;
    let (frame_tx, mut frame_rx) = mpsc::channel::<RenderedFrame>(config.parallelism);
    let (tick_tx, mut tick_rx) = mpsc::unbounded_channel::<()>();
    let session = tokio::spawn(run_session(
        engine,
        range,
        config.parallelism,
        frame_tx,
        tick_tx,
        cancel.child_token(),
    ));

    let mut encoder_progress = match resources.pre_encoder_mut() {
        PreEncoder::Streaming(sink) => Some(sink.progress()),
        PreEncoder::Disabled => None,
    };

    let mut feed_error: Option<Error> = None;
    loop {
        tokio::select! {
            Some(()) = tick_rx.recv() => aggregator.frame_rendered(),
            maybe = frame_rx.recv() => match maybe {
                Some(frame) => {
                    if let Err(e) = consume_frame(frame, config, resources).await {
                        feed_error = Some(e);
                        cancel.cancel();
                        break;
                    }
                }
                None => break,
            },
            changed = watch_count(&mut encoder_progress) => match changed {
                Some(count) => aggregator.frames_encoded(count),
                None => encoder_progress = None,
            },
        }
    }

    if let Some(e) = feed_error {
        let _ = session.await;
        if let PreEncoder::Streaming(sink) = resources.pre_encoder_mut() {
            // The encoder's own failure is more informative than the broken
            // pipe that exposed it.
            sink.wait().await?;
        }
        return Err(e);
    }

    let assets = match session.await {
        Ok(res) => res?,
        Err(join_err) => {
            return Err(Error::Internal(format!(
                "frame session task failed: {join_err}"
            )))
        }
    };
    while tick_rx.try_recv().is_ok() {
        aggregator.frame_rendered();
    }
    aggregator.rendering_finished();

    // The engine session and the streaming encoder's drain are independent
    // resources; close them concurrently.
    let engine = resources.take_engine();
    let close_engine = async {
        if let Some(engine) = engine {
            if let Err(e) = engine.close().await {
                tracing::warn!("failed to close engine session: {e}");
            }
        }
    };
    if let PreEncoder::Streaming(sink) = resources.pre_encoder_mut() {
        let drain = async {
            sink.close_input().await?;
            sink.wait().await
        };
        let ((), encode_result) = tokio::join!(close_engine, drain);
        encode_result?;
        aggregator.frames_encoded(config.frame_count());
    } else {
        close_engine.await;
    }

    if !config.produces_video() {
        return Ok(RenderOutput {
            output_path: config.output_dir.clone(),
            frames_rendered: config.frame_count(),
        });
    }

    if let Some(parent) = config.output_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let pre_encoded = resources.pre_encoder_mut().is_streaming();
    aggregator.stitch_stage(if pre_encoded {
        StitchStage::Muxing
    } else {
        StitchStage::Encoding
    });

    let audio = resolve_assets(&assets, &config.output_dir, |p| {
        aggregator.download_progress(p)
    })
    .await?;

    let input = if pre_encoded {
        EncoderInput::Intermediate {
            path: config.intermediate_path(),
        }
    } else {
        EncoderInput::Sequence {
            dir: config.output_dir.clone(),
            image_format: config.image_format,
            start: range.0,
        }
    };
    resources.set_stitcher(spawner.spawn(&EncoderParams {
        width: config.width,
        height: config.height,
        fps: config.fps,
        codec: config.codec,
        pixel_format: config.pixel_format,
        crf: config.crf,
        input,
        audio,
        output: config.output_path.clone(),
        overwrite: config.overwrite,
    })?);

    if let Some(sink) = resources.stitcher_mut() {
        let mut prog = sink.progress();
        let wait_fut = sink.wait();
        tokio::pin!(wait_fut);
        let mut watching = true;
        loop {
            tokio::select! {
                res = &mut wait_fut => {
                    res?;
                    break;
                }
                changed = prog.changed(), if watching => match changed {
                    Ok(()) => aggregator.frames_encoded(*prog.borrow_and_update()),
                    Err(_) => watching = false,
                },
            }
        }
        aggregator.frames_encoded(*prog.borrow());
    }
    aggregator.encoding_finished();
    tracing::info!("render complete: {}", config.output_path.display());

    Ok(RenderOutput {
        output_path: config.output_path.clone(),
        frames_rendered: config.frame_count(),
    })
}

/// Forward one frame: feed it to the streaming encoder, or leave it on disk
/// for the final stitch.
async fn consume_frame(
    frame: RenderedFrame,
    config: &RenderJobConfig,
    resources: &mut PipelineResources,
) -> Result<()> {
    match resources.pre_encoder_mut() {
        PreEncoder::Streaming(sink) => match frame.data {
            FrameData::Bytes(bytes) => sink.feed(&bytes).await?,
            FrameData::File(path) => {
                let bytes = tokio::fs::read(&path).await?;
                sink.feed(&bytes).await?;
                // The streamed copy supersedes the file.
                let _ = tokio::fs::remove_file(&path).await;
            }
        },
        PreEncoder::Disabled => {
            if let FrameData::Bytes(bytes) = frame.data {
                let path = config.output_dir.join(config.frame_file_name(frame.index));
                tokio::fs::write(&path, &bytes).await?;
            }
        }
    }
    Ok(())
}

fn stream_params(config: &RenderJobConfig, intermediate: &Path) -> EncoderParams {
    EncoderParams {
        width: config.width,
        height: config.height,
        fps: config.fps,
        codec: config.codec,
        pixel_format: config.pixel_format,
        crf: config.crf,
        input: EncoderInput::Pipe {
            image_format: config.image_format,
        },
        audio: Vec::new(),
        output: intermediate.to_path_buf(),
        overwrite: true,
    }
}

/// Next value from an optional progress watch; pends forever when absent so
/// it can sit in a select arm, and yields `None` once the sender is gone.
async fn watch_count(rx: &mut Option<watch::Receiver<u64>>) -> Option<u64> {
    match rx {
        Some(rx) => match rx.changed().await {
            Ok(()) => Some(*rx.borrow_and_update()),
            Err(_) => None,
        },
        None => std::future::pending().await,
    }
}

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use super::{FetchRequest, FrameFetcher, HandlerContext, HandlerSignal, HandlerSpec};
use crate::endpoint::Transport;
use crate::error::TransportError;
use crate::frame::{Frame, FrameDecoder};

fn cache_token() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

async fn fetch_frame(
    fetcher: &dyn FrameFetcher,
    decoder: &dyn FrameDecoder,
    spec: &HandlerSpec,
) -> Result<Frame, TransportError> {
    let token = cache_token();
    let url = spec.url(Transport::JpegPoll, Some(token))?;
    let bytes = fetcher
        .fetch(FetchRequest {
            url,
            transport: Transport::JpegPoll,
            cache_token: Some(token),
        })
        .await?;
    decoder.decode(&bytes)
}

/// Poll snapshots one at a time.
///
/// The next fetch is scheduled after the previous one completes, so a slow
/// camera lowers the effective rate instead of stacking requests.
pub(super) async fn run(
    fetcher: Arc<dyn FrameFetcher>,
    decoder: Arc<dyn FrameDecoder>,
    spec: HandlerSpec,
    ctx: HandlerContext,
) {
    let interval = spec.jpeg.frame_interval();
    let mut failures = 0u32;
    loop {
        match fetch_frame(fetcher.as_ref(), decoder.as_ref(), &spec).await {
            Ok(frame) => {
                failures = 0;
                if !ctx.send(HandlerSignal::Frame(frame)) {
                    return;
                }
                tokio::time::sleep(interval).await;
            }
            Err(err) => {
                failures += 1;
                log::debug!("snapshot fetch failed ({} in a row): {}", failures, err);
                if failures > spec.jpeg.max_failures {
                    return ctx.fail(err);
                }
                tokio::time::sleep(spec.jpeg.retry_delay).await;
            }
        }
    }
}

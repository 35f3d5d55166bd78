use tokio::sync::mpsc;

use super::{HandlerContext, HandlerSignal, PipelineSignal};
use crate::error::TransportError;

/// Forward media pipeline signals until the first failure.
pub(super) async fn run(mut signals: mpsc::Receiver<PipelineSignal>, ctx: HandlerContext) {
    while let Some(signal) = signals.recv().await {
        let forwarded = match signal {
            PipelineSignal::Playing => HandlerSignal::Ready,
            PipelineSignal::Frame(frame) => HandlerSignal::Frame(frame),
            PipelineSignal::MediaError(message) => {
                ctx.fail(TransportError::Decode(message));
                return;
            }
            PipelineSignal::NetworkError(message) => {
                ctx.fail(TransportError::Network(message));
                return;
            }
            PipelineSignal::Ended => {
                ctx.fail(TransportError::Network("stream ended".into()));
                return;
            }
        };
        if !ctx.send(forwarded) {
            return;
        }
    }
    ctx.fail(TransportError::Network("media pipeline detached".into()));
}

use async_trait::async_trait;

use crate::frame::{Direction, Frame};
use crate::runtime::PipelineError;

/// Frames emitted by one `process` call, in emission order.
#[derive(Debug, Default)]
pub struct ProcessorContext {
    pub out: Vec<(Frame, Direction)>,
}

impl ProcessorContext {
    /// Emit a frame downstream (toward the telephony output).
    pub fn emit(&mut self, frame: Frame) {
        self.out.push((frame, Direction::Downstream));
    }

    /// Emit a frame upstream (toward the telephony input).
    pub fn emit_upstream(&mut self, frame: Frame) {
        self.out.push((frame, Direction::Upstream));
    }

    /// Pass a frame along unchanged in the direction it arrived.
    pub fn forward(&mut self, frame: Frame, direction: Direction) {
        self.out.push((frame, direction));
    }
}

/// One stage of the per-call chain.
///
/// Contract: accept a frame with a direction, optionally transform it,
/// emit zero-or-more frames via `ctx`. A processor that does not handle a
/// frame must `ctx.forward` it — the runtime never forwards implicitly.
/// Errors are contained: the runtime logs them and forwards the original
/// frame as if the processor were absent.
#[async_trait]
pub trait Processor: Send {
    /// Stable name; also the anchor for [`crate::PipelineHandle`] injection.
    fn name(&self) -> &'static str;

    async fn process(
        &mut self,
        frame: Frame,
        direction: Direction,
        ctx: &mut ProcessorContext,
    ) -> Result<(), PipelineError>;
}

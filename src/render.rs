//! Document rendering hook for durable request snapshots
use crate::context::RequestContext;
use crate::request::{RequestDetails, Signature};

/// External document renderer. Pure function of the request and its
/// signature set; the engine never persists the rendered bytes, storage is
/// the caller's concern.
pub trait DocumentRenderer: Send + Sync {
    fn render(
        &self,
        context: &RequestContext,
        details: &RequestDetails,
        signatures: &[Signature],
    ) -> anyhow::Result<Vec<u8>>;
}

/// Noop renderer: always fails. Used as default when no renderer is
/// configured.
pub struct NoopDocumentRenderer;

impl DocumentRenderer for NoopDocumentRenderer {
    fn render(
        &self,
        _: &RequestContext,
        _: &RequestDetails,
        _: &[Signature],
    ) -> anyhow::Result<Vec<u8>> {
        Err(anyhow::Error::msg("no document renderer configured"))
    }
}

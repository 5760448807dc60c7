//! A remote tool wrapped as a [`ToolAdapter`].

use crate::session::TransportSession;
use async_trait::async_trait;
use std::sync::{Arc, Weak};
use std::time::Duration;
use toolbridge_core::{Arguments, BridgeError, BridgeResult, InvocationResult};
use toolbridge_tools::{ToolAdapter, ToolDescriptor};
use tracing::warn;

/// A remote tool bound to the session that discovered it.
///
/// Holds only a weak handle: the registry owns sessions, and an adapter
/// whose session is gone or closed fails with `SessionClosed`.
pub struct RemoteToolAdapter {
    descriptor: ToolDescriptor,
    session: Weak<TransportSession>,
    server: String,
    timeout: Duration,
}

impl RemoteToolAdapter {
    pub fn new(descriptor: ToolDescriptor, session: &Arc<TransportSession>) -> Self {
        Self {
            descriptor,
            session: Arc::downgrade(session),
            server: session.name().to_string(),
            timeout: session.config().call_timeout(),
        }
    }

    fn live_session(&self) -> BridgeResult<Arc<TransportSession>> {
        match self.session.upgrade() {
            Some(session) if session.is_ready() => Ok(session),
            _ => Err(BridgeError::SessionClosed(format!(
                "tool '{}' belongs to closed session '{}'",
                self.descriptor.name, self.server
            ))),
        }
    }
}

#[async_trait]
impl ToolAdapter for RemoteToolAdapter {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn invoke(&self, args: Arguments) -> BridgeResult<InvocationResult> {
        let session = self.live_session()?;

        // Missing required arguments never reach the wire.
        if let Err(e) = self.descriptor.parameters.validate(&args) {
            return Ok(InvocationResult::from_error(&e));
        }

        let result = session
            .call(&self.descriptor.name, args, self.timeout)
            .await?;
        if let Some(error) = &result.error {
            warn!(
                server = %self.server,
                tool = %self.descriptor.name,
                kind = %error.kind,
                error = %error.message,
                "tool call failed"
            );
        }
        Ok(result)
    }
}

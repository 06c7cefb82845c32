use async_trait::async_trait;

use super::Endpoint;
use crate::transaction::ServerTransaction;
use crate::transport::incoming::IncomingRequest;

/// Application callback for inbound requests.
///
/// Called once per new request, duplicates are answered by the endpoint.
/// The handler answers through `response`; if it does not within the
/// piggyback window the request is acknowledged empty and the answer is
/// sent later as a separate message.
#[async_trait]
pub trait EndpointHandler: Send + Sync + 'static {
    /// Handle an inbound request.
    async fn handle(&self, request: IncomingRequest, response: ServerTransaction, endpoint: &Endpoint);
}

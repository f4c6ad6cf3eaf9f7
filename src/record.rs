use crate::{
    storage::FixtureStore,
    wire::{Transport, WireRequest, WireResponse},
};

/// Wraps a live transport and captures its traffic as replayable fixtures.
///
/// Every successful exchange is appended to the store's recording folder
/// under the endpoint's next sequence index. Persistence problems are
/// logged and swallowed; the live response is surfaced to the caller
/// either way. Transport failures pass through untouched and record
/// nothing.
#[derive(Debug)]
pub struct RecordSession<T> {
    transport: T,
    store: FixtureStore,
}

impl<T: Transport> RecordSession<T> {
    pub fn new(transport: T, store: FixtureStore) -> Self {
        Self { transport, store }
    }

    pub fn into_inner(self) -> T {
        self.transport
    }
}

impl<T: Transport> Transport for RecordSession<T> {
    fn send(&self, request: &WireRequest) -> anyhow::Result<WireResponse> {
        let response = self.transport.send(request)?;

        if let Err(err) = self.store.append(request, &response) {
            tracing::warn!(
                endpoint = %request.path,
                error = %format!("{err:#}"),
                "failed to record fixture; returning live response anyway"
            );
        }

        Ok(response)
    }
}

use server_api::ApiContext;
use shared::protocol::FeedEvent;
use tokio::sync::broadcast;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) api: ApiContext,
    /// Changes to the shared feed, fanned out to `/feed/ws` subscribers.
    pub(crate) feed: broadcast::Sender<FeedEvent>,
}

impl AppState {
    pub(crate) fn new(api: ApiContext) -> Self {
        let (feed, _) = broadcast::channel(256);
        Self { api, feed }
    }

    /// Dropped when nobody is listening.
    pub(crate) fn publish(&self, event: FeedEvent) {
        let _ = self.feed.send(event);
    }
}

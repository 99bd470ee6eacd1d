//! Builder for [`LinkSession`].

use std::{
    collections::HashMap,
    sync::{Arc, Weak},
};

use tokio_util::task::TaskTracker;

use super::{ChannelRole, EventRelay, LinkSession, Role, SessionShared};
use crate::{
    config::TransferConfig,
    correlation::RequestCorrelator,
    link::{ChannelId, DiscardSink, EchoHandler, PayloadSink, RawLink, RequestHandler},
    transfer::{Outbound, TransferListener, TransferRegistry},
};

/// Builder for [`LinkSession`].
///
/// Channels default to [`ChannelRole::Plain`], payloads to a discarding sink
/// and requests to an echoing handler.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use bleframe::{
///     config::TransferConfig,
///     link::ChannelId,
///     loopback::loopback,
///     session::{ChannelRole, LinkSession, Role},
/// };
///
/// let (link, _port) = loopback(185);
/// let session = LinkSession::builder(link, Role::Controller)
///     .config(TransferConfig::legacy())
///     .channel(ChannelId::from_u128(1, 2), ChannelRole::ChunkedRequest)
///     .build();
/// assert_eq!(session.role(), Role::Controller);
/// ```
pub struct LinkSessionBuilder {
    link: Arc<dyn RawLink>,
    role: Role,
    config: TransferConfig,
    channels: HashMap<ChannelId, ChannelRole>,
    sink: Arc<dyn PayloadSink>,
    handler: Arc<dyn RequestHandler>,
    listener: Option<Arc<dyn TransferListener>>,
}

impl LinkSessionBuilder {
    pub(super) fn new(link: Arc<dyn RawLink>, role: Role) -> Self {
        Self {
            link,
            role,
            config: TransferConfig::default(),
            channels: HashMap::new(),
            sink: Arc::new(DiscardSink),
            handler: Arc::new(EchoHandler),
            listener: None,
        }
    }

    /// Use `config` for every transfer and request of the session.
    #[must_use]
    pub fn config(mut self, config: TransferConfig) -> Self {
        self.config = config;
        self
    }

    /// Declare how traffic on `channel` is interpreted.
    #[must_use]
    pub fn channel(mut self, channel: ChannelId, role: ChannelRole) -> Self {
        self.channels.insert(channel, role);
        self
    }

    /// Receive completed plain payloads.
    #[must_use]
    pub fn sink(mut self, sink: impl PayloadSink) -> Self {
        self.sink = Arc::new(sink);
        self
    }

    /// Answer inbound requests.
    #[must_use]
    pub fn handler(mut self, handler: impl RequestHandler) -> Self {
        self.handler = Arc::new(handler);
        self
    }

    /// Observe transfer lifecycle events.
    #[must_use]
    pub fn listener(mut self, listener: impl TransferListener) -> Self {
        self.listener = Some(Arc::new(listener));
        self
    }

    /// Assemble the session.
    #[must_use]
    pub fn build(self) -> LinkSession {
        let Self {
            link,
            role,
            config,
            channels,
            sink,
            handler,
            listener,
        } = self;
        let shared = Arc::new_cyclic(|weak: &Weak<SessionShared>| {
            let registry = TransferRegistry::new(config, Arc::new(EventRelay(weak.clone())));
            SessionShared {
                role,
                config,
                outbound: Outbound::new(link.clone(), registry),
                link,
                channels,
                correlator: RequestCorrelator::new(config.request_timeout),
                sink,
                handler,
                listener,
                tasks: TaskTracker::new(),
            }
        });
        LinkSession(shared)
    }
}

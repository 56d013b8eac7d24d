//! Client orchestrator
//!
//! A [`Client`] owns one REST dispatcher, one entity cache, one event router,
//! and (once started) one gateway connection. Instances are independent; a
//! process may run several. A client runs once: after it terminates it
//! cannot be started again.

use std::sync::Arc;

use chat_cache::{Cached, EntityCache};
use chat_common::ClientConfig;
use chat_core::{Cdn, Intents, User};
use chat_gateway::{ConnectionStatus, GatewayConnection, GatewayError, GatewayHandle, GatewayOptions};
use chat_rest::{HttpTransport, RestClient};
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tracing::Instrument;
use uuid::Uuid;

use crate::emitter::EventEmitter;
use crate::error::ClientError;
use crate::events::Event;
use crate::resolver::RestResolver;
use crate::router::{EventRouter, RouterStats};

/// Client lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Built, not started
    Idle,
    /// Gateway task running (connecting, ready, or reconnecting)
    Running,
    /// Stopped or failed for good
    Terminated,
}

/// Builder for [`Client`]
pub struct ClientBuilder {
    config: ClientConfig,
    transport: Option<Arc<dyn HttpTransport>>,
}

impl ClientBuilder {
    #[must_use]
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            transport: None,
        }
    }

    /// Connect to a fixed gateway URL instead of discovering it
    #[must_use]
    pub fn gateway_url(mut self, url: impl Into<String>) -> Self {
        self.config.gateway.url = Some(url.into());
        self
    }

    #[must_use]
    pub fn intents(mut self, intents: Intents) -> Self {
        self.config.gateway.intents = intents;
        self
    }

    /// Send REST calls through a custom transport
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn build(self) -> Result<Client, ClientError> {
        let config = self.config;
        let rest = match self.transport {
            Some(transport) => RestClient::new(transport, &config.rest),
            None => RestClient::from_config(&config.rest, &config.token)?,
        };

        if config.gateway.intents.is_privileged() {
            tracing::info!(
                intents = config.gateway.intents.bits(),
                "Privileged intents requested; they must be enabled for the application"
            );
        }

        let cache = Arc::new(EntityCache::new());
        let emitter = Arc::new(EventEmitter::new());
        let resolver = RestResolver::new(rest.clone());
        let router = Arc::new(EventRouter::new(cache.clone(), resolver.clone(), emitter.clone()));
        let (done, _) = watch::channel(false);

        Ok(Client {
            inner: Arc::new(Inner {
                id: Uuid::new_v4(),
                cdn: Cdn::new(config.app.cdn_url.clone()),
                config,
                cache,
                rest,
                resolver,
                emitter,
                router,
                state: Mutex::new(ClientState::Idle),
                gateway: Mutex::new(None),
                done,
                exit_error: Mutex::new(None),
            }),
        })
    }
}

pub(crate) struct Inner {
    id: Uuid,
    config: ClientConfig,
    cdn: Cdn,
    pub(crate) cache: Arc<EntityCache>,
    pub(crate) rest: RestClient,
    pub(crate) resolver: RestResolver,
    emitter: Arc<EventEmitter>,
    router: Arc<EventRouter>,
    state: Mutex<ClientState>,
    gateway: Mutex<Option<GatewayHandle>>,
    /// Flips once every task has finished
    done: watch::Sender<bool>,
    exit_error: Mutex<Option<GatewayError>>,
}

impl Inner {
    /// Runs once the gateway task has ended and the router has drained
    fn finish(&self, result: Result<(), GatewayError>) {
        self.rest.shutdown();
        *self.state.lock() = ClientState::Terminated;
        match result {
            Ok(()) => tracing::info!("Client stopped"),
            Err(err) => {
                tracing::error!(error = %err, "Client terminated");
                *self.exit_error.lock() = Some(err);
            }
        }
        self.done.send_replace(true);
    }
}

/// Chat platform client
#[derive(Clone)]
pub struct Client {
    pub(crate) inner: Arc<Inner>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        ClientBuilder::new(config).build()
    }

    #[must_use]
    pub fn builder(config: ClientConfig) -> ClientBuilder {
        ClientBuilder::new(config)
    }

    /// Client configured from environment variables
    pub fn from_env() -> Result<Self, ClientError> {
        Self::new(ClientConfig::from_env()?)
    }

    /// Instance id, recorded on every log line this client emits
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn cache(&self) -> &EntityCache {
        &self.inner.cache
    }

    pub fn rest(&self) -> &RestClient {
        &self.inner.rest
    }

    pub fn cdn(&self) -> &Cdn {
        &self.inner.cdn
    }

    /// Register an event callback
    pub fn on<F>(&self, handler: F)
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.inner.emitter.on(handler);
    }

    /// Receive events on a channel
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.inner.emitter.subscribe()
    }

    /// The connected user, once `READY` has been processed
    pub fn current_user(&self) -> Option<Cached<User>> {
        self.inner
            .router
            .current_user()
            .and_then(|id| self.inner.cache.get::<User>(id))
    }

    pub fn state(&self) -> ClientState {
        *self.inner.state.lock()
    }

    /// Control handle of the gateway connection, once started
    pub fn gateway(&self) -> Option<GatewayHandle> {
        self.inner.gateway.lock().clone()
    }

    pub fn gateway_status(&self) -> Option<ConnectionStatus> {
        self.gateway().map(|gateway| gateway.status())
    }

    pub fn router_stats(&self) -> RouterStats {
        self.inner.router.stats()
    }

    /// Connect to the gateway and start routing events.
    ///
    /// Returns once the connection task is running; use
    /// [`wait_until_ready`](Self::wait_until_ready) to wait for the session.
    pub async fn start(&self) -> Result<(), ClientError> {
        {
            let mut state = self.inner.state.lock();
            match *state {
                ClientState::Running => return Err(ClientError::AlreadyStarted),
                ClientState::Terminated => return Err(ClientError::Terminated),
                ClientState::Idle => *state = ClientState::Running,
            }
        }

        let span = tracing::info_span!("client", id = %self.inner.id);
        let discovered = self.gateway_url().instrument(span.clone()).await;

        // `stop` shuts REST down under the state lock, so checking it here
        // decides whether the stop or this start owns the outcome
        let (connection, dispatches) = {
            let mut state = self.inner.state.lock();
            if self.inner.rest.is_shutdown() {
                *state = ClientState::Terminated;
                drop(state);
                tracing::info!(id = %self.inner.id, "Client stopped while starting");
                self.inner.done.send_replace(true);
                return Err(ClientError::Terminated);
            }
            let url = match discovered {
                Ok(url) => url,
                Err(err) => {
                    *state = ClientState::Idle;
                    return Err(err);
                }
            };
            let options =
                GatewayOptions::from_config(&self.inner.config.gateway, url, self.inner.config.token.clone());
            let (connection, handle, dispatches) = GatewayConnection::new(options);
            *self.inner.gateway.lock() = Some(handle);
            (connection, dispatches)
        };

        let router = tokio::spawn(self.inner.router.clone().run(dispatches).instrument(span.clone()));
        let inner = self.inner.clone();
        tokio::spawn(
            async move {
                let result = connection.run().await;
                if let Err(err) = router.await {
                    tracing::error!(error = %err, "Router task failed");
                }
                inner.finish(result);
            }
            .instrument(span),
        );

        tracing::info!(id = %self.inner.id, "Client started");
        Ok(())
    }

    /// Wait until the gateway session is ready
    ///
    /// # Errors
    /// `NotStarted` before [`start`](Self::start), `Terminated` if the
    /// connection ends first
    pub async fn wait_until_ready(&self) -> Result<(), ClientError> {
        let Some(gateway) = self.gateway() else {
            return Err(ClientError::NotStarted);
        };
        let mut status = gateway.subscribe_status();
        let reached = status
            .wait_for(|s| matches!(s, ConnectionStatus::Ready | ConnectionStatus::Terminated))
            .await
            .map_or(ConnectionStatus::Terminated, |s| *s);
        if reached == ConnectionStatus::Ready {
            Ok(())
        } else {
            Err(ClientError::Terminated)
        }
    }

    /// Wait for the client to terminate.
    ///
    /// The error that ended the connection is returned to the first caller.
    pub async fn wait(&self) -> Result<(), ClientError> {
        if self.state() == ClientState::Idle {
            return Err(ClientError::NotStarted);
        }
        let mut done = self.inner.done.subscribe();
        let _ = done.wait_for(|done| *done).await;
        match self.inner.exit_error.lock().take() {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }

    /// Close the gateway, cancel queued REST calls, and wait for every task
    /// to finish. The client cannot be started again.
    ///
    /// A stop that overlaps [`start`](Self::start) waits for the start to
    /// give up.
    pub async fn stop(&self) {
        let gateway = {
            let mut state = self.inner.state.lock();
            self.inner.rest.shutdown();
            if *state == ClientState::Idle {
                *state = ClientState::Terminated;
                drop(state);
                self.inner.done.send_replace(true);
                return;
            }
            self.inner.gateway.lock().clone()
        };

        if let Some(gateway) = gateway {
            gateway.close();
        }

        let mut done = self.inner.done.subscribe();
        let _ = done.wait_for(|done| *done).await;
    }

    async fn gateway_url(&self) -> Result<String, ClientError> {
        if let Some(url) = &self.inner.config.gateway.url {
            return Ok(url.clone());
        }
        let bot = self.inner.rest.gateway_bot().await?;
        if let Some(limit) = &bot.session_start_limit {
            tracing::info!(
                remaining = limit.remaining,
                total = limit.total,
                reset_after_ms = limit.reset_after,
                "Session start budget"
            );
        }
        tracing::debug!(url = %bot.url, shards = bot.shards, "Gateway discovered");
        Ok(bot.url)
    }
}

//! tonic-backed broker client
//!
//! [`GrpcBroker`] owns one HTTP/2 channel and attaches the session
//! credentials (`accesstoken`, `instanceurl`, `tenantid`) to every call via
//! [`AuthInterceptor`]. Plaintext is used for loopback endpoints; every
//! other endpoint is dialled over TLS with the host as the SNI name.
//!
//! [`GrpcFetchStream`] drives a `Subscribe` call from a spawned pump task so
//! that [`FetchStream::recv`] is cancel-safe under a caller timeout.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tonic::metadata::{Ascii, MetadataValue};
use tonic::service::interceptor::InterceptedService;
use tonic::service::Interceptor;
use tonic::transport::{Channel, ClientTlsConfig, Endpoint, Uri};
use tonic::{Request, Status};
use tracing::{debug, warn};

use super::proto::pub_sub_client::PubSubClient;
use super::proto::{
    FetchRequest, FetchResponse, PublishRequest, PublishResponse, SchemaInfo, SchemaRequest,
    TopicInfo, TopicRequest,
};
use super::{BrokerConnector, FetchStream, PubSubApi};
use crate::auth::AuthSession;
use crate::error::{Error, Result};

/// Metadata key carrying the bearer token.
pub const TOKEN_HEADER: &str = "accesstoken";
/// Metadata key carrying the instance URL the token is bound to.
pub const INSTANCE_URL_HEADER: &str = "instanceurl";
/// Metadata key carrying the organization id.
pub const TENANT_ID_HEADER: &str = "tenantid";

/// Largest response message accepted from the broker.
const MAX_DECODING_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Depth of the request and response queues of one subscription stream.
const STREAM_BUFFER: usize = 16;

/// Attaches session credentials to outgoing requests.
#[derive(Clone)]
pub struct AuthInterceptor {
    access_token: MetadataValue<Ascii>,
    instance_url: MetadataValue<Ascii>,
    tenant_id: MetadataValue<Ascii>,
}

impl AuthInterceptor {
    /// Builds an interceptor from an established session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Auth`] if a session value is not valid ASCII
    /// metadata.
    pub fn new(session: &AuthSession) -> Result<Self> {
        Ok(Self {
            access_token: metadata_value(TOKEN_HEADER, &session.token().access_token)?,
            instance_url: metadata_value(INSTANCE_URL_HEADER, &session.token().instance_url)?,
            tenant_id: metadata_value(TENANT_ID_HEADER, &session.identity().organization_id)?,
        })
    }
}

impl Interceptor for AuthInterceptor {
    fn call(&mut self, mut request: Request<()>) -> std::result::Result<Request<()>, Status> {
        let metadata = request.metadata_mut();
        metadata.insert(TOKEN_HEADER, self.access_token.clone());
        metadata.insert(INSTANCE_URL_HEADER, self.instance_url.clone());
        metadata.insert(TENANT_ID_HEADER, self.tenant_id.clone());
        Ok(request)
    }
}

impl fmt::Debug for AuthInterceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthInterceptor")
            .field("access_token", &"***")
            .field("instance_url", &self.instance_url)
            .field("tenant_id", &self.tenant_id)
            .finish()
    }
}

fn metadata_value(key: &str, value: &str) -> Result<MetadataValue<Ascii>> {
    value
        .parse()
        .map_err(|_| Error::Auth(format!("session value for {key} is not valid metadata")))
}

type AuthedChannel = InterceptedService<Channel, AuthInterceptor>;

/// Broker client over a single authenticated channel.
#[derive(Clone)]
pub struct GrpcBroker {
    client: PubSubClient<AuthedChannel>,
    endpoint: String,
}

impl GrpcBroker {
    /// Dials the broker and binds the session credentials to the channel.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for a malformed endpoint,
    /// [`Error::Auth`] for unusable session values, and
    /// [`Error::Transport`] if the channel cannot be established within
    /// `connect_timeout`.
    pub async fn connect(
        endpoint: &str,
        session: &AuthSession,
        connect_timeout: Duration,
    ) -> Result<Self> {
        let interceptor = AuthInterceptor::new(session)?;
        let channel = open_channel(endpoint, connect_timeout).await?;
        let client = PubSubClient::with_interceptor(channel, interceptor)
            .max_decoding_message_size(MAX_DECODING_MESSAGE_SIZE);

        debug!(endpoint = %endpoint, "Connected to broker");
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }
}

impl fmt::Debug for GrpcBroker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GrpcBroker")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

/// Dials [`GrpcBroker`]s at a fixed endpoint.
#[derive(Debug, Clone)]
pub struct GrpcConnector {
    endpoint: String,
    connect_timeout: Duration,
}

impl GrpcConnector {
    pub fn new(endpoint: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.into(),
            connect_timeout,
        }
    }
}

#[async_trait::async_trait]
impl BrokerConnector for GrpcConnector {
    async fn connect(&self, session: &AuthSession) -> Result<Arc<dyn PubSubApi>> {
        let broker = GrpcBroker::connect(&self.endpoint, session, self.connect_timeout).await?;
        Ok(Arc::new(broker))
    }
}

/// Returns the URI to dial for `endpoint`.
///
/// A bare `host:port` gets `http://` when the host is loopback and
/// `https://` otherwise. An explicit scheme is kept as given.
pub(crate) fn endpoint_uri(endpoint: &str) -> String {
    if endpoint.contains("://") {
        return endpoint.to_string();
    }
    let host = endpoint.rsplit_once(':').map_or(endpoint, |(host, _)| host);
    if is_loopback(host) {
        format!("http://{endpoint}")
    } else {
        format!("https://{endpoint}")
    }
}

fn is_loopback(host: &str) -> bool {
    matches!(host, "localhost" | "127.0.0.1" | "[::1]" | "::1")
}

async fn open_channel(endpoint: &str, connect_timeout: Duration) -> Result<Channel> {
    let uri_str = endpoint_uri(endpoint);
    let uri: Uri = uri_str
        .parse()
        .map_err(|e| Error::Config(format!("invalid broker endpoint {endpoint}: {e}")))?;

    let mut builder = Endpoint::from(uri.clone()).connect_timeout(connect_timeout);
    if uri.scheme_str() == Some("https") {
        let host = uri.host().unwrap_or_default().to_string();
        builder = builder.tls_config(ClientTlsConfig::new().domain_name(host))?;
    } else {
        warn!(endpoint = %endpoint, "Using plaintext connection to broker");
    }

    Ok(builder.connect().await?)
}

/// Bounds a unary call by `timeout`.
async fn bounded<T, F>(timeout: Duration, call: F) -> Result<T>
where
    F: std::future::Future<Output = std::result::Result<tonic::Response<T>, Status>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(Ok(response)) => Ok(response.into_inner()),
        Ok(Err(status)) => Err(status.into()),
        Err(_) => Err(Error::Timeout(timeout)),
    }
}

#[async_trait::async_trait]
impl PubSubApi for GrpcBroker {
    async fn get_topic(&self, topic_name: &str, timeout: Duration) -> Result<TopicInfo> {
        let mut client = self.client.clone();
        let request = TopicRequest {
            topic_name: topic_name.to_string(),
        };
        bounded(timeout, client.get_topic(request)).await
    }

    async fn get_schema(&self, schema_id: &str, timeout: Duration) -> Result<SchemaInfo> {
        let mut client = self.client.clone();
        let request = SchemaRequest {
            schema_id: schema_id.to_string(),
        };
        bounded(timeout, client.get_schema(request)).await
    }

    async fn publish(
        &self,
        request: PublishRequest,
        timeout: Duration,
    ) -> Result<PublishResponse> {
        let mut client = self.client.clone();
        bounded(timeout, client.publish(request)).await
    }

    async fn subscribe(&self) -> Result<Box<dyn FetchStream>> {
        Ok(Box::new(GrpcFetchStream::open(self.client.clone())))
    }
}

/// One `Subscribe` call.
///
/// Requests flow through a bounded queue into the call; responses are
/// pumped into a second queue by a background task which is aborted when
/// the stream is dropped.
pub struct GrpcFetchStream {
    requests: Option<mpsc::Sender<FetchRequest>>,
    responses: mpsc::Receiver<std::result::Result<FetchResponse, Status>>,
    pump: JoinHandle<()>,
}

impl GrpcFetchStream {
    fn open(mut client: PubSubClient<AuthedChannel>) -> Self {
        let (request_tx, request_rx) = mpsc::channel(STREAM_BUFFER);
        let (response_tx, response_rx) = mpsc::channel(STREAM_BUFFER);

        let pump = tokio::spawn(async move {
            let mut inbound = match client.subscribe(ReceiverStream::new(request_rx)).await {
                Ok(response) => response.into_inner(),
                Err(status) => {
                    let _ = response_tx.send(Err(status)).await;
                    return;
                }
            };

            loop {
                match inbound.message().await {
                    Ok(Some(message)) => {
                        if response_tx.send(Ok(message)).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        debug!("Subscription stream closed by server");
                        break;
                    }
                    Err(status) => {
                        let _ = response_tx.send(Err(status)).await;
                        break;
                    }
                }
            }
        });

        Self {
            requests: Some(request_tx),
            responses: response_rx,
            pump,
        }
    }
}

#[async_trait::async_trait]
impl FetchStream for GrpcFetchStream {
    async fn send(&mut self, request: FetchRequest) -> Result<()> {
        let Some(requests) = self.requests.as_ref() else {
            return Err(Error::Transport("request side already closed".to_string()));
        };
        if requests.send(request).await.is_err() {
            // The call has ended; recv reports how.
            debug!("Fetch request dropped on terminated stream");
        }
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<FetchResponse>> {
        match self.responses.recv().await {
            Some(Ok(response)) => Ok(Some(response)),
            Some(Err(status)) => Err(status.into()),
            None => Ok(None),
        }
    }

    async fn close_send(&mut self) -> Result<()> {
        self.requests.take();
        Ok(())
    }
}

impl Drop for GrpcFetchStream {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

impl fmt::Debug for GrpcFetchStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GrpcFetchStream")
            .field("send_open", &self.requests.is_some())
            .finish_non_exhaustive()
    }
}

//! Proxies to objects exposed on the other side of an endpoint

use crate::channel::Port;
use crate::codec::{Codec, Transfers};
use crate::correlation::Correlator;
use crate::endpoint::{Endpoint, Envelope};
use crate::registry::Registry;
use crate::value::Value;
use crate::{ProxyError, Result};
use futures::future::BoxFuture;
use std::fmt;
use std::future::IntoFuture;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tether_proto::{Message, Request, WireValue};
use tracing::debug;

/// Create a proxy for the object exposed on the far side of `endpoint`
pub fn wrap<E: Endpoint + 'static>(endpoint: E) -> Remote {
    Wrap::new(endpoint).build()
}

/// Builder for root proxies
pub struct Wrap {
    endpoint: Arc<dyn Endpoint>,
    codec: Codec,
    request_timeout: Option<Duration>,
}

impl Wrap {
    /// Wrap `endpoint`
    pub fn new<E: Endpoint + 'static>(endpoint: E) -> Self {
        Self::from_arc(Arc::new(endpoint))
    }

    /// Wrap a shared endpoint
    pub fn from_arc(endpoint: Arc<dyn Endpoint>) -> Self {
        Self {
            endpoint,
            codec: Codec::default(),
            request_timeout: None,
        }
    }

    /// Use a codec with a custom handler registry
    pub fn with_codec(mut self, codec: Codec) -> Self {
        self.codec = codec;
        self
    }

    /// Shorthand for a codec over `registry`
    pub fn with_registry(self, registry: Registry) -> Self {
        self.with_codec(Codec::new(registry))
    }

    /// Fail requests that get no response within `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Build the root proxy
    pub fn build(self) -> Remote {
        Remote {
            link: Arc::new(Link {
                correlator: Correlator::new(self.endpoint),
                codec: self.codec,
                request_timeout: self.request_timeout,
                released: AtomicBool::new(false),
            }),
            path: Vec::new(),
        }
    }
}

/// State shared by every proxy derived from one root
struct Link {
    correlator: Correlator,
    codec: Codec,
    request_timeout: Option<Duration>,
    released: AtomicBool,
}

/// A lazily-built reference to a property path on a remote object.
///
/// Property access ([`Remote::get`]) only extends the path; messages are
/// sent when the proxy is awaited, assigned through, called, constructed,
/// or released. Every proxy derived from one root shares that root's
/// connection.
///
/// Release is tracked per connection, not per proxy: releasing any proxy
/// derived from a root makes the root and all of its other derived proxies
/// fail with [`ProxyError::Released`] too. The exposing side tears down the
/// whole connection on RELEASE, so a sibling proxy could never be answered
/// afterwards anyway.
#[derive(Clone)]
pub struct Remote {
    link: Arc<Link>,
    path: Vec<String>,
}

impl Remote {
    /// Property path this proxy addresses
    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Proxy for property `name` of this one. Sends nothing.
    pub fn get(&self, name: impl Into<String>) -> Remote {
        Remote {
            link: self.link.clone(),
            path: self.child_path(name),
        }
    }

    /// Whether the connection was released
    pub fn is_released(&self) -> bool {
        self.link.released.load(Ordering::Acquire)
    }

    /// Read the value at this path.
    ///
    /// The root proxy resolves to itself without any traffic, so a root
    /// proxy can be awaited like any other.
    pub async fn value(&self) -> Result<Value> {
        self.ensure_live()?;
        if self.path.is_empty() {
            return Ok(Value::Remote(self.clone()));
        }
        self.round_trip(Request::get(self.path.clone()), Vec::new()).await
    }

    /// Assign property `name` under this path. Resolves to the remote's
    /// acknowledgement once the assignment happened.
    pub async fn set(&self, name: impl Into<String>, value: impl Into<Value>) -> Result<Value> {
        self.ensure_live()?;
        let (wire, ports) = self.link.codec.encode(value.into())?;
        self.round_trip(Request::set(self.child_path(name), wire), ports).await
    }

    /// Call the function at this path; its parent is the receiver
    pub async fn call<I>(&self, args: I) -> Result<Value>
    where
        I: IntoIterator<Item = Value>,
    {
        self.ensure_live()?;
        let (wires, ports) = self.link.codec.encode_args(args)?;
        self.round_trip(Request::apply(self.path.clone(), wires), ports).await
    }

    /// Construct an instance of the class at this path. The instance comes
    /// back as a proxy.
    pub async fn construct<I>(&self, args: I) -> Result<Value>
    where
        I: IntoIterator<Item = Value>,
    {
        self.ensure_live()?;
        let (wires, ports) = self.link.codec.encode_args(args)?;
        self.round_trip(Request::construct(self.path.clone(), wires), ports).await
    }

    /// Same proxy, for calling a method detached from its access; the
    /// receiver is still the parent at the remote side. Sends nothing.
    pub fn bind(&self) -> Result<Remote> {
        self.ensure_live()?;
        Ok(self.clone())
    }

    /// Ask the remote for a fresh port serving the same root object
    pub async fn create_endpoint(&self) -> Result<Port> {
        self.ensure_live()?;
        match self.round_trip(Request::endpoint(), Vec::new()).await? {
            Value::Port(port) => Ok(port),
            other => Err(ProxyError::UnexpectedReply(format!(
                "expected a port, got {}",
                other.kind()
            ))),
        }
    }

    /// Release the remote object.
    ///
    /// Waits for the remote to acknowledge, then marks the connection
    /// released; releasing the root also closes the endpoint.
    pub async fn release(&self) -> Result<()> {
        self.ensure_live()?;
        self.round_trip(Request::release(self.path.clone()), Vec::new()).await?;

        if self.path.is_empty() {
            self.link.correlator.endpoint().close();
        }
        self.link.released.store(true, Ordering::Release);
        debug!(path = ?self.path, "proxy released");
        Ok(())
    }

    fn child_path(&self, name: impl Into<String>) -> Vec<String> {
        let mut path = self.path.clone();
        path.push(name.into());
        path
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_released() {
            return Err(ProxyError::Released);
        }
        Ok(())
    }

    async fn round_trip(&self, request: Request, ports: Vec<Port>) -> Result<Value> {
        let Envelope { message, transfer } = self
            .link
            .correlator
            .request(request, ports, self.link.request_timeout)
            .await?;

        let wire: WireValue = match message {
            Message::Response(response) => response.value,
            Message::Request(request) => {
                return Err(ProxyError::UnexpectedReply(format!(
                    "{} request in place of a response",
                    request.kind()
                )))
            }
        };

        let mut transfers = Transfers::new(transfer);
        self.link.codec.decode(wire, &mut transfers)
    }
}

impl IntoFuture for Remote {
    type Output = Result<Value>;
    type IntoFuture = BoxFuture<'static, Result<Value>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move { self.value().await })
    }
}

impl fmt::Debug for Remote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Remote")
            .field("path", &self.path)
            .field("released", &self.is_released())
            .finish()
    }
}

#[cfg(test)]
mod tests;

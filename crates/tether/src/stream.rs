//! Endpoint over a pair of async byte streams

use crate::channel::Port;
use crate::endpoint::{Endpoint, Envelope, Listener, ListenerId, ListenerSet};
use crate::{ProxyError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tether_proto::{Frame, FrameCodec, Message, ProtocolError};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Endpoint that frames messages onto a byte stream, such as a child
/// process's stdio or a socket.
///
/// Byte streams cannot move ports, so posting with a non-empty transfer
/// list fails. Closing sends a CLOSE frame and shuts the writer down.
#[derive(Clone)]
pub struct StreamEndpoint {
    inner: Arc<StreamInner>,
}

struct StreamInner {
    frames: mpsc::UnboundedSender<Frame>,
    reader: Mutex<Option<BoxedReader>>,
    listeners: Arc<ListenerSet>,
    closed: Arc<watch::Sender<bool>>,
    read_task: Mutex<Option<JoinHandle<()>>>,
    write_task: Mutex<Option<JoinHandle<()>>>,
    close_sent: AtomicBool,
    max_frame_size: usize,
    // Size checks only; never reads
    sizer: FrameCodec,
}

impl StreamEndpoint {
    /// Endpoint over `reader` and `writer`; spawns the writer task immediately
    pub fn new<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self::with_max_frame_size(reader, writer, tether_proto::codec::MAX_FRAME_SIZE)
    }

    /// Endpoint with a custom frame size limit
    pub fn with_max_frame_size<R, W>(reader: R, writer: W, max_frame_size: usize) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (frames, frame_rx) = mpsc::unbounded_channel();
        let write_task = tokio::spawn(write_frames(writer, frame_rx, max_frame_size));
        let reader: BoxedReader = Box::new(reader);

        Self {
            inner: Arc::new(StreamInner {
                frames,
                reader: Mutex::new(Some(reader)),
                listeners: Arc::new(ListenerSet::new()),
                closed: Arc::new(watch::channel(false).0),
                read_task: Mutex::new(None),
                write_task: Mutex::new(Some(write_task)),
                close_sent: AtomicBool::new(false),
                max_frame_size,
                sizer: FrameCodec::with_max_frame_size(max_frame_size),
            }),
        }
    }

    /// Endpoint over this process's stdin and stdout
    pub fn stdio() -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout())
    }

    /// Whether the stream has stopped carrying messages
    pub fn is_closed(&self) -> bool {
        *self.inner.closed.borrow()
    }

    /// Wait until the stream closes, from either side
    pub async fn closed(&self) {
        let mut rx = self.inner.closed.subscribe();
        // The sender lives in `self`, so this cannot fail while we wait
        let _ = rx.wait_for(|closed| *closed).await;
    }

    /// Close, then wait until every queued frame has been written
    pub async fn shutdown(&self) {
        self.close();
        let writer = self.inner.write_task.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(writer) = writer {
            if let Err(e) = writer.await {
                warn!("Writer task failed: {}", e);
            }
        }
    }
}

async fn write_frames<W>(mut writer: W, mut frames: mpsc::UnboundedReceiver<Frame>, max_frame_size: usize)
where
    W: AsyncWrite + Send + Unpin,
{
    let codec = FrameCodec::with_max_frame_size(max_frame_size);

    while let Some(frame) = frames.recv().await {
        let closing = frame.is_close();
        if let Err(e) = codec.write_frame(&mut writer, &frame).await {
            error!("Failed to write frame: {}", e);
            if !matches!(e, ProtocolError::FrameTooLarge { .. }) {
                break;
            }
        }
        if closing {
            break;
        }
    }

    if let Err(e) = writer.shutdown().await {
        debug!("Writer shutdown: {}", e);
    }
}

async fn read_frames(
    mut reader: BoxedReader,
    listeners: Arc<ListenerSet>,
    closed: Arc<watch::Sender<bool>>,
    max_frame_size: usize,
) {
    let mut codec = FrameCodec::with_max_frame_size(max_frame_size);

    loop {
        match codec.read_frame(&mut reader).await {
            Ok(Some(frame)) if frame.is_close() => {
                debug!("Peer closed the stream");
                break;
            }
            Ok(Some(frame)) => match frame.to_message() {
                Ok(message) => listeners.dispatch(Envelope::new(message)),
                Err(e) => warn!("Dropping undecodable message: {}", e),
            },
            Ok(None) => {
                debug!("Stream reached EOF");
                break;
            }
            Err(e) => {
                // Framing is lost; there is no way to resynchronize
                error!("Failed to read frame: {}", e);
                break;
            }
        }
    }

    closed.send_replace(true);
}

impl Endpoint for StreamEndpoint {
    fn post_message(&self, message: Message, transfer: Vec<Port>) -> Result<()> {
        if self.is_closed() {
            return Err(ProxyError::EndpointClosed);
        }
        if !transfer.is_empty() {
            return Err(ProtocolError::TransferUnsupported.into());
        }

        // The limit covers the encoded frame, so check it the way the writer will
        let frame = Frame::message(&message)?;
        self.inner.sizer.encode_frame(&frame)?;

        self.inner
            .frames
            .send(frame)
            .map_err(|_| ProxyError::EndpointClosed)
    }

    fn add_listener(&self, listener: Listener) -> ListenerId {
        self.inner.listeners.add(listener)
    }

    fn remove_listener(&self, id: ListenerId) {
        self.inner.listeners.remove(id);
    }

    fn start(&self) {
        if self.is_closed() {
            return;
        }
        let Some(reader) = self.inner.reader.lock().unwrap_or_else(PoisonError::into_inner).take() else {
            return;
        };

        let task = tokio::spawn(read_frames(
            reader,
            self.inner.listeners.clone(),
            self.inner.closed.clone(),
            self.inner.max_frame_size,
        ));
        *self.inner.read_task.lock().unwrap_or_else(PoisonError::into_inner) = Some(task);
    }

    fn close(&self) {
        // A peer hangup marks the stream closed but still leaves the writer to stop
        if self.inner.close_sent.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!("Closing stream endpoint");

        let _ = self.inner.frames.send(Frame::close());
        self.inner.closed.send_replace(true);

        if let Some(task) = self.inner.read_task.lock().unwrap_or_else(PoisonError::into_inner).take() {
            task.abort();
        }
        self.inner.reader.lock().unwrap_or_else(PoisonError::into_inner).take();
        self.inner.listeners.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::MessageChannel;
    use std::time::Duration;
    use tether_proto::{Request, Response, WireValue};
    use tokio::io::{duplex, split, AsyncReadExt};
    use tokio::time::timeout;

    fn pair() -> (StreamEndpoint, StreamEndpoint) {
        let (left, right) = duplex(64 * 1024);
        let (left_read, left_write) = split(left);
        let (right_read, right_write) = split(right);
        (
            StreamEndpoint::new(left_read, left_write),
            StreamEndpoint::new(right_read, right_write),
        )
    }

    fn collect(endpoint: &StreamEndpoint) -> mpsc::UnboundedReceiver<Envelope> {
        let (tx, rx) = mpsc::unbounded_channel();
        endpoint.add_listener(Arc::new(move |envelope: Envelope| {
            let _ = tx.send(envelope);
        }));
        rx
    }

    #[tokio::test]
    async fn test_messages_cross_the_stream() {
        let (left, right) = pair();
        let mut received = collect(&right);
        right.start();

        let request = Request::get(vec!["greet".into()]);
        let id = request.id().unwrap();
        left.post_message(Message::request(request), vec![]).unwrap();

        let envelope = timeout(Duration::from_secs(1), received.recv()).await.unwrap().unwrap();
        assert_eq!(envelope.message.request_id(), Some(id));
        assert!(envelope.transfer.is_empty());
    }

    #[tokio::test]
    async fn test_transfers_are_rejected() {
        let (left, _right) = pair();
        let port = MessageChannel::new().port1;
        let message = Message::response(Response::new(uuid::Uuid::new_v4(), WireValue::port(port.id())));

        let result = left.post_message(message, vec![port]);
        assert!(matches!(
            result,
            Err(ProxyError::Protocol(ProtocolError::TransferUnsupported))
        ));
    }

    #[tokio::test]
    async fn test_frame_limit_counts_the_whole_frame() {
        let message = Message::response(Response::new(
            uuid::Uuid::new_v4(),
            WireValue::data(serde_json::json!("x".repeat(200))),
        ));
        // Payload fits exactly; the frame wrapping it does not
        let payload = Frame::message(&message).unwrap().payload.len();
        let (left, _right) = duplex(64 * 1024);
        let (read, write) = split(left);
        let endpoint = StreamEndpoint::with_max_frame_size(read, write, payload);

        let result = endpoint.post_message(message, vec![]);
        assert!(matches!(
            result,
            Err(ProxyError::Protocol(ProtocolError::FrameTooLarge { .. }))
        ));
    }

    #[tokio::test]
    async fn test_close_reaches_the_peer() {
        let (left, right) = pair();
        right.start();

        left.close();
        assert!(left.is_closed());
        assert!(matches!(
            left.post_message(Message::request(Request::endpoint()), vec![]),
            Err(ProxyError::EndpointClosed)
        ));

        timeout(Duration::from_secs(1), right.closed()).await.unwrap();
        assert!(right.is_closed());
    }

    #[tokio::test]
    async fn test_shutdown_flushes_queued_frames() {
        let (left, right) = pair();
        let mut received = collect(&right);
        right.start();

        left.post_message(Message::request(Request::get(vec![])), vec![]).unwrap();
        timeout(Duration::from_secs(1), left.shutdown()).await.unwrap();

        assert!(timeout(Duration::from_secs(1), received.recv()).await.unwrap().is_some());
        timeout(Duration::from_secs(1), right.closed()).await.unwrap();
    }

    #[tokio::test]
    async fn test_undecodable_frames_are_skipped() {
        let (raw, stream) = duplex(4096);
        let (stream_read, stream_write) = split(stream);
        let endpoint = StreamEndpoint::new(stream_read, stream_write);
        let mut received = collect(&endpoint);
        endpoint.start();

        let (mut raw_read, mut raw_write) = split(raw);
        let codec = FrameCodec::new();
        let garbage = Frame {
            flags: tether_proto::FrameFlags::NONE,
            payload: vec![0xc1].into(),
        };
        codec.write_frame(&mut raw_write, &garbage).await.unwrap();
        let good = Message::request(Request::release(vec![]));
        codec
            .write_frame(&mut raw_write, &Frame::message(&good).unwrap())
            .await
            .unwrap();

        let envelope = timeout(Duration::from_secs(1), received.recv()).await.unwrap().unwrap();
        assert_eq!(envelope.message, good);

        // Nothing was written back
        endpoint.close();
        let mut echoed = Vec::new();
        let mut reader = FrameCodec::new();
        let frame = reader.read_frame(&mut raw_read).await.unwrap().unwrap();
        assert!(frame.is_close());
        raw_read.read_to_end(&mut echoed).await.unwrap();
        assert!(echoed.is_empty());
    }
}

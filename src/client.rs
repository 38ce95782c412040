//! Outbound connection.
//!
//! A [`Client`] is a session seen from the dialing side: it goes from
//! `Connecting` to `Established` when the stream connects, writes through
//! its own writer task, and reads frames on demand with [`Client::recv`].
//!
//! # Example
//!
//! ```no_run
//! use bytes::Bytes;
//! use framecast::{Client, SessionConfig};
//!
//! # async fn demo() -> framecast::error::Result<()> {
//! let mut client = Client::connect(&"127.0.0.1:7000".parse()?, SessionConfig::default()).await?;
//! client.send(Bytes::from_static(b"hello")).await?;
//!
//! while let Some(payload) = client.recv().await? {
//!     println!("{} bytes", payload.len());
//! }
//! # Ok(())
//! # }
//! ```

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf};
use tokio::task::JoinHandle;

use crate::codec::MsgPackCodec;
use crate::error::{FramecastError, Result};
use crate::session::{SessionConfig, SessionState};
use crate::transport::{Endpoint, FrameReader, Stream};
use crate::writer::{spawn_writer_task, WriterHandle};

/// A connected peer.
pub struct Client<S = Stream> {
    reader: FrameReader<ReadHalf<S>>,
    writer: WriterHandle,
    writer_task: JoinHandle<Result<()>>,
    state: SessionState,
}

impl Client<Stream> {
    /// Connect to `endpoint`.
    pub async fn connect(endpoint: &Endpoint, config: SessionConfig) -> Result<Self> {
        tracing::debug!(endpoint = %endpoint, state = %SessionState::Connecting, "dialing");
        let stream = Stream::connect(endpoint).await?;
        tracing::debug!(endpoint = %endpoint, "connected");
        Ok(Self::from_stream(stream, &config))
    }
}

impl<S> Client<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Wrap an already connected (and negotiated) stream.
    pub fn from_stream(stream: S, config: &SessionConfig) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);
        let (writer, writer_task) =
            spawn_writer_task(write_half, config.writer.clone(), config.framing.byte_order);

        Self {
            reader: FrameReader::with_capacity(read_half, config.framing, config.read_buffer_size),
            writer,
            writer_task,
            state: SessionState::Established,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Send one frame, waiting for queue space up to the backpressure timeout.
    pub async fn send(&self, payload: Bytes) -> Result<()> {
        if self.state == SessionState::Closed {
            return Err(FramecastError::ConnectionClosed);
        }
        self.writer.send(payload).await
    }

    /// Encode `value` as MsgPack and send it.
    pub async fn send_encoded<T: Serialize>(&self, value: &T) -> Result<()> {
        self.send(MsgPackCodec::encode_bytes(value)?).await
    }

    /// Next frame from the server, or `Ok(None)` once it disconnects.
    ///
    /// Cancel safe, so it can sit in a `tokio::select!` next to other input.
    pub async fn recv(&mut self) -> Result<Option<Bytes>> {
        if self.state == SessionState::Closed {
            return Ok(None);
        }
        self.state = SessionState::Reading;

        match self.reader.next_frame().await {
            Ok(Some(frame)) => Ok(Some(frame.into_payload())),
            Ok(None) => {
                self.state = SessionState::Closed;
                Ok(None)
            }
            Err(e) => {
                self.state = SessionState::Closed;
                Err(e)
            }
        }
    }

    /// Receive and decode a MsgPack frame.
    pub async fn recv_decoded<T: DeserializeOwned>(&mut self) -> Result<Option<T>> {
        match self.recv().await? {
            Some(payload) => MsgPackCodec::decode(&payload).map(Some),
            None => Ok(None),
        }
    }

    /// A handle for sending from another task.
    pub fn sender(&self) -> WriterHandle {
        self.writer.clone()
    }

    /// Flush queued frames and shut down the write side.
    ///
    /// Waits for the writer task; handles returned by [`Client::sender`] keep
    /// it alive until they are dropped too.
    pub async fn close(self) -> Result<()> {
        let Client {
            reader,
            writer,
            writer_task,
            ..
        } = self;
        drop(writer);

        let result = match writer_task.await {
            Ok(result) => result,
            Err(e) => Err(FramecastError::Io(std::io::Error::other(e))),
        };
        drop(reader);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::FramingConfig;
    use crate::transport::{receive_frame, send_frame};

    #[tokio::test]
    async fn test_send_and_recv_over_duplex() {
        let (near, mut far) = tokio::io::duplex(1024);
        let mut client = Client::from_stream(near, &SessionConfig::default());
        assert_eq!(client.state(), SessionState::Established);

        client.send(Bytes::from_static(b"up")).await.unwrap();
        let framing = FramingConfig::default();
        let got = receive_frame(&mut far, &framing).await.unwrap().unwrap();
        assert_eq!(&got[..], b"up");

        send_frame(&mut far, b"down", &framing).await.unwrap();
        let got = client.recv().await.unwrap().unwrap();
        assert_eq!(&got[..], b"down");
        assert_eq!(client.state(), SessionState::Reading);

        drop(far);
        assert!(client.recv().await.unwrap().is_none());
        assert_eq!(client.state(), SessionState::Closed);
        assert!(matches!(
            client.send(Bytes::new()).await,
            Err(FramecastError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_close_flushes_and_sends_eof() {
        let (near, mut far) = tokio::io::duplex(1024);
        let client = Client::from_stream(near, &SessionConfig::default());

        client.send_encoded(&"bye").await.unwrap();
        client.close().await.unwrap();

        let framing = FramingConfig::default();
        let payload = receive_frame(&mut far, &framing).await.unwrap().unwrap();
        let text: String = MsgPackCodec::decode(&payload).unwrap();
        assert_eq!(text, "bye");
        assert!(receive_frame(&mut far, &framing).await.unwrap().is_none());
    }
}

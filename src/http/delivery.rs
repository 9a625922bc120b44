//! Settling delivered messages once their response has left the process.
//!
//! A `GET /queue/{name}` body parks its [`ClaimedMessage`] on the connection's
//! [`PendingDeliveries`] after the last chunk has been handed to hyper. The
//! connection's [`DeliveryStream`] acknowledges parked claims when a flush of
//! the transport completes. Hyper only flushes the transport after its own
//! write buffer has been drained into it, so a completed flush means the whole
//! response has been written to the socket.
//!
//! A connection that fails or is dropped before that flush drops its parked
//! claims, and dropping a claim releases it back into the queue.

use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use axum::body::{Body, Bytes};
use futures_util::stream;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::observability::metrics;
use crate::storage::ClaimedMessage;

/// Claims whose response has been handed to one connection but not yet
/// flushed to its transport.
#[derive(Debug, Clone, Default)]
pub struct PendingDeliveries {
    parked: Arc<Mutex<Vec<ClaimedMessage>>>,
}

impl PendingDeliveries {
    fn lock(&self) -> MutexGuard<'_, Vec<ClaimedMessage>> {
        self.parked.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn park(&self, message: ClaimedMessage) {
        tracing::trace!(queue = %message.queue(), message_id = %message.id(), "Delivery awaiting flush");
        self.lock().push(message);
    }

    /// Acknowledge everything parked so far.
    fn settle(&self) {
        let delivered = std::mem::take(&mut *self.lock());
        if delivered.is_empty() {
            return;
        }
        tokio::spawn(async move {
            for message in delivered {
                acknowledge(message).await;
            }
        });
    }

    #[cfg(test)]
    pub(crate) fn parked(&self) -> usize {
        self.lock().len()
    }
}

/// Transport wrapper that settles [`PendingDeliveries`] on every completed flush.
#[derive(Debug)]
pub struct DeliveryStream<S> {
    io: S,
    pending: PendingDeliveries,
}

impl<S> DeliveryStream<S> {
    pub fn new(io: S, pending: PendingDeliveries) -> Self {
        Self { io, pending }
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for DeliveryStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().io).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for DeliveryStream<S> {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().io).poll_write(cx, buf)
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().io).poll_write_vectored(cx, bufs)
    }

    fn is_write_vectored(&self) -> bool {
        self.io.is_write_vectored()
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let flushed = Pin::new(&mut this.io).poll_flush(cx);
        if let Poll::Ready(Ok(())) = flushed {
            this.pending.settle();
        }
        flushed
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().io).poll_shutdown(cx)
    }
}

struct Delivery {
    message: ClaimedMessage,
    connection: Option<PendingDeliveries>,
    sent: bool,
}

/// Response body carrying `message`'s payload.
///
/// Once the payload chunk has been taken the claim moves to `connection`.
/// Without one (the router driven in-process) it is acknowledged when the
/// body ends, the last signal available there.
pub(crate) fn body(message: ClaimedMessage, connection: Option<PendingDeliveries>) -> Body {
    let delivery = Delivery {
        message,
        connection,
        sent: false,
    };
    Body::from_stream(stream::unfold(delivery, |mut delivery| async move {
        if !delivery.sent {
            delivery.sent = true;
            let chunk = delivery.message.payload().clone();
            return Some((Ok::<Bytes, io::Error>(chunk), delivery));
        }
        match delivery.connection {
            Some(connection) => connection.park(delivery.message),
            None => acknowledge(delivery.message).await,
        }
        None
    }))
}

async fn acknowledge(message: ClaimedMessage) {
    let queue = message.queue().to_string();
    let id = message.id().to_string();
    match message.acknowledge().await {
        Ok(()) => metrics::record_dequeue(&queue),
        Err(e) => {
            tracing::warn!(queue = %queue, message_id = %id, error = %e, "Failed to delete delivered message");
            metrics::record_storage_error(&queue, "acknowledge");
        }
    }
}

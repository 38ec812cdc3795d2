//! The request/response hand-off between a `SendRequest` handle and the
//! connection task that actually owns the socket.
//!
//! An mpsc `Sender` plus a per-request `oneshot` reply channel, the
//! standard tokio actor pattern: `SendRequest` is just a typed handle to
//! this queue, and the connection's `run` loop is the actor draining it.

use tokio::sync::{mpsc, oneshot};

use http::{Request, Response};

use crate::body::Incoming;
use crate::error::Error;

type Envelope<B> = (Request<B>, oneshot::Sender<Result<Response<Incoming>, Error>>);

pub(crate) struct Sender<B> {
    tx: mpsc::UnboundedSender<Envelope<B>>,
}

impl<B> Clone for Sender<B> {
    fn clone(&self) -> Self {
        Sender {
            tx: self.tx.clone(),
        }
    }
}

impl<B> Sender<B> {
    pub(crate) async fn send_request(&self, req: Request<B>) -> Result<Response<Incoming>, Error> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send((req, reply_tx))
            .map_err(|_| Error::pool_closed())?;
        reply_rx.await.map_err(|_| Error::pool_closed())?
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

pub(crate) struct Receiver<B> {
    rx: mpsc::UnboundedReceiver<Envelope<B>>,
}

impl<B> Receiver<B> {
    pub(crate) async fn recv(
        &mut self,
    ) -> Option<Envelope<B>> {
        self.rx.recv().await
    }
}

pub(crate) fn channel<B>() -> (Sender<B>, Receiver<B>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Sender { tx }, Receiver { rx })
}

//! Transaction and progress notifications.
//!
//! Every subscriber gets its own channel. Events can be consumed as a
//! [`futures::Stream`], pulled one at a time with `next_event`, or fed to a
//! listener object through `dispatch`, which runs the callbacks on the
//! calling task.

use crate::base::neterror::NetError;
use crate::http::transaction::HttpTransaction;
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

/// Milestones of one request/response exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionEvent {
    /// The server certificate needs an explicit decision; answer with
    /// `resume()` or `pause()`. Carries the PEM encoded leaf certificate.
    CertVerificationRequired { certificate: Option<String> },
    /// The engine can take another upload chunk via `write_body`.
    ReadyToWrite { recommended_chunk_size: usize },
    /// Response headers are available through `response()`.
    HeaderCompleted { header_len: usize, auth_required: bool },
    /// More body bytes are waiting in the response.
    ReadyToRead { available_body_len: usize },
    Completed,
    Aborted(NetError),
}

impl TransactionEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionEvent::Completed | TransactionEvent::Aborted(_))
    }
}

/// Byte counters for the request and response bodies. `total` is `-1`
/// when the length is not known up front.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressEvent {
    Upload { current: i64, total: i64 },
    Download { current: i64, total: i64 },
}

/// Callback style consumer of [`TransactionEvent`]s.
#[allow(unused_variables)]
pub trait TransactionEventListener {
    fn on_transaction_ready_to_read(&mut self, txn: &mut HttpTransaction, available_body_len: usize) {}

    fn on_transaction_aborted(&mut self, txn: &mut HttpTransaction, error: &NetError) {}

    fn on_transaction_ready_to_write(&mut self, txn: &mut HttpTransaction, recommended_chunk_size: usize) {}

    fn on_transaction_header_completed(
        &mut self,
        txn: &mut HttpTransaction,
        header_len: usize,
        auth_required: bool,
    ) {
    }

    fn on_transaction_completed(&mut self, txn: &mut HttpTransaction) {}

    fn on_transaction_cert_verification_required(
        &mut self,
        txn: &mut HttpTransaction,
        certificate: Option<&str>,
    ) {
    }
}

/// Callback style consumer of [`ProgressEvent`]s.
#[allow(unused_variables)]
pub trait ProgressEventListener {
    fn on_http_upload_in_progress(&mut self, txn: &mut HttpTransaction, current: i64, total: i64) {}

    fn on_http_download_in_progress(&mut self, txn: &mut HttpTransaction, current: i64, total: i64) {}
}

/// Subscription to a transaction's events. Ends after the terminal event,
/// or without one if the transaction is cancelled.
#[derive(Debug)]
pub struct TransactionEvents {
    rx: mpsc::UnboundedReceiver<TransactionEvent>,
}

impl TransactionEvents {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<TransactionEvent>) -> Self {
        Self { rx }
    }

    pub async fn next_event(&mut self) -> Option<TransactionEvent> {
        self.rx.recv().await
    }

    /// Feeds events to `listener` until the transaction finishes.
    pub async fn dispatch<L>(&mut self, txn: &mut HttpTransaction, listener: &mut L)
    where
        L: TransactionEventListener + ?Sized,
    {
        while let Some(event) = self.next_event().await {
            let terminal = event.is_terminal();
            deliver(txn, listener, event);
            if terminal {
                break;
            }
        }
    }
}

impl Stream for TransactionEvents {
    type Item = TransactionEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

/// Subscription to a transaction's progress counters.
#[derive(Debug)]
pub struct ProgressEvents {
    rx: mpsc::UnboundedReceiver<ProgressEvent>,
}

impl ProgressEvents {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<ProgressEvent>) -> Self {
        Self { rx }
    }

    pub async fn next_event(&mut self) -> Option<ProgressEvent> {
        self.rx.recv().await
    }

    pub async fn dispatch<L>(&mut self, txn: &mut HttpTransaction, listener: &mut L)
    where
        L: ProgressEventListener + ?Sized,
    {
        while let Some(event) = self.next_event().await {
            deliver_progress(txn, listener, event);
        }
    }
}

impl Stream for ProgressEvents {
    type Item = ProgressEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

/// Drives both listeners from one task until the transaction finishes.
pub async fn dispatch_all<L, P>(
    events: &mut TransactionEvents,
    progress: &mut ProgressEvents,
    txn: &mut HttpTransaction,
    listener: &mut L,
    progress_listener: &mut P,
) where
    L: TransactionEventListener + ?Sized,
    P: ProgressEventListener + ?Sized,
{
    let mut progress_open = true;
    loop {
        tokio::select! {
            biased;
            event = progress.next_event(), if progress_open => match event {
                Some(event) => deliver_progress(txn, progress_listener, event),
                None => progress_open = false,
            },
            event = events.next_event() => match event {
                Some(event) => {
                    let terminal = event.is_terminal();
                    deliver(txn, listener, event);
                    if terminal {
                        break;
                    }
                }
                None => break,
            },
        }
    }
    // Counters queued before the terminal event
    while let Ok(event) = progress.rx.try_recv() {
        deliver_progress(txn, progress_listener, event);
    }
}

fn deliver<L>(txn: &mut HttpTransaction, listener: &mut L, event: TransactionEvent)
where
    L: TransactionEventListener + ?Sized,
{
    match event {
        TransactionEvent::CertVerificationRequired { certificate } => {
            listener.on_transaction_cert_verification_required(txn, certificate.as_deref())
        }
        TransactionEvent::ReadyToWrite {
            recommended_chunk_size,
        } => listener.on_transaction_ready_to_write(txn, recommended_chunk_size),
        TransactionEvent::HeaderCompleted {
            header_len,
            auth_required,
        } => listener.on_transaction_header_completed(txn, header_len, auth_required),
        TransactionEvent::ReadyToRead { available_body_len } => {
            listener.on_transaction_ready_to_read(txn, available_body_len)
        }
        TransactionEvent::Completed => listener.on_transaction_completed(txn),
        TransactionEvent::Aborted(error) => listener.on_transaction_aborted(txn, &error),
    }
}

fn deliver_progress<P>(txn: &mut HttpTransaction, listener: &mut P, event: ProgressEvent)
where
    P: ProgressEventListener + ?Sized,
{
    match event {
        ProgressEvent::Upload { current, total } => {
            listener.on_http_upload_in_progress(txn, current, total)
        }
        ProgressEvent::Download { current, total } => {
            listener.on_http_download_in_progress(txn, current, total)
        }
    }
}

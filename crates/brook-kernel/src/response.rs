use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;

use crate::error::KernelError;
use crate::event::{EventValue, Intent, RequestMetadata};
use crate::journal::LogPosition;

/// Answer to a client command, reporting the record that decided it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub request: RequestMetadata,
    pub key: i64,
    pub position: LogPosition,
    pub intent: Intent,
    pub value: Vec<u8>,
}

impl Response {
    pub fn decode<T: EventValue>(&self) -> Result<T, KernelError> {
        serde_cbor::from_slice(&self.value).map_err(|err| KernelError::Decode {
            what: T::NAME,
            position: self.position,
            message: err.to_string(),
        })
    }
}

#[derive(Debug, Error)]
pub enum ResponseError {
    #[error("response channel closed")]
    Closed,
    #[error("failed to send response: {0}")]
    Send(String),
}

pub trait ResponseSink: Send {
    fn send(&mut self, response: Response) -> Result<(), ResponseError>;
}

/// Collects responses in memory. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemResponseSink {
    responses: Arc<Mutex<Vec<Response>>>,
}

impl MemResponseSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn responses(&self) -> Vec<Response> {
        self.guard().clone()
    }

    pub fn take(&self) -> Vec<Response> {
        std::mem::take(&mut *self.guard())
    }

    fn guard(&self) -> MutexGuard<'_, Vec<Response>> {
        self.responses
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ResponseSink for MemResponseSink {
    fn send(&mut self, response: Response) -> Result<(), ResponseError> {
        self.guard().push(response);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardResponses;

impl ResponseSink for DiscardResponses {
    fn send(&mut self, _response: Response) -> Result<(), ResponseError> {
        Ok(())
    }
}

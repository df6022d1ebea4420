//! The sink the connector runtime talks to.
//!
//! ```text
//! UNINITIALIZED --open--> OPEN --close--> CLOSED
//!       |                                   ^
//!       +---------------close---------------+
//! ```
//!
//! `open` validates the output schema and picks the guarantee processor. Records are only
//! accepted while OPEN. `close` can be called any number of times.

use std::fmt;
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::SinkConfig;
use crate::error::{Error, Result};
use crate::message::SinkRecord;
use crate::processor::GuaranteeProcessor;
use crate::schema::{self, SerdeRegistry};
use crate::transport::Transport;

/// Lifecycle state of a [Sink].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkState {
    Uninitialized,
    Open,
    Closed,
}

impl fmt::Display for SinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkState::Uninitialized => write!(f, "UNINITIALIZED"),
            SinkState::Open => write!(f, "OPEN"),
            SinkState::Closed => write!(f, "CLOSED"),
        }
    }
}

enum Lifecycle<T: Transport> {
    /// Holds the transport until `open` hands it to the processor.
    Uninitialized(T),
    Open(Arc<GuaranteeProcessor<T>>),
    Closed,
}

impl<T: Transport> Lifecycle<T> {
    fn state(&self) -> SinkState {
        match self {
            Lifecycle::Uninitialized(_) => SinkState::Uninitialized,
            Lifecycle::Open(_) => SinkState::Open,
            Lifecycle::Closed => SinkState::Closed,
        }
    }
}

pub struct Sink<T: Transport> {
    config: Arc<SinkConfig>,
    serde_registry: SerdeRegistry,
    lifecycle: parking_lot::Mutex<Lifecycle<T>>,
}

impl<T: Transport> Sink<T> {
    pub fn new(config: SinkConfig, transport: T) -> Self {
        Sink {
            config: Arc::new(config),
            serde_registry: SerdeRegistry::default(),
            lifecycle: parking_lot::Mutex::new(Lifecycle::Uninitialized(transport)),
        }
    }

    /// Serdes the output schema may name.
    pub fn with_serde_registry(mut self, serde_registry: SerdeRegistry) -> Self {
        self.serde_registry = serde_registry;
        self
    }

    pub fn state(&self) -> SinkState {
        self.lifecycle.lock().state()
    }

    /// Validates the output schema and starts the processor of the configured guarantee.
    /// A sink that fails to open stays UNINITIALIZED.
    pub fn open(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock();
        let state = lifecycle.state();
        if state != SinkState::Uninitialized {
            return Err(Error::InvalidState {
                operation: "open",
                state,
            });
        }

        let schema = schema::initialize(
            &self.config.output_type,
            &self.config.output_serde,
            &self.serde_registry,
        )?;

        let transport = match std::mem::replace(&mut *lifecycle, Lifecycle::Closed) {
            Lifecycle::Uninitialized(transport) => transport,
            other => {
                *lifecycle = other;
                return Err(Error::InvalidState {
                    operation: "open",
                    state,
                });
            }
        };
        let processor = GuaranteeProcessor::new(Arc::clone(&self.config), transport);
        *lifecycle = Lifecycle::Open(Arc::new(processor));

        info!(
            fqfn = %self.config.fqfn,
            guarantee = %self.config.processing_guarantee,
            output_type = %schema.output_type,
            "Sink opened"
        );
        Ok(())
    }

    /// Writes the record. When an error is returned the record was already failed.
    pub async fn write(&self, record: SinkRecord) -> Result<()> {
        let processor = {
            let lifecycle = self.lifecycle.lock();
            match &*lifecycle {
                Lifecycle::Open(processor) => Arc::clone(processor),
                other => {
                    return Err(Error::InvalidState {
                        operation: "write",
                        state: other.state(),
                    });
                }
            }
        };

        processor.write(record).await.inspect_err(|e| {
            warn!(fqfn = %self.config.fqfn, ?e, "Failed to write record");
        })
    }

    /// Closes every producer. Calling it again, or before open, only moves the sink to CLOSED.
    pub async fn close(&self) {
        let previous = std::mem::replace(&mut *self.lifecycle.lock(), Lifecycle::Closed);
        if let Lifecycle::Open(processor) = previous {
            processor.close().await;
            info!(fqfn = %self.config.fqfn, "Sink closed");
        }
    }

    #[cfg(test)]
    fn processor(&self) -> Option<Arc<GuaranteeProcessor<T>>> {
        match &*self.lifecycle.lock() {
            Lifecycle::Open(processor) => Some(Arc::clone(processor)),
            Lifecycle::Uninitialized(_) | Lifecycle::Closed => None,
        }
    }
}

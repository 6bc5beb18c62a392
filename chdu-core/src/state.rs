//! Connection state of the command link
//!
//! The link starts out `Pending`. The initializer moves it through
//! `Initializing` to `Ready`; a transport disconnect puts it back to
//! `Pending` from any state.

use std::sync::Arc;

use tracing::debug;

use crate::error::{Error, Result};

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Handshake required before the next command
    Pending,
    
    /// Handshake in progress
    Initializing,
    
    /// Handshake completed, commands may be sent
    Ready,
}

/// Shared connection state cell
///
/// Thread-safe and can be cloned cheaply (Arc internally).
#[derive(Debug, Clone)]
pub struct LinkState {
    inner: Arc<parking_lot::RwLock<ConnectionState>>,
}

impl LinkState {
    /// Create a new pending link
    pub fn new() -> Self {
        Self {
            inner: Arc::new(parking_lot::RwLock::new(ConnectionState::Pending)),
        }
    }
    
    /// Get current state
    pub fn get(&self) -> ConnectionState {
        *self.inner.read()
    }
    
    pub fn is_pending(&self) -> bool {
        matches!(self.get(), ConnectionState::Pending)
    }
    
    pub fn is_ready(&self) -> bool {
        matches!(self.get(), ConnectionState::Ready)
    }
    
    /// Enter `Initializing`; only allowed from `Pending`
    pub fn begin_initialization(&self) -> Result<()> {
        let mut state = self.inner.write();
        
        if *state != ConnectionState::Pending {
            return Err(Error::InvalidState(
                format!("Cannot initialize from state: {:?}", *state)
            ));
        }
        
        *state = ConnectionState::Initializing;
        debug!("Link state: Pending -> Initializing");
        Ok(())
    }
    
    /// Enter `Ready`; only allowed from `Initializing`
    pub fn mark_ready(&self) -> Result<()> {
        let mut state = self.inner.write();
        
        if *state != ConnectionState::Initializing {
            return Err(Error::InvalidState(
                format!("Cannot become ready from state: {:?}", *state)
            ));
        }
        
        *state = ConnectionState::Ready;
        debug!("Link state: Initializing -> Ready");
        Ok(())
    }
    
    /// Force `Pending`
    pub fn reset(&self) {
        let previous = std::mem::replace(&mut *self.inner.write(), ConnectionState::Pending);
        if previous != ConnectionState::Pending {
            debug!("Link state: {:?} -> Pending", previous);
        }
    }
}

impl Default for LinkState {
    fn default() -> Self {
        Self::new()
    }
}

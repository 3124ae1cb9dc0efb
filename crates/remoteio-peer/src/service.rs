use remoteio_transport::{Channel, HandleBased};

use crate::error::Result;
use crate::handshake::service_clone;
use crate::object::{HandleInfo, HandleType};

/// A bare service connection. Only clone, unwrap and close apply.
#[derive(Debug)]
pub struct ServiceIo {
    channel: Channel,
}

impl ServiceIo {
    pub fn new(channel: Channel) -> Self {
        Self { channel }
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn clone_handles(&self) -> Result<Vec<HandleInfo>> {
        let client = service_clone(&self.channel)?;
        Ok(vec![HandleInfo::new(client.into_handle(), HandleType::Service)])
    }

    pub fn unwrap(self) -> Vec<HandleInfo> {
        vec![HandleInfo::new(self.channel.into_handle(), HandleType::Service)]
    }
}

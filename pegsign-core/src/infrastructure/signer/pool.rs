use crate::foundation::{BridgeError, Result};
use crate::infrastructure::signer::connection::{SignerConnection, TcpJsonConnection};
use async_trait::async_trait;
use log::trace;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Source of exclusive connections to the remote signer.
///
/// Every successful `acquire` must be paired with exactly one `release`; use [`lease`] to get
/// a guard that does this on drop.
#[async_trait]
pub trait ConnectionPool: Send + Sync {
    async fn acquire(&self) -> Result<Box<dyn SignerConnection>>;

    fn release(&self, connection: Box<dyn SignerConnection>);
}

/// Leases one connection for the lifetime of the returned guard.
pub async fn lease(pool: &Arc<dyn ConnectionPool>) -> Result<PooledConnection> {
    let connection = pool.acquire().await?;
    Ok(PooledConnection { pool: Arc::clone(pool), connection: Some(connection) })
}

pub struct PooledConnection {
    pool: Arc<dyn ConnectionPool>,
    connection: Option<Box<dyn SignerConnection>>,
}

impl PooledConnection {
    pub async fn exchange(&mut self, request: &Value) -> Result<Value> {
        match self.connection.as_mut() {
            Some(connection) => connection.exchange(request).await,
            None => Err(BridgeError::transport("exchange", "connection already released")),
        }
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            self.pool.release(connection);
        }
    }
}

/// Fixed-size pool of lazily connected TCP connections.
pub struct TcpConnectionPool {
    addr: String,
    socket_timeout: Duration,
    permits: Semaphore,
    idle: Mutex<Vec<Box<dyn SignerConnection>>>,
}

impl TcpConnectionPool {
    pub fn new(addr: impl Into<String>, socket_timeout: Duration, size: usize) -> Self {
        Self { addr: addr.into(), socket_timeout, permits: Semaphore::new(size.max(1)), idle: Mutex::new(Vec::new()) }
    }
}

#[async_trait]
impl ConnectionPool for TcpConnectionPool {
    async fn acquire(&self) -> Result<Box<dyn SignerConnection>> {
        let permit = self.permits.acquire().await.map_err(|_| BridgeError::transport("acquire", "connection pool closed"))?;
        permit.forget();
        let reused = self.idle.lock().pop();
        trace!("connection pool acquire addr={} reused={}", self.addr, reused.is_some());
        Ok(reused.unwrap_or_else(|| Box::new(TcpJsonConnection::new(self.addr.clone(), self.socket_timeout))))
    }

    fn release(&self, connection: Box<dyn SignerConnection>) {
        self.idle.lock().push(connection);
        self.permits.add_permits(1);
    }
}

//! Thin blocking facade over the async pools. Each pool owns a
//! current-thread tokio runtime and drives the async implementation;
//! no scheduling logic is duplicated.

use std::sync::Arc;

use tokio::runtime::{Builder, Runtime};

use crate::error::Error;
use crate::models::{Header, Request};
use crate::pool::PoolConfig;

fn build_runtime() -> Result<Runtime, Error> {
    Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| Error::Runtime(err.to_string()))
}

pub struct ConnectionPool {
    runtime: Arc<Runtime>,
    pool: crate::pool::ConnectionPool,
}

impl ConnectionPool {
    pub fn new(config: PoolConfig) -> Result<Self, Error> {
        Ok(Self {
            runtime: Arc::new(build_runtime()?),
            pool: crate::pool::ConnectionPool::new(config),
        })
    }

    pub fn with_backend(
        config: PoolConfig,
        backend: Arc<dyn crate::backend::NetworkBackend>,
    ) -> Result<Self, Error> {
        Ok(Self {
            runtime: Arc::new(build_runtime()?),
            pool: crate::pool::ConnectionPool::with_backend(config, backend),
        })
    }

    pub fn handle_request(&self, request: Request) -> Result<Response, Error> {
        let inner = self.runtime.block_on(self.pool.handle_request(request))?;
        Ok(Response {
            runtime: Arc::clone(&self.runtime),
            inner,
        })
    }

    pub fn connection_info(&self) -> Vec<String> {
        self.pool.connection_info()
    }

    pub fn close(&self) {
        self.pool.close();
    }
}

pub struct ProxyPool {
    runtime: Arc<Runtime>,
    pool: crate::proxy::ProxyPool,
}

impl ProxyPool {
    pub fn new(proxy_url: &str, config: PoolConfig) -> Result<Self, Error> {
        Ok(Self {
            runtime: Arc::new(build_runtime()?),
            pool: crate::proxy::ProxyPool::new(proxy_url, config)?,
        })
    }

    pub fn handle_request(&self, request: Request) -> Result<Response, Error> {
        let inner = self.runtime.block_on(self.pool.handle_request(request))?;
        Ok(Response {
            runtime: Arc::clone(&self.runtime),
            inner,
        })
    }

    pub fn connection_info(&self) -> Vec<String> {
        self.pool.connection_info()
    }

    pub fn close(&self) {
        self.pool.close();
    }
}

/// A response whose body is read by blocking on the shared runtime.
pub struct Response {
    runtime: Arc<Runtime>,
    inner: crate::models::Response,
}

impl Response {
    pub fn status(&self) -> u16 {
        self.inner.status
    }

    pub fn headers(&self) -> &[Header] {
        &self.inner.headers
    }

    pub fn read(&mut self) -> Result<Vec<u8>, Error> {
        let runtime = Arc::clone(&self.runtime);
        runtime.block_on(self.inner.read())
    }

    pub fn chunk(&mut self) -> Result<Option<Vec<u8>>, Error> {
        let runtime = Arc::clone(&self.runtime);
        runtime.block_on(self.inner.body.chunk())
    }

    pub fn close(&mut self) {
        let runtime = Arc::clone(&self.runtime);
        runtime.block_on(self.inner.close());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::backend::MockBackend;
    use crate::models::Request;
    use crate::pool::PoolConfig;

    #[test]
    fn blocking_pool_round_trip() {
        let backend = MockBackend::new(vec![
            b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok".to_vec(),
        ]);
        let pool =
            super::ConnectionPool::with_backend(PoolConfig::default(), Arc::new(backend.clone()))
                .unwrap();

        for _ in 0..2 {
            let mut response = pool
                .handle_request(Request::get("http://example.com/").unwrap())
                .unwrap();
            assert_eq!(response.status(), 200);
            assert_eq!(response.read().unwrap(), b"ok");
        }
        assert_eq!(backend.connect_count(), 1);
        pool.close();
    }
}

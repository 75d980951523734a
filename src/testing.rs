//! In-memory collaborators shared by the unit tests.

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use crate::{
    config::{Settings, SettingsProvider},
    database::{
        ClientFuture, ConnectionError, DatabaseClient, DatabaseProvider, InterceptError,
        InterceptorFactory, MiddlewareLoadError, QueryInterceptor, QueryParams,
    },
};

#[derive(Clone, Copy, Debug)]
pub enum ConnectBehavior {
    Succeed,
    Fail,
    Hang,
    Slow(Duration),
}

pub struct FakeClient {
    behavior: ConnectBehavior,
    reject_interceptors: bool,
    connect_calls: AtomicUsize,
    disconnect_calls: AtomicUsize,
    interceptors: Mutex<Vec<String>>,
}

impl FakeClient {
    pub fn new(behavior: ConnectBehavior) -> Self {
        Self {
            behavior,
            reject_interceptors: false,
            connect_calls: AtomicUsize::new(0),
            disconnect_calls: AtomicUsize::new(0),
            interceptors: Mutex::new(Vec::new()),
        }
    }

    pub fn rejecting_interceptors(mut self) -> Self {
        self.reject_interceptors = true;
        self
    }

    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub fn disconnect_calls(&self) -> usize {
        self.disconnect_calls.load(Ordering::SeqCst)
    }

    pub fn interceptor_names(&self) -> Vec<String> {
        self.interceptors
            .lock()
            .map(|names| names.clone())
            .unwrap_or_default()
    }

    async fn respond(behavior: ConnectBehavior) -> Result<(), ConnectionError> {
        match behavior {
            ConnectBehavior::Succeed => Ok(()),
            ConnectBehavior::Fail => Err(ConnectionError::Unreachable(
                "connection refused".to_string(),
            )),
            ConnectBehavior::Hang => std::future::pending().await,
            ConnectBehavior::Slow(delay) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
        }
    }
}

impl DatabaseClient for FakeClient {
    fn connect(&self) -> ClientFuture<'_> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(Self::respond(self.behavior))
    }

    fn disconnect(&self) -> ClientFuture<'_> {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async { Ok(()) })
    }

    fn ping(&self) -> ClientFuture<'_> {
        Box::pin(Self::respond(self.behavior))
    }

    fn register_interceptor(
        &self,
        interceptor: Arc<dyn QueryInterceptor>,
    ) -> Result<(), MiddlewareLoadError> {
        let name = interceptor.name().to_string();
        if self.reject_interceptors {
            return Err(MiddlewareLoadError::Registration(
                name,
                "client does not accept interceptors".to_string(),
            ));
        }
        self.interceptors
            .lock()
            .map_err(|_| MiddlewareLoadError::Registration(name.clone(), "poisoned".to_string()))?
            .push(name);
        Ok(())
    }
}

/// Hands out a fresh [`FakeClient`] per `open` and remembers each one.
pub struct FakeProvider {
    behavior: ConnectBehavior,
    opened: Mutex<Vec<Arc<FakeClient>>>,
}

impl FakeProvider {
    pub fn new(behavior: ConnectBehavior) -> Self {
        Self {
            behavior,
            opened: Mutex::new(Vec::new()),
        }
    }

    pub fn opened(&self) -> Vec<Arc<FakeClient>> {
        self.opened
            .lock()
            .map(|clients| clients.clone())
            .unwrap_or_default()
    }

    pub fn connect_calls(&self) -> usize {
        self.opened().iter().map(|client| client.connect_calls()).sum()
    }
}

impl DatabaseProvider for FakeProvider {
    fn open(&self, _settings: &Settings) -> Result<Arc<dyn DatabaseClient>, ConnectionError> {
        let client = Arc::new(FakeClient::new(self.behavior));
        self.opened
            .lock()
            .map_err(|_| ConnectionError::Client("poisoned".to_string()))?
            .push(client.clone());
        Ok(client)
    }
}

pub struct NamedInterceptor(String);

impl QueryInterceptor for NamedInterceptor {
    fn name(&self) -> &str {
        &self.0
    }

    fn intercept(&self, _params: &mut QueryParams) -> Result<(), InterceptError> {
        Ok(())
    }
}

pub struct FakeInterceptorFactory {
    name: String,
    fail: bool,
    build_calls: AtomicUsize,
}

impl FakeInterceptorFactory {
    pub fn working(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fail: false,
            build_calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(name: &str) -> Self {
        Self {
            fail: true,
            ..Self::working(name)
        }
    }

    pub fn build_calls(&self) -> usize {
        self.build_calls.load(Ordering::SeqCst)
    }
}

impl InterceptorFactory for FakeInterceptorFactory {
    fn name(&self) -> &str {
        &self.name
    }

    fn build(&self, _settings: &Settings) -> Result<Arc<dyn QueryInterceptor>, MiddlewareLoadError> {
        self.build_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(MiddlewareLoadError::Unavailable(
                self.name.clone(),
                "encryption key not configured".to_string(),
            ));
        }
        Ok(Arc::new(NamedInterceptor(self.name.clone())))
    }
}

/// Settings that tests can change between bootstrap attempts.
pub struct MutableSettings {
    settings: Mutex<Settings>,
    loads: AtomicUsize,
}

impl MutableSettings {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: Mutex::new(settings),
            loads: AtomicUsize::new(0),
        }
    }

    pub fn set(&self, settings: Settings) {
        if let Ok(mut current) = self.settings.lock() {
            *current = settings;
        }
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl SettingsProvider for MutableSettings {
    fn load(&self) -> anyhow::Result<Settings> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.settings
            .lock()
            .map(|settings| settings.clone())
            .map_err(|_| anyhow::anyhow!("settings lock poisoned"))
    }
}

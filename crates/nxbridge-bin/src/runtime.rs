// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Bridge runtime orchestration.
//!
//! Startup order:
//!
//! 1. Tag definitions are loaded and the registry built
//! 2. The node publisher is created and every tag exposed under the object
//! 3. The controller session is opened
//! 4. Node subscriptions are registered and the server started
//! 5. The poll loop and change notifier are spawned
//!
//! The controller session and the server are released on every exit path
//! once the publisher exists.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use nxbridge_config::{
    load_config, AuthenticationConfig, BridgeConfig, ControllerBackend, EncryptionConfig,
    TagDefinitions,
};
use nxbridge_core::{
    expose_tags, AddressSpaceLayout, BridgeError, ControllerGateway, ControllerSession,
    EngineConfig, NodePublisher, SimulatedController, SyncEngine,
};
use nxbridge_opcua::{
    build_publisher, CredentialChecker, EndpointSecurity, SecurityMode, SecurityPolicy,
    ServerSettings,
};

use crate::error::{BinError, BinResult};
use crate::shutdown::{ShutdownCoordinator, ShutdownGuard};

// =============================================================================
// BridgeRuntime
// =============================================================================

/// Runs the bridge until shutdown is signaled.
pub struct BridgeRuntime {
    config: Arc<BridgeConfig>,
    shutdown: ShutdownCoordinator,
}

impl BridgeRuntime {
    /// Creates a new runtime.
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config: Arc::new(config),
            shutdown: ShutdownCoordinator::new(),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Returns a handle that can stop the runtime.
    pub fn shutdown_handle(&self) -> ShutdownCoordinator {
        self.shutdown.clone()
    }

    /// Runs the bridge until shutdown is signaled.
    pub async fn run(self) -> BinResult<()> {
        info!(version = nxbridge_core::VERSION, "Starting nxbridge");

        let components = self.initialize_components()?;
        let result = self.run_main_loop(&components).await;
        components.release().await;

        info!("nxbridge shutdown complete");
        result
    }

    /// Builds the registry, the publisher, the exposed nodes and the engine.
    fn initialize_components(&self) -> BinResult<BridgeComponents> {
        let config = &self.config;

        let definitions = TagDefinitions::load(&config.tags_path, &config.server.health_tag)?;
        info!(
            path = %config.tags_path.display(),
            tags = definitions.len(),
            writable = definitions.writable_count(),
            "Tag definitions loaded"
        );

        let session = controller_session(config.controller.backend, &definitions)?;
        info!(backend = %config.controller.backend, "Controller backend selected");
        let mut registry = definitions.into_registry()?;

        let settings = server_settings(config)?;
        info!(
            endpoint = %settings.endpoint_url(),
            security = %settings.security,
            authentication = settings.credentials.is_enabled(),
            "Creating OPC UA address space"
        );
        let publisher = build_publisher(settings)
            .map_err(|e| BinError::from(BridgeError::from(e)).with_context("Creating OPC UA server"))?;

        let layout = AddressSpaceLayout {
            namespace_uri: config.server.namespace_uri.clone(),
            object_label: config.server.object_label.clone(),
            health_tag: config.server.health_tag.clone(),
        };
        let nodes = expose_tags(&mut registry, publisher.as_ref(), &layout)
            .map_err(|e| BinError::from(e).with_context("Exposing tags"))?;

        let gateway = ControllerGateway::new(session, config.controller.ip_address.clone());
        let engine_config = EngineConfig::default()
            .with_poll_interval(config.controller.poll_interval())
            .with_reconnect_backoff(config.controller.reconnect_backoff());

        let engine = Arc::new(SyncEngine::new(
            Arc::new(registry),
            publisher.clone(),
            gateway,
            nodes.health,
            engine_config,
        ));

        Ok(BridgeComponents { publisher, engine })
    }

    /// Connects, starts the server and the loops, then waits for shutdown.
    async fn run_main_loop(&self, components: &BridgeComponents) -> BinResult<()> {
        let engine = &components.engine;

        engine
            .connect_initial()
            .await
            .map_err(|e| BinError::init(e.to_string()).with_context("Connecting to controller"))?;

        let notifications = engine
            .subscribe_all()
            .map_err(|e| BinError::init(e.to_string()).with_context("Subscribing to nodes"))?;

        components
            .publisher
            .start()
            .await
            .map_err(|e| BinError::init(e.to_string()).with_context("Starting OPC UA server"))?;

        let tasks = [
            self.spawn_guarded("poll loop", {
                let engine = engine.clone();
                let shutdown = self.shutdown.subscribe();
                async move { engine.run_poll_loop(shutdown).await }
            }),
            self.spawn_guarded("change notifier", {
                let engine = engine.clone();
                let shutdown = self.shutdown.subscribe();
                async move { engine.run_change_notifier(notifications, shutdown).await }
            }),
        ];

        info!(
            controller = %self.config.controller.ip_address,
            endpoint = %self.config.server.endpoint,
            "nxbridge is ready"
        );
        self.shutdown.wait_for_shutdown().await;

        info!("Shutting down, waiting for tasks");
        for task in tasks {
            if let Err(e) = task.await {
                error!(error = %e, "Task ended abnormally");
            }
        }

        Ok(())
    }

    fn spawn_guarded<F>(&self, name: &'static str, task: F) -> JoinHandle<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let guard = ShutdownGuard::new(self.shutdown.clone(), name);
        tokio::spawn(async move {
            let _guard = guard;
            task.await;
        })
    }
}

// =============================================================================
// BridgeComponents
// =============================================================================

/// Everything that must be released on shutdown.
struct BridgeComponents {
    publisher: Arc<dyn NodePublisher>,
    engine: Arc<SyncEngine>,
}

impl BridgeComponents {
    async fn release(self) {
        self.engine.shutdown().await;
        if let Err(e) = self.publisher.stop().await {
            warn!(error = %e, "Failed to stop OPC UA server");
        }

        let stats = self.engine.stats();
        info!(
            cycles = stats.cycles_completed,
            published = stats.values_published,
            writes = stats.writes_forwarded,
            echoes = stats.echoes_suppressed,
            reconnects = stats.reconnects,
            "Engine statistics"
        );
    }
}

// =============================================================================
// Controller Session
// =============================================================================

/// Creates the controller session for the configured backend.
///
/// The simulated controller is seeded with each tag's initial value.
pub fn controller_session(
    backend: ControllerBackend,
    definitions: &TagDefinitions,
) -> BinResult<Box<dyn ControllerSession>> {
    match backend {
        ControllerBackend::Simulated => Ok(Box::new(
            SimulatedController::seeded(definitions.iter()).session(),
        )),
        #[cfg(feature = "eip")]
        ControllerBackend::Eip => Ok(Box::new(nxbridge_core::EipSession::new())),
        #[cfg(not(feature = "eip"))]
        ControllerBackend::Eip => Err(BinError::config(
            "controller.backend 'eip' requires a build with the eip feature",
        )),
    }
}

// =============================================================================
// Server Settings
// =============================================================================

/// Maps the configuration onto server settings.
pub fn server_settings(config: &BridgeConfig) -> BinResult<ServerSettings> {
    let url = config.server.endpoint_url()?;

    let mut settings = ServerSettings::new(url.host, url.port, url.path);
    settings.application_name = config.server.application_name.clone();
    settings.application_uri = format!("urn:{}", config.server.application_name);
    settings.publishing_interval = config.server.publishing_interval();
    settings.security = endpoint_security(&config.security.encryption)?;
    settings.credentials = credentials(&config.security.authentication)?;
    Ok(settings)
}

fn endpoint_security(encryption: &EncryptionConfig) -> BinResult<EndpointSecurity> {
    if !encryption.enabled {
        return Ok(EndpointSecurity::None);
    }

    let name = encryption.security_policy;
    let policy = match name.policy {
        nxbridge_config::SecurityPolicy::None => {
            return Err(BinError::config("encryption is enabled with NoSecurity"))
        }
        nxbridge_config::SecurityPolicy::Basic128Rsa15 => SecurityPolicy::Basic128Rsa15,
        nxbridge_config::SecurityPolicy::Basic256 => SecurityPolicy::Basic256,
        nxbridge_config::SecurityPolicy::Basic256Sha256 => SecurityPolicy::Basic256Sha256,
        nxbridge_config::SecurityPolicy::Aes128Sha256RsaOaep => SecurityPolicy::Aes128Sha256RsaOaep,
        nxbridge_config::SecurityPolicy::Aes256Sha256RsaPss => SecurityPolicy::Aes256Sha256RsaPss,
    };
    let mode = match name.mode {
        nxbridge_config::SecurityMode::None => {
            return Err(BinError::config(format!("security policy '{}' has no mode", name)))
        }
        nxbridge_config::SecurityMode::Sign => SecurityMode::Sign,
        nxbridge_config::SecurityMode::SignAndEncrypt => SecurityMode::SignAndEncrypt,
    };

    Ok(EndpointSecurity::Secured {
        policy,
        mode,
        certificate_path: required_path(&encryption.certificate_path, "certificate_path")?,
        private_key_path: required_path(&encryption.private_key_path, "private_key_path")?,
    })
}

fn required_path(path: &Option<PathBuf>, field: &str) -> BinResult<PathBuf> {
    path.as_deref()
        .map(Path::to_path_buf)
        .ok_or_else(|| BinError::config(format!("security.encryption.{} is required", field)))
}

fn credentials(authentication: &AuthenticationConfig) -> BinResult<CredentialChecker> {
    if !authentication.enabled {
        return Ok(CredentialChecker::disabled());
    }
    match (&authentication.username, &authentication.password) {
        (Some(username), Some(password)) => Ok(CredentialChecker::new(username, password.raw())),
        _ => Err(BinError::config(
            "authentication is enabled without username and password",
        )),
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for constructing the bridge runtime.
#[derive(Default)]
pub struct RuntimeBuilder {
    config_path: Option<PathBuf>,
    config: Option<BridgeConfig>,
}

impl RuntimeBuilder {
    /// Creates a new runtime builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the configuration file path.
    pub fn config_path(mut self, path: impl AsRef<Path>) -> Self {
        self.config_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Sets the configuration directly.
    pub fn config(mut self, config: BridgeConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Builds the runtime, loading the configuration file if none was set.
    pub fn build(self) -> BinResult<BridgeRuntime> {
        let config = match self.config {
            Some(config) => config,
            None => {
                let path = self
                    .config_path
                    .ok_or_else(|| BinError::config("No configuration provided"))?;

                load_config(&path).map_err(|e| {
                    BinError::from(e)
                        .with_context(format!("Failed to load config from {}", path.display()))
                })?
            }
        };

        Ok(BridgeRuntime::new(config))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use nxbridge_config::{load_config_str, ConfigFormat, SecretValue};
    use std::io::Write;
    use std::time::Duration;

    fn config_with_tags(tags_path: &Path) -> BridgeConfig {
        let json = serde_json::json!({
            "server": {
                "endpoint": "opc.tcp://127.0.0.1:4841/freeopcua/server/",
                "namespace_uri": "urn:plant:line1"
            },
            "controller": {
                "ip_address": "192.168.250.1",
                "poll_interval_secs": 0.05
            },
            "tags_path": tags_path
        });
        load_config_str(&json.to_string(), ConfigFormat::Json).unwrap()
    }

    #[test]
    fn test_runtime_builder() {
        let config = config_with_tags(Path::new("tags.json"));
        let runtime = RuntimeBuilder::new().config(config).build().unwrap();
        assert_eq!(runtime.config().controller.ip_address, "192.168.250.1");
    }

    #[test]
    fn test_runtime_builder_requires_config() {
        let err = RuntimeBuilder::new().build().err().unwrap();
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_runtime_builder_missing_file() {
        let err = RuntimeBuilder::new()
            .config_path("/nonexistent/nxbridge.json")
            .build()
            .err()
            .unwrap();
        assert_eq!(err.exit_code(), 1);
    }

    #[tokio::test]
    async fn test_controller_session_per_backend() {
        let definitions = TagDefinitions::parse(
            r#"{ "Speed": { "value": 10, "write": true } }"#,
            "COM_PLC_FAIL",
        )
        .unwrap();

        let mut session = controller_session(ControllerBackend::Simulated, &definitions).unwrap();
        assert_eq!(session.display_name(), "simulated");
        session.connect("192.168.250.1").await.unwrap();
        session.register_session().await.unwrap();
        assert_eq!(
            session.read_tag("Speed").await.unwrap(),
            nxbridge_core::Value::Int32(10)
        );

        let eip = controller_session(ControllerBackend::Eip, &definitions);
        if cfg!(feature = "eip") {
            assert_eq!(eip.ok().map(|s| s.display_name().to_string()).as_deref(), Some("ethernet/ip"));
        } else {
            assert_eq!(eip.err().map(|e| e.exit_code()), Some(1));
        }
    }

    #[test]
    fn test_server_settings_plain() {
        let config = config_with_tags(Path::new("tags.json"));
        let settings = server_settings(&config).unwrap();

        assert_eq!(settings.host, "127.0.0.1");
        assert_eq!(settings.port, 4841);
        assert_eq!(settings.path, "/freeopcua/server/");
        assert_eq!(settings.security, EndpointSecurity::None);
        assert!(!settings.credentials.is_enabled());
        assert_eq!(settings.publishing_interval, Duration::from_millis(1000));
    }

    #[test]
    fn test_server_settings_secured() {
        let mut config = config_with_tags(Path::new("tags.json"));
        config.security.encryption.enabled = true;
        config.security.encryption.certificate_path = Some("certs/server.der".into());
        config.security.encryption.private_key_path = Some("certs/server.pem".into());
        config.security.encryption.security_policy =
            "Basic256Sha256_SignAndEncrypt".parse().unwrap();
        config.security.authentication.enabled = true;
        config.security.authentication.username = Some("operator".into());
        config.security.authentication.password = Some(SecretValue::new("s3cret"));

        let settings = server_settings(&config).unwrap();
        assert_eq!(settings.security.to_string(), "Basic256Sha256/SignAndEncrypt");
        assert!(settings.credentials.check("operator", "s3cret"));
        assert!(!settings.credentials.check("operator", "guess"));
    }

    #[test]
    fn test_server_settings_incomplete_security() {
        let mut config = config_with_tags(Path::new("tags.json"));
        config.security.encryption.enabled = true;
        config.security.encryption.security_policy = "Basic256_Sign".parse().unwrap();
        let err = server_settings(&config).unwrap_err();
        assert_eq!(err.exit_code(), 1);
    }

    #[tokio::test]
    async fn test_missing_tag_file_is_config_error() {
        let config = config_with_tags(Path::new("/nonexistent/config_plc.json"));
        let err = BridgeRuntime::new(config).run().await.unwrap_err();
        assert_eq!(err.exit_code(), 1);
    }

    #[cfg(feature = "opcua-server")]
    #[test]
    fn test_publisher_is_opcua_server() {
        let pki = tempfile::tempdir().unwrap();
        let config = config_with_tags(Path::new("tags.json"));
        let mut settings = server_settings(&config).unwrap();
        settings.pki_dir = pki.path().join("pki");

        let publisher = build_publisher(settings).unwrap();
        assert_eq!(
            publisher.describe(),
            "OPC UA server at opc.tcp://127.0.0.1:4841/freeopcua/server/"
        );
    }

    #[cfg(not(feature = "opcua-server"))]
    #[tokio::test]
    async fn test_run_until_shutdown() {
        let mut tags = tempfile::NamedTempFile::new().unwrap();
        write!(
            tags,
            r#"{{ "Speed": {{ "value": 10, "write": true }}, "Running": {{ "value": false, "write": false }} }}"#
        )
        .unwrap();

        let runtime = BridgeRuntime::new(config_with_tags(tags.path()));
        let shutdown = runtime.shutdown_handle();
        let handle = tokio::spawn(runtime.run());

        tokio::time::sleep(Duration::from_millis(200)).await;
        shutdown.initiate_shutdown();

        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("runtime should stop")
            .unwrap();
        assert!(result.is_ok());
    }
}

use std::path::PathBuf;
use std::time::Duration;

// In-container path where the relay expects its configuration.
const RELAY_CONFIG_MOUNT: &str = "/root/.relay/config.yaml";

/// Configuration for the relay sidecar container
#[derive(Debug, Clone)]
pub struct RelayContainerConfig {
    /// Image reference to pull and run
    pub image: String,
    /// Container name
    pub container_name: String,
    /// Host path of the relay configuration file to bind-mount
    pub host_config_path: PathBuf,
    /// In-container path the configuration is mounted at
    pub container_config_path: String,
    /// Grace period given to the container on stop
    pub stop_timeout: Duration,
}

impl Default for RelayContainerConfig {
    fn default() -> Self {
        Self {
            image: "bridge-relay:latest".to_string(),
            container_name: "bridge-relay-test".to_string(),
            host_config_path: PathBuf::from("relay_config.yaml"),
            container_config_path: RELAY_CONFIG_MOUNT.to_string(),
            stop_timeout: Duration::from_secs(5),
        }
    }
}

impl RelayContainerConfig {
    /// Create a config for the given image and host configuration file
    pub fn new(image: String, host_config_path: PathBuf) -> Self {
        Self {
            image,
            host_config_path,
            ..Default::default()
        }
    }

    /// Set a custom container name
    pub fn with_container_name(mut self, name: String) -> Self {
        self.container_name = name;
        self
    }

    /// Bind-mount specification exposing the host config at the relay's
    /// expected path
    pub fn bind_spec(&self) -> String {
        format!(
            "{}:{}",
            self.host_config_path.display(),
            self.container_config_path
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RelayContainerConfig::default();
        assert_eq!(config.container_name, "bridge-relay-test");
        assert_eq!(config.container_config_path, RELAY_CONFIG_MOUNT);
        assert_eq!(config.stop_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_new_config() {
        let config = RelayContainerConfig::new(
            "registry.example/relay:0.0.6".to_string(),
            PathBuf::from("/tmp/relay_config.yaml"),
        );
        assert_eq!(config.image, "registry.example/relay:0.0.6");
        assert_eq!(config.host_config_path, PathBuf::from("/tmp/relay_config.yaml"));
    }

    #[test]
    fn test_with_container_name() {
        let config =
            RelayContainerConfig::default().with_container_name("custom-relay".to_string());
        assert_eq!(config.container_name, "custom-relay");
    }

    #[test]
    fn test_bind_spec() {
        let config = RelayContainerConfig::new(
            "relay:latest".to_string(),
            PathBuf::from("/work/config.yaml"),
        );
        assert_eq!(config.bind_spec(), "/work/config.yaml:/root/.relay/config.yaml");
    }
}

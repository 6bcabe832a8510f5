//! Push platform abstraction and its file-backed CLI implementation

use std::io::IsTerminal;
use std::path::PathBuf;

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use dialoguer::Confirm;

use super::PushSubscription;
use crate::client::models::SubscriptionKeys;
use crate::config::{Config, PermissionSetting};
use crate::error::PushError;

/// Notification permission as the platform reports it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    /// Not decided yet
    Default,
    Granted,
    Denied,
}

impl From<PermissionSetting> for Permission {
    fn from(setting: PermissionSetting) -> Self {
        match setting {
            PermissionSetting::Default => Permission::Default,
            PermissionSetting::Granted => Permission::Granted,
            PermissionSetting::Denied => Permission::Denied,
        }
    }
}

impl From<Permission> for PermissionSetting {
    fn from(permission: Permission) -> Self {
        match permission {
            Permission::Default => PermissionSetting::Default,
            Permission::Granted => PermissionSetting::Granted,
            Permission::Denied => PermissionSetting::Denied,
        }
    }
}

/// The platform's push service
#[async_trait]
pub trait PushPlatform: Send + Sync {
    fn supports_push(&self) -> bool;

    async fn permission(&self) -> Permission;

    /// Ask the user; only meaningful while the permission is undecided
    async fn request_permission(&self) -> Result<Permission, PushError>;

    async fn get_subscription(&self) -> Result<Option<PushSubscription>, PushError>;

    /// Create a subscription bound to the application server key
    async fn subscribe(&self, application_server_key: &[u8])
    -> Result<PushSubscription, PushError>;

    /// Drop the local subscription; returns whether one existed
    async fn unsubscribe(&self) -> Result<bool, PushError>;
}

/// File name of the stored subscription inside the data directory
const SUBSCRIPTION_FILE: &str = "push-subscription.json";

/// Push platform for the terminal: the subscription lives in the data
/// directory and the permission decision in the config file
pub struct FilePushPlatform {
    subscription_path: PathBuf,
    config_path: PathBuf,
    service_url: Option<String>,
}

impl FilePushPlatform {
    pub fn new(data_dir: &std::path::Path, config_path: PathBuf, service_url: Option<String>) -> Self {
        Self {
            subscription_path: data_dir.join(SUBSCRIPTION_FILE),
            config_path,
            service_url: service_url.filter(|url| !url.trim().is_empty()),
        }
    }

    fn load_config(&self) -> Result<Config, PushError> {
        Config::load_from(&self.config_path).map_err(|e| PushError::Platform(e.to_string()))
    }

    fn remember(&self, permission: Permission) -> Result<(), PushError> {
        let mut config = self.load_config()?;
        config.push.permission = permission.into();
        config
            .save_to(&self.config_path)
            .map_err(|e| PushError::Platform(e.to_string()))
    }
}

#[async_trait]
impl PushPlatform for FilePushPlatform {
    fn supports_push(&self) -> bool {
        self.service_url.is_some()
    }

    async fn permission(&self) -> Permission {
        match self.load_config() {
            Ok(config) => config.push.permission.into(),
            Err(e) => {
                log::warn!("Could not read notification permission: {}", e);
                Permission::Default
            }
        }
    }

    async fn request_permission(&self) -> Result<Permission, PushError> {
        let current = self.permission().await;
        if current != Permission::Default {
            return Ok(current);
        }
        if !std::io::stdin().is_terminal() {
            // Nobody to ask; the decision stays open
            return Ok(Permission::Default);
        }

        let allowed = Confirm::new()
            .with_prompt("Allow storykeep to show notifications?")
            .default(true)
            .interact()
            .map_err(|e| PushError::Platform(e.to_string()))?;

        let permission = if allowed {
            Permission::Granted
        } else {
            Permission::Denied
        };
        self.remember(permission)?;
        Ok(permission)
    }

    async fn get_subscription(&self) -> Result<Option<PushSubscription>, PushError> {
        if !self.subscription_path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&self.subscription_path)
            .map_err(|e| PushError::Platform(e.to_string()))?;
        let subscription = serde_json::from_str(&contents)
            .map_err(|e| PushError::Platform(format!("Corrupt subscription file: {}", e)))?;
        Ok(Some(subscription))
    }

    async fn subscribe(
        &self,
        application_server_key: &[u8],
    ) -> Result<PushSubscription, PushError> {
        let service_url = self
            .service_url
            .as_deref()
            .ok_or_else(|| PushError::Unsupported("no push service configured".to_string()))?;
        if application_server_key.is_empty() {
            return Err(PushError::Platform("Empty application server key".to_string()));
        }

        let subscription = PushSubscription {
            endpoint: format!(
                "{}/{}",
                service_url.trim_end_matches('/'),
                uuid::Uuid::new_v4().simple()
            ),
            expiration_time: None,
            keys: SubscriptionKeys {
                p256dh: general_purpose::URL_SAFE_NO_PAD.encode(client_public_key()),
                auth: general_purpose::URL_SAFE_NO_PAD.encode(uuid::Uuid::new_v4().as_bytes()),
            },
        };

        if let Some(parent) = self.subscription_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PushError::Platform(e.to_string()))?;
        }
        let json = serde_json::to_string_pretty(&subscription)
            .map_err(|e| PushError::Platform(e.to_string()))?;
        std::fs::write(&self.subscription_path, json)
            .map_err(|e| PushError::Platform(e.to_string()))?;

        log::info!("Created push subscription {}", subscription.endpoint);
        Ok(subscription)
    }

    async fn unsubscribe(&self) -> Result<bool, PushError> {
        if !self.subscription_path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&self.subscription_path)
            .map_err(|e| PushError::Platform(e.to_string()))?;
        Ok(true)
    }
}

/// Uncompressed P-256 point layout (0x04 prefix, 64 bytes of coordinates)
fn client_public_key() -> Vec<u8> {
    let mut key = Vec::with_capacity(65);
    key.push(0x04);
    for _ in 0..4 {
        key.extend_from_slice(uuid::Uuid::new_v4().as_bytes());
    }
    key
}

/// Decode a base64url VAPID key, restoring the padding first
pub fn decode_vapid_key(input: &str) -> Result<Vec<u8>, PushError> {
    // Base64url uses - instead of + and _ instead of /
    let standard_b64 = input.trim().replace('-', "+").replace('_', "/");

    // Add padding if needed
    let padding = match standard_b64.len() % 4 {
        0 => "",
        2 => "==",
        3 => "=",
        _ => {
            return Err(PushError::Platform(
                "Invalid VAPID key length".to_string(),
            ));
        }
    };

    let padded = format!("{}{}", standard_b64, padding);

    general_purpose::STANDARD
        .decode(&padded)
        .map_err(|e| PushError::Platform(format!("Invalid VAPID key: {}", e)))
}

#[cfg(test)]
pub mod mock {
    //! In-memory push platform

    use std::sync::Mutex;

    use super::*;

    pub struct MockPushPlatform {
        pub supported: bool,
        permission: Mutex<Permission>,
        /// What a prompt answers
        prompt_answer: Permission,
        subscription: Mutex<Option<PushSubscription>>,
        pub subscribe_calls: Mutex<usize>,
        pub last_key: Mutex<Option<Vec<u8>>>,
    }

    impl MockPushPlatform {
        pub fn new(permission: Permission) -> Self {
            Self {
                supported: true,
                permission: Mutex::new(permission),
                prompt_answer: Permission::Granted,
                subscription: Mutex::new(None),
                subscribe_calls: Mutex::new(0),
                last_key: Mutex::new(None),
            }
        }

        pub fn unsupported() -> Self {
            Self {
                supported: false,
                ..Self::new(Permission::Granted)
            }
        }

        pub fn answering(mut self, answer: Permission) -> Self {
            self.prompt_answer = answer;
            self
        }

        pub fn with_subscription(self, subscription: PushSubscription) -> Self {
            *self.subscription.lock().unwrap() = Some(subscription);
            self
        }

        pub fn current(&self) -> Option<PushSubscription> {
            self.subscription.lock().unwrap().clone()
        }

        pub fn subscribe_calls(&self) -> usize {
            *self.subscribe_calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl PushPlatform for MockPushPlatform {
        fn supports_push(&self) -> bool {
            self.supported
        }

        async fn permission(&self) -> Permission {
            *self.permission.lock().unwrap()
        }

        async fn request_permission(&self) -> Result<Permission, PushError> {
            let mut permission = self.permission.lock().unwrap();
            if *permission == Permission::Default {
                *permission = self.prompt_answer;
            }
            Ok(*permission)
        }

        async fn get_subscription(&self) -> Result<Option<PushSubscription>, PushError> {
            Ok(self.current())
        }

        async fn subscribe(
            &self,
            application_server_key: &[u8],
        ) -> Result<PushSubscription, PushError> {
            *self.subscribe_calls.lock().unwrap() += 1;
            *self.last_key.lock().unwrap() = Some(application_server_key.to_vec());
            let subscription = PushSubscription {
                endpoint: "https://push.example.org/send/new".to_string(),
                expiration_time: Some(1_700_000_000_000),
                keys: SubscriptionKeys {
                    p256dh: "BNcR".to_string(),
                    auth: "tBHI".to_string(),
                },
            };
            *self.subscription.lock().unwrap() = Some(subscription.clone());
            Ok(subscription)
        }

        async fn unsubscribe(&self) -> Result<bool, PushError> {
            Ok(self.subscription.lock().unwrap().take().is_some())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_decode_vapid_key_restores_padding() {
        // "hello" is aGVsbG8= in standard base64
        assert_eq!(decode_vapid_key("aGVsbG8").unwrap(), b"hello");
        // base64url alphabet
        assert_eq!(decode_vapid_key("-_8").unwrap(), vec![0xfb, 0xff]);
    }

    #[test]
    fn test_decode_vapid_key_rejects_bad_length() {
        assert!(decode_vapid_key("abcde").is_err());
    }

    #[test]
    fn test_client_public_key_layout() {
        let key = client_public_key();
        assert_eq!(key.len(), 65);
        assert_eq!(key[0], 0x04);
    }

    #[tokio::test]
    async fn test_file_platform_without_service_is_unsupported() {
        let dir = TempDir::new().unwrap();
        let platform = FilePushPlatform::new(dir.path(), dir.path().join("config.yaml"), None);
        assert!(!platform.supports_push());
        assert!(platform.subscribe(b"key").await.is_err());
    }

    #[tokio::test]
    async fn test_file_platform_subscription_lifecycle() {
        let dir = TempDir::new().unwrap();
        let platform = FilePushPlatform::new(
            dir.path(),
            dir.path().join("config.yaml"),
            Some("https://push.example.org/send/".to_string()),
        );

        assert!(platform.get_subscription().await.unwrap().is_none());

        let created = platform.subscribe(b"vapid").await.unwrap();
        assert!(created.endpoint.starts_with("https://push.example.org/send/"));
        assert_eq!(platform.get_subscription().await.unwrap(), Some(created));

        assert!(platform.unsubscribe().await.unwrap());
        assert!(!platform.unsubscribe().await.unwrap());
    }

    #[tokio::test]
    async fn test_file_platform_reads_remembered_permission() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("config.yaml");
        let mut config = Config::default();
        config.push.permission = PermissionSetting::Denied;
        config.save_to(&config_path).unwrap();

        let platform = FilePushPlatform::new(dir.path(), config_path, None);

        assert_eq!(platform.permission().await, Permission::Denied);
        assert_eq!(
            platform.request_permission().await.unwrap(),
            Permission::Denied
        );
    }
}
